//! AssetStream CLI
//!
//! Fetches assets through the configured providers and manages the local
//! asset cache.

mod commands;
mod error;

use std::path::PathBuf;

use assetstream::config::ConfigFile;
use assetstream::logging::init_logging;
use clap::{Parser, Subcommand};

use commands::cache::CacheAction;
use commands::fetch::FetchArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "assetstream", version, about = "Fetch and cache virtual-world assets")]
struct Cli {
    /// Config file (defaults to <config dir>/assetstream/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overriding the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch one asset
    Fetch(FetchArgs),
    /// Manage the asset cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let _guard = init_logging(level, config.logging.file.as_deref())?;

    match cli.command {
        Command::Fetch(args) => commands::fetch::run(args, &config),
        Command::Cache { action } => commands::cache::run(action, &config),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
