//! Cache management CLI commands.

use std::path::PathBuf;

use assetstream::cache::{AssetCache, CacheSettings};
use assetstream::config::{format_size, ConfigFile};
use assetstream::AssetEvents;
use clap::Subcommand;

use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Delete every cached asset file
    Clear,
    /// Show disk cache statistics
    Stats,
    /// Show one cached asset
    Show {
        /// Asset id
        id: String,
        /// Write the payload to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn open_cache(config: &ConfigFile) -> AssetCache {
    let (events, _receiver) = AssetEvents::channel();
    let settings = CacheSettings {
        memory_size: 0,
        ..config.cache_settings()
    };
    AssetCache::new(settings, events)
}

/// Run a cache subcommand.
pub fn run(action: CacheAction, config: &ConfigFile) -> Result<(), CliError> {
    let cache_dir = &config.cache.directory;
    let cache = open_cache(config);

    match action {
        CacheAction::Clear => {
            println!("Clearing disk cache at: {}", cache_dir.display());
            let result = cache.clear_disk()?;
            println!(
                "Deleted {} files, freed {}",
                result.files_deleted,
                format_size(result.bytes_freed)
            );
        }
        CacheAction::Stats => {
            println!("Disk cache: {}", cache_dir.display());
            let (files, bytes) = cache.disk_stats()?;
            println!("  Files: {}", files);
            println!("  Size:  {}", format_size(bytes));
            if config.cache.disk_max_size > 0 {
                println!("  Limit: {}", format_size(config.cache.disk_max_size));
            }
        }
        CacheAction::Show { id, output } => match cache.get(&id, false, true) {
            Some(asset) => {
                println!("Id:   {}", asset.id());
                println!("Type: {}", asset.asset_type());
                println!("Size: {}", format_size(asset.size() as u64));
                if let Some(path) = output {
                    std::fs::write(&path, asset.data())
                        .map_err(|e| CliError::Output(format!("{}: {}", path.display(), e)))?;
                    println!("Written to {}", path.display());
                }
            }
            None => println!("'{}' is not cached", id),
        },
    }

    Ok(())
}
