//! `fetch` command: request one asset and tick until it resolves.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use assetstream::config::{format_size, ConfigFile};
use assetstream::{AssetEvent, AssetManager};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::error::CliError;

/// Interval between manager ticks.
const TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Asset id: a UUID, an http(s) URL or an avatar storage URL
    pub id: String,

    /// Asset type name
    #[arg(long = "type", default_value = "Texture")]
    pub asset_type: String,

    /// Write the asset payload to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Run the fetch command.
pub fn run(args: FetchArgs, config: &ConfigFile) -> Result<(), CliError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let (mut manager, mut events) = AssetManager::from_config(config, runtime.handle().clone());
    debug!(providers = ?manager.provider_names(), "Manager ready");

    let tag = manager
        .request_asset(&args.id, &args.asset_type)
        .ok_or_else(|| CliError::NoProvider {
            id: args.id.clone(),
            asset_type: args.asset_type.clone(),
        })?;
    info!(asset_id = %args.id, %tag, "Fetching asset");

    let bar = progress_bar();
    bar.set_message(args.id.clone());
    let deadline = Instant::now() + Duration::from_secs(args.timeout);

    loop {
        manager.update(TICK);

        while let Ok(event) = events.try_recv() {
            match event {
                AssetEvent::Progress { id, size, received, .. } if id == args.id => {
                    if size > 0 {
                        bar.set_length(size);
                    }
                    bar.set_position(received);
                }
                AssetEvent::Ready { tag: ready, asset, .. } if ready == tag => {
                    bar.finish_and_clear();
                    let (entries, bytes) = manager.cache().memory_stats();
                    debug!(entries, bytes, "Memory cache after fetch");
                    println!(
                        "{} ({}, {})",
                        asset.id(),
                        asset.asset_type(),
                        format_size(asset.size() as u64)
                    );
                    if let Some(path) = &args.output {
                        std::fs::write(path, asset.data())
                            .map_err(|e| CliError::Output(format!("{}: {}", path.display(), e)))?;
                        println!("Written to {}", path.display());
                    }
                    return Ok(());
                }
                AssetEvent::Canceled { tag: canceled, reason, .. } if canceled == tag => {
                    bar.abandon();
                    return Err(CliError::Canceled {
                        id: args.id,
                        reason: reason.unwrap_or_else(|| "unknown".to_string()),
                    });
                }
                _ => {}
            }
        }

        if Instant::now() >= deadline {
            bar.abandon();
            return Err(CliError::Timeout {
                id: args.id,
                seconds: args.timeout,
            });
        }
        std::thread::sleep(TICK);
    }
}
