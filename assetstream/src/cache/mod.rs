//! Two-tier asset cache.
//!
//! The [`AssetCache`] is the terminal sink for every completed transfer. It
//! keeps assets in an in-process [`MemoryStore`] and persists them through a
//! [`DiskStore`]. Reads check memory first, then disk; a disk hit is written
//! back into memory.
//!
//! Disk problems never fail a fetch:
//! - A corrupt or unreadable file is logged and reported as a miss
//! - A failed write is logged; the asset stays usable from memory
//!
//! # Example
//!
//! ```ignore
//! use assetstream::cache::{AssetCache, CacheSettings};
//!
//! let (events, _rx) = AssetEvents::channel();
//! let cache = AssetCache::new(CacheSettings::new(cache_dir), events);
//! cache.store(Asset::new("a1", "Texture", data));
//! let asset = cache.get("a1", true, true);
//! ```

mod disk;
mod error;
mod memory;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

pub use disk::{decode_entry, encode_entry, file_name_for, ClearResult, DiskStore, TYPE_HEADER_LEN};
pub use error::CacheError;
pub use memory::MemoryStore;

use crate::asset::{Asset, AssetHandle};
use crate::events::{AssetEvent, AssetEvents};

/// Minimum time between disk size checks.
const DISK_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Cache construction settings.
#[derive(Debug, Clone, Default)]
pub struct CacheSettings {
    /// Disk tier directory. `None` disables the disk tier.
    pub directory: Option<PathBuf>,
    /// Memory tier limit in bytes, 0 for unbounded.
    pub memory_size: u64,
    /// Disk tier limit in bytes, 0 for unbounded.
    pub disk_max_size: u64,
}

impl CacheSettings {
    /// Settings with a disk directory and no size limits.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
            ..Self::default()
        }
    }

    /// Memory-only settings.
    pub fn memory_only() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct Maintenance {
    elapsed: Duration,
    disk_dirty: bool,
}

/// Memory + disk asset cache.
pub struct AssetCache {
    memory: MemoryStore,
    disk: Option<DiskStore>,
    disk_max_size: u64,
    maintenance: Mutex<Maintenance>,
    events: AssetEvents,
}

impl AssetCache {
    /// Create a cache.
    ///
    /// If the disk directory cannot be created the cache runs memory-only.
    pub fn new(settings: CacheSettings, events: AssetEvents) -> Self {
        let disk = settings
            .directory
            .and_then(|dir| match DiskStore::open(&dir) {
                Ok(store) => Some(store),
                Err(e) => {
                    error!(error = %e, "Disk cache unavailable, running memory-only");
                    None
                }
            });

        Self {
            memory: MemoryStore::new(settings.memory_size),
            disk,
            disk_max_size: settings.disk_max_size,
            maintenance: Mutex::new(Maintenance::default()),
            events,
        }
    }

    /// Look up an asset.
    ///
    /// Memory is checked first if `check_memory`; on a miss the disk file is
    /// read if `check_disk`, and a hit is inserted into memory.
    pub fn get(&self, id: &str, check_memory: bool, check_disk: bool) -> Option<AssetHandle> {
        if check_memory {
            if let Some(asset) = self.memory.get(id) {
                return Some(asset);
            }
        }

        if !check_disk {
            return None;
        }
        let disk = self.disk.as_ref()?;

        match disk.read(id) {
            Ok(Some(asset)) => {
                debug!(asset_id = %id, bytes = asset.size(), "Asset loaded from disk cache");
                let asset = Arc::new(asset);
                self.memory.insert(Arc::clone(&asset));
                Some(asset)
            }
            Ok(None) => None,
            Err(e) => {
                error!(asset_id = %id, error = %e, "Disk cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a completed asset, replacing any previous entry.
    ///
    /// Raises a `Stored` event and returns the shared handle.
    pub fn store(&self, asset: Asset) -> AssetHandle {
        let asset = Arc::new(asset);
        debug!(asset_id = %asset.id(), asset_type = %asset.asset_type(), bytes = asset.size(), "Storing asset");

        self.memory.insert(Arc::clone(&asset));

        if let Some(disk) = &self.disk {
            match disk.write(&asset) {
                Ok(()) => self.maintenance.lock().disk_dirty = true,
                Err(e) => {
                    error!(asset_id = %asset.id(), error = %e, "Failed to write asset to disk cache");
                }
            }
        }

        self.events.send(AssetEvent::Stored {
            id: asset.id().to_string(),
            asset_type: asset.asset_type().to_string(),
            asset: Arc::clone(&asset),
        });
        asset
    }

    /// Remove an asset from both tiers. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool, CacheError> {
        let in_memory = self.memory.remove(id);
        let on_disk = match &self.disk {
            Some(disk) => disk.remove(id)?,
            None => false,
        };
        Ok(in_memory || on_disk)
    }

    /// Delete every disk cache file.
    pub fn clear_disk(&self) -> Result<ClearResult, CacheError> {
        self.disk
            .as_ref()
            .ok_or(CacheError::DiskUnavailable)?
            .clear()
    }

    /// Number of files and total bytes in the disk tier.
    pub fn disk_stats(&self) -> Result<(u64, u64), CacheError> {
        self.disk
            .as_ref()
            .ok_or(CacheError::DiskUnavailable)?
            .stats()
    }

    /// Memory tier entry count and weighted size.
    pub fn memory_stats(&self) -> (u64, u64) {
        (self.memory.entry_count(), self.memory.size_bytes())
    }

    /// Disk tier directory, if enabled.
    pub fn directory(&self) -> Option<&std::path::Path> {
        self.disk.as_ref().map(DiskStore::directory)
    }

    /// Periodic maintenance, called once per tick.
    ///
    /// Enforces the disk size limit at most once per second and only after
    /// something was written.
    pub fn update(&self, delta: Duration) {
        let mut maintenance = self.maintenance.lock();
        maintenance.elapsed += delta;
        if maintenance.elapsed < DISK_CHECK_INTERVAL {
            return;
        }
        maintenance.elapsed = Duration::ZERO;

        if !maintenance.disk_dirty || self.disk_max_size == 0 {
            return;
        }
        maintenance.disk_dirty = false;
        drop(maintenance);

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.enforce_limit(self.disk_max_size) {
                warn!(error = %e, "Disk cache size check failed");
            }
        }
    }
}
