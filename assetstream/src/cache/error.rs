//! Cache error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the disk tier of the asset cache.
///
/// None of these are fatal to a fetch: read failures are reported as cache
/// misses and write failures leave the asset in memory.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error on a cache file or directory.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cache file is shorter than the type header or the header is unreadable.
    #[error("Corrupt cache file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Type name does not fit in the fixed-width header.
    #[error("Asset type '{asset_type}' exceeds {max} header bytes")]
    TypeTooLong { asset_type: String, max: usize },

    /// The disk tier is disabled.
    #[error("Disk cache is not available")]
    DiskUnavailable,
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
