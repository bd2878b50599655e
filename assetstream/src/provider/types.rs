//! Provider contract shared by all transports.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::asset::{Asset, RequestTag};
pub use crate::transfer::AssetStatus;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised while constructing or driving a provider's transport.
///
/// These never escape the tick: a transport failure during a fetch is turned
/// into an `AssetCanceled` event for that fetch.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The underlying HTTP stack could not be initialized.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// A request could not be issued or its response could not be read.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The datagram transport has no live connection.
    #[error("Not connected")]
    NotConnected,

    /// The asset id cannot be turned into a request URL.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Description of one active transfer, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInfo {
    pub id: String,
    pub asset_type: String,
    pub provider: String,
    pub size: u64,
    pub received: u64,
    pub received_continuous: u64,
}

/// A transport-specific asset fetcher.
///
/// All methods are called from the tick thread. `update` must never block
/// on network I/O.
pub trait AssetProvider: Send {
    /// Stable identifying name.
    fn name(&self) -> &str;

    /// Whether this provider can handle the id. Pure predicate.
    fn is_valid_id(&self, id: &str, asset_type: &str) -> bool;

    /// Start or join a fetch for `id`.
    ///
    /// Returns false if the id is not valid for this provider. On success
    /// exactly one `AssetReady` or `AssetCanceled` will be raised for `tag`.
    fn request_asset(&mut self, id: &str, asset_type: &str, tag: RequestTag) -> bool;

    /// Whether a transfer or pending request exists for `id`.
    fn in_progress(&self, id: &str) -> bool;

    /// Progress of the transfer for `id`, or `None` if there is none.
    fn query_asset_status(&self, id: &str) -> Option<AssetStatus>;

    /// Snapshot of the gap-free prefix received so far, if at least
    /// `min_continuous` bytes of it are available.
    fn get_incomplete_asset(&self, id: &str, asset_type: &str, min_continuous: u64)
        -> Option<Asset>;

    /// One tick.
    fn update(&mut self, delta: Duration);

    /// Active transfers, for diagnostics.
    fn transfer_info(&self) -> Vec<TransferInfo>;

    /// Drop every pending request and active transfer without raising events.
    fn clear_all_transfers(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::InvalidUrl {
            url: "ftp://x".to_string(),
            reason: "unsupported scheme".to_string(),
        };
        assert!(err.to_string().contains("ftp://x"));
        assert!(err.to_string().contains("unsupported scheme"));
        assert_eq!(ProviderError::NotConnected.to_string(), "Not connected");
    }
}
