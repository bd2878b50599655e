//! Completed assets and request tags.

use std::fmt;
use std::sync::Arc;

/// Shared handle to a completed asset.
///
/// The cache and every `AssetReady` event for the same fetch hold the same
/// allocation.
pub type AssetHandle = Arc<Asset>;

/// A fully assembled asset: identifier, type name and raw bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Asset {
    id: String,
    asset_type: String,
    data: Vec<u8>,
    /// Metadata document fetched alongside the data (HTTP metadata phase).
    /// Kept in memory only; never written to the disk cache.
    metadata: Option<Vec<u8>>,
}

impl Asset {
    /// Create a new asset.
    pub fn new(id: impl Into<String>, asset_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            asset_type: asset_type.into(),
            data,
            metadata: None,
        }
    }

    /// Attach a metadata document.
    pub fn with_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn asset_type(&self) -> &str {
        &self.asset_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn metadata(&self) -> Option<&[u8]> {
        self.metadata.as_deref()
    }

    /// Size of the payload in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("id", &self.id)
            .field("asset_type", &self.asset_type)
            .field("size", &self.data.len())
            .field("has_metadata", &self.metadata.is_some())
            .finish()
    }
}

/// Opaque correlation id for one logical asset request.
///
/// Allocated by the manager. Several tags can be attached to the same
/// transfer; each receives exactly one `AssetReady` or `AssetCanceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestTag(pub u64);

impl fmt::Display for RequestTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_accessors() {
        let asset = Asset::new("a1", "Texture", vec![1, 2, 3]);
        assert_eq!(asset.id(), "a1");
        assert_eq!(asset.asset_type(), "Texture");
        assert_eq!(asset.data(), &[1, 2, 3]);
        assert_eq!(asset.size(), 3);
        assert!(asset.metadata().is_none());
    }

    #[test]
    fn test_asset_with_metadata() {
        let asset = Asset::new("a1", "Mesh", vec![]).with_metadata(b"<meta/>".to_vec());
        assert_eq!(asset.metadata(), Some(&b"<meta/>"[..]));
    }

    #[test]
    fn test_debug_omits_payload() {
        let asset = Asset::new("a1", "Sound", vec![0u8; 4096]);
        let debug = format!("{:?}", asset);
        assert!(debug.contains("size: 4096"));
        assert!(!debug.contains("0, 0, 0"));
    }

    #[test]
    fn test_request_tag_display() {
        assert_eq!(RequestTag(42).to_string(), "#42");
    }
}
