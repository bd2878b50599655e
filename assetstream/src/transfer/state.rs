//! Transfer metadata wrapped around a reassembly buffer.

use std::time::Duration;

use bytes::Bytes;
use tracing::warn;

use super::reassembly::{ReassemblyBuffer, ReceiveOutcome};
use crate::asset::{Asset, RequestTag};

/// Progress snapshot of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssetStatus {
    /// Expected size in bytes, 0 while unknown.
    pub size: u64,
    /// Total bytes received, gaps included.
    pub received: u64,
    /// Bytes in the gap-free prefix.
    pub received_continuous: u64,
}

/// One asset fetch in progress.
///
/// Owned by exactly one provider. Ready once the expected size is known and
/// at least that many bytes have arrived.
#[derive(Debug, Clone)]
pub struct Transfer {
    asset_id: String,
    asset_type: String,
    size: u64,
    idle: Duration,
    tags: Vec<RequestTag>,
    buffer: ReassemblyBuffer,
}

impl Transfer {
    pub fn new(asset_id: impl Into<String>, asset_type: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            asset_type: asset_type.into(),
            size: 0,
            idle: Duration::ZERO,
            tags: Vec::new(),
            buffer: ReassemblyBuffer::new(),
        }
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn asset_type(&self) -> &str {
        &self.asset_type
    }

    /// Expected size, 0 while unknown.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
        self.idle = Duration::ZERO;
    }

    pub fn tags(&self) -> &[RequestTag] {
        &self.tags
    }

    /// Attach requester tags, ignoring ones already attached.
    pub fn add_tags(&mut self, tags: &[RequestTag]) {
        for tag in tags {
            if !self.tags.contains(tag) {
                self.tags.push(*tag);
            }
        }
    }

    /// Feed a packet into the reassembly buffer.
    ///
    /// Any arrival resets the idle timer. Duplicates and empty chunks are
    /// logged and dropped.
    pub fn receive_data(&mut self, index: u32, data: Bytes) -> ReceiveOutcome {
        self.idle = Duration::ZERO;

        let outcome = self.buffer.receive(index, data);
        match outcome {
            ReceiveOutcome::Stored => {}
            ReceiveOutcome::Duplicate => {
                warn!(asset_id = %self.asset_id, index, "Duplicate packet dropped");
            }
            ReceiveOutcome::Empty => {
                warn!(asset_id = %self.asset_id, index, "Zero-length packet dropped");
            }
        }
        outcome
    }

    /// Advance the idle timer, returning the new idle time.
    pub fn add_time(&mut self, delta: Duration) -> Duration {
        self.idle += delta;
        self.idle
    }

    pub fn idle_time(&self) -> Duration {
        self.idle
    }

    /// Mark activity that did not carry payload bytes.
    pub fn reset_idle(&mut self) {
        self.idle = Duration::ZERO;
    }

    /// Whether the expected size is known and has been received.
    pub fn ready(&self) -> bool {
        self.size > 0 && self.buffer.received() >= self.size
    }

    pub fn received(&self) -> u64 {
        self.buffer.received()
    }

    pub fn received_continuous(&self) -> u64 {
        self.buffer.received_continuous()
    }

    pub fn status(&self) -> AssetStatus {
        AssetStatus {
            size: self.size,
            received: self.received(),
            received_continuous: self.received_continuous(),
        }
    }

    /// The gap-free prefix received so far.
    pub fn assemble_data(&self) -> Vec<u8> {
        self.buffer.assemble()
    }

    /// Copy of the gap-free prefix as an asset, if at least
    /// `min_continuous` bytes of it are available.
    pub fn incomplete_asset(&self, min_continuous: u64) -> Option<Asset> {
        if self.received_continuous() < min_continuous {
            return None;
        }
        Some(Asset::new(
            self.asset_id.clone(),
            self.asset_type.clone(),
            self.assemble_data(),
        ))
    }

    /// Consume the transfer, producing the assembled asset and its tags.
    ///
    /// Bytes past a declared size are dropped.
    pub fn into_asset(self) -> (Asset, Vec<RequestTag>) {
        let mut data = self.buffer.assemble();
        if self.size > 0 {
            if let Ok(size) = usize::try_from(self.size) {
                data.truncate(size);
            }
        }
        (Asset::new(self.asset_id, self.asset_type, data), self.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(byte: u8, len: usize) -> Bytes {
        Bytes::from(vec![byte; len])
    }

    #[test]
    fn test_not_ready_without_size() {
        let mut transfer = Transfer::new("a1", "Texture");
        transfer.receive_data(0, bytes(1, 100));
        assert!(!transfer.ready());
    }

    #[test]
    fn test_ready_when_size_reached() {
        let mut transfer = Transfer::new("a1", "Texture");
        transfer.set_size(200);
        transfer.receive_data(0, bytes(1, 100));
        assert!(!transfer.ready());
        transfer.receive_data(1, bytes(2, 100));
        assert!(transfer.ready());
    }

    #[test]
    fn test_ready_when_header_arrives_last() {
        let mut transfer = Transfer::new("a1", "Sound");
        transfer.receive_data(1, bytes(2, 50));
        transfer.receive_data(0, bytes(1, 50));
        assert!(!transfer.ready());

        transfer.set_size(100);
        assert!(transfer.ready());
    }

    #[test]
    fn test_idle_resets_on_data() {
        let mut transfer = Transfer::new("a1", "Texture");
        transfer.add_time(Duration::from_secs(5));
        assert_eq!(transfer.idle_time(), Duration::from_secs(5));

        transfer.receive_data(0, bytes(1, 1));
        assert_eq!(transfer.idle_time(), Duration::ZERO);
    }

    #[test]
    fn test_tags_are_deduplicated() {
        let mut transfer = Transfer::new("a1", "Texture");
        transfer.add_tags(&[RequestTag(1), RequestTag(2)]);
        transfer.add_tags(&[RequestTag(2), RequestTag(3)]);
        assert_eq!(
            transfer.tags(),
            &[RequestTag(1), RequestTag(2), RequestTag(3)]
        );
    }

    #[test]
    fn test_end_to_end_walkthrough() {
        let mut transfer = Transfer::new("A1", "Texture");
        transfer.set_size(1000);

        transfer.receive_data(2, bytes(3, 400));
        assert_eq!(transfer.received_continuous(), 0);

        transfer.receive_data(0, bytes(1, 300));
        assert_eq!(transfer.received_continuous(), 300);
        assert!(!transfer.ready());

        transfer.receive_data(1, bytes(2, 300));
        assert_eq!(transfer.received_continuous(), 1000);
        assert!(transfer.ready());

        let (asset, _) = transfer.into_asset();
        assert_eq!(asset.size(), 1000);
        assert_eq!(asset.data()[0], 1);
        assert_eq!(asset.data()[300], 2);
        assert_eq!(asset.data()[999], 3);
    }

    #[test]
    fn test_incomplete_asset_threshold() {
        let mut transfer = Transfer::new("a1", "Texture");
        transfer.set_size(100);
        transfer.receive_data(0, bytes(1, 40));
        transfer.receive_data(2, bytes(3, 40));

        assert!(transfer.incomplete_asset(50).is_none());
        let partial = transfer.incomplete_asset(40).unwrap();
        assert_eq!(partial.data(), &[1u8; 40][..]);
    }

    #[test]
    fn test_overshoot_truncated_to_declared_size() {
        let mut transfer = Transfer::new("a1", "Texture");
        transfer.set_size(150);
        transfer.add_tags(&[RequestTag(1)]);
        transfer.receive_data(0, bytes(1, 100));
        transfer.receive_data(1, bytes(2, 100));
        assert!(transfer.ready());

        let (asset, tags) = transfer.into_asset();
        assert_eq!(asset.size(), 150);
        assert_eq!(&asset.data()[100..], &[2u8; 50][..]);
        assert_eq!(tags, vec![RequestTag(1)]);
    }

    #[test]
    fn test_status_snapshot() {
        let mut transfer = Transfer::new("a1", "Texture");
        transfer.set_size(30);
        transfer.receive_data(1, bytes(1, 10));
        assert_eq!(
            transfer.status(),
            AssetStatus {
                size: 30,
                received: 10,
                received_continuous: 0
            }
        );
    }
}
