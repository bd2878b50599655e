//! Sparse packet store for one asset.
//!
//! Packets are keyed by index in an ordered map. The first write to an index
//! wins; later writes to the same index are reported as duplicates and
//! dropped. Zero-length chunks are refused because an empty slot and an empty
//! chunk would be indistinguishable during the contiguity walk.

use std::collections::BTreeMap;

use bytes::Bytes;

/// Result of offering a chunk to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The chunk was stored.
    Stored,
    /// A chunk already occupies this index; the new one was dropped.
    Duplicate,
    /// The chunk was empty and was dropped.
    Empty,
}

/// Accumulates out-of-order packets for one asset.
#[derive(Debug, Default, Clone)]
pub struct ReassemblyBuffer {
    packets: BTreeMap<u32, Bytes>,
    received: u64,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` at `index` if the slot is empty.
    pub fn receive(&mut self, index: u32, data: Bytes) -> ReceiveOutcome {
        if data.is_empty() {
            return ReceiveOutcome::Empty;
        }
        if self.packets.contains_key(&index) {
            return ReceiveOutcome::Duplicate;
        }

        self.received += data.len() as u64;
        self.packets.insert(index, data);
        ReceiveOutcome::Stored
    }

    /// Total bytes stored, gaps included.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Bytes in the gap-free prefix starting at packet 0.
    pub fn received_continuous(&self) -> u64 {
        self.continuous_packets().map(|p| p.len() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Copy the gap-free prefix into `dest`, in index order.
    ///
    /// Copying stops when `dest` is full or at the first gap. Returns the
    /// number of bytes written.
    pub fn assemble_into(&self, dest: &mut [u8]) -> usize {
        let mut offset = 0;
        for packet in self.continuous_packets() {
            if offset == dest.len() {
                break;
            }
            let n = packet.len().min(dest.len() - offset);
            dest[offset..offset + n].copy_from_slice(&packet[..n]);
            offset += n;
        }
        offset
    }

    /// Copy the gap-free prefix into a new vector.
    pub fn assemble(&self) -> Vec<u8> {
        let mut data = vec![0u8; self.received_continuous() as usize];
        let written = self.assemble_into(&mut data);
        data.truncate(written);
        data
    }

    /// Packets 0, 1, 2, ... up to the first missing index.
    fn continuous_packets(&self) -> impl Iterator<Item = &Bytes> {
        self.packets
            .iter()
            .enumerate()
            .take_while(|(expected, (index, _))| **index as usize == *expected)
            .map(|(_, (_, packet))| packet)
    }
}
