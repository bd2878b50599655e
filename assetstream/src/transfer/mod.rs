//! Per-asset transfer state.
//!
//! A [`Transfer`] is one fetch in flight. It wraps a [`ReassemblyBuffer`]
//! that accepts packet-indexed chunks in any order and answers how much
//! gap-free data exists from the start.

mod reassembly;
mod state;

pub use reassembly::{ReassemblyBuffer, ReceiveOutcome};
pub use state::{AssetStatus, Transfer};
