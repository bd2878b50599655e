//! Asset notifications delivered to consumers.
//!
//! Providers and the cache raise events through an [`AssetEvents`] handle.
//! Delivery is a non-blocking send on an unbounded Tokio channel, so raising
//! an event never stalls the tick. Consumers drain the paired
//! [`AssetEventReceiver`] at their own pace.

use tokio::sync::mpsc;
use tracing::trace;

use crate::asset::{AssetHandle, RequestTag};

/// Notification raised by the engine.
#[derive(Debug, Clone)]
pub enum AssetEvent {
    /// An asset is complete and cached. Raised once per attached tag.
    Ready {
        id: String,
        asset_type: String,
        asset: AssetHandle,
        tag: RequestTag,
    },

    /// A transfer made progress.
    Progress {
        id: String,
        asset_type: String,
        size: u64,
        received: u64,
        received_continuous: u64,
    },

    /// A fetch failed, timed out or was canceled. Raised once per attached tag.
    Canceled {
        id: String,
        asset_type: String,
        tag: RequestTag,
        reason: Option<String>,
    },

    /// The cache stored an asset (memory and, when possible, disk).
    Stored {
        id: String,
        asset_type: String,
        asset: AssetHandle,
    },
}

impl AssetEvent {
    /// The asset id this event refers to.
    pub fn asset_id(&self) -> &str {
        match self {
            AssetEvent::Ready { id, .. }
            | AssetEvent::Progress { id, .. }
            | AssetEvent::Canceled { id, .. }
            | AssetEvent::Stored { id, .. } => id,
        }
    }

    /// The request tag, for terminal per-request events.
    pub fn tag(&self) -> Option<RequestTag> {
        match self {
            AssetEvent::Ready { tag, .. } | AssetEvent::Canceled { tag, .. } => Some(*tag),
            _ => None,
        }
    }
}

/// Receiving half of the event channel.
pub type AssetEventReceiver = mpsc::UnboundedReceiver<AssetEvent>;

/// Cloneable sender used by providers and the cache to raise events.
#[derive(Debug, Clone)]
pub struct AssetEvents {
    sender: mpsc::UnboundedSender<AssetEvent>,
}

impl AssetEvents {
    /// Create a connected sender/receiver pair.
    pub fn channel() -> (Self, AssetEventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Raise an event. Events sent after the receiver is gone are discarded.
    pub fn send(&self, event: AssetEvent) {
        if self.sender.send(event).is_err() {
            trace!("Asset event dropped, no receiver");
        }
    }

    /// Raise one `Ready` event for each tag.
    pub fn ready(&self, asset: &AssetHandle, tags: &[RequestTag]) {
        for tag in tags {
            self.send(AssetEvent::Ready {
                id: asset.id().to_string(),
                asset_type: asset.asset_type().to_string(),
                asset: AssetHandle::clone(asset),
                tag: *tag,
            });
        }
    }

    /// Raise one `Canceled` event for each tag.
    pub fn canceled(&self, id: &str, asset_type: &str, tags: &[RequestTag], reason: Option<&str>) {
        for tag in tags {
            self.send(AssetEvent::Canceled {
                id: id.to_string(),
                asset_type: asset_type.to_string(),
                tag: *tag,
                reason: reason.map(str::to_string),
            });
        }
    }

    pub fn progress(&self, id: &str, asset_type: &str, size: u64, received: u64, continuous: u64) {
        self.send(AssetEvent::Progress {
            id: id.to_string(),
            asset_type: asset_type.to_string(),
            size,
            received,
            received_continuous: continuous,
        });
    }
}
