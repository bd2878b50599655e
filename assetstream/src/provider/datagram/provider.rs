//! Datagram provider state machine.
//!
//! Per transfer: `Pending → Receiving → Ready → Finalized`, with `Canceled`
//! reachable from `Pending`/`Receiving` through a server cancel or idle
//! timeout. `Pending` lives in the request queue; `Receiving` in one of the
//! two registries; `Ready` is detected right after each header or data
//! message and finalized immediately into the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::{InboundMessage, OutboundMessage, TransferStatus};
use super::transport::DatagramTransport;
use crate::asset::{Asset, RequestTag};
use crate::asset_type;
use crate::cache::AssetCache;
use crate::events::AssetEvents;
use crate::provider::{AssetProvider, AssetStatus, TransferInfo};
use crate::transfer::Transfer;

/// Default idle timeout for datagram transfers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const PROVIDER_NAME: &str = "Legacy UDP";

/// A request waiting for a live connection.
#[derive(Debug, Clone)]
struct PendingRequest {
    asset_id: Uuid,
    asset_type: String,
    type_code: i32,
    tags: Vec<RequestTag>,
}

/// Which registry a transfer lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registry {
    /// Keyed by asset id.
    Texture,
    /// Keyed by transfer id.
    Asset,
}

/// Provider for the legacy packetized transport.
pub struct DatagramProvider<T: DatagramTransport> {
    transport: T,
    cache: Arc<AssetCache>,
    events: AssetEvents,
    timeout: Duration,
    pending: Vec<PendingRequest>,
    /// Image-channel transfers keyed by asset id.
    texture_transfers: HashMap<Uuid, Transfer>,
    /// Transfer-channel transfers keyed by transfer id.
    asset_transfers: HashMap<Uuid, Transfer>,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    inbound_rx: mpsc::UnboundedReceiver<InboundMessage>,
}

impl<T: DatagramTransport> DatagramProvider<T> {
    /// Create a provider with the default timeout.
    pub fn new(transport: T, cache: Arc<AssetCache>, events: AssetEvents) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            cache,
            events,
            timeout: DEFAULT_TIMEOUT,
            pending: Vec::new(),
            texture_transfers: HashMap::new(),
            asset_transfers: HashMap::new(),
            inbound_tx,
            inbound_rx,
        }
    }

    /// Set the idle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sender the network layer uses to push received messages.
    ///
    /// Messages are queued and processed at the start of the next tick.
    pub fn inbound_sender(&self) -> mpsc::UnboundedSender<InboundMessage> {
        self.inbound_tx.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.texture_transfers.len() + self.asset_transfers.len()
    }

    /// Process one inbound message immediately.
    pub fn handle_message(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::ImageData {
                image_id,
                size,
                data,
                ..
            } => self.handle_texture_header(image_id, size, data),
            InboundMessage::ImagePacket {
                image_id,
                packet_index,
                data,
            } => self.handle_texture_data(image_id, packet_index, data),
            InboundMessage::ImageNotInDatabase { image_id } => self.handle_texture_cancel(image_id),
            InboundMessage::TransferInfo {
                transfer_id,
                status,
                size,
                ..
            } => self.handle_asset_header(transfer_id, status, size),
            InboundMessage::TransferPacket {
                transfer_id,
                packet_index,
                status,
                data,
                ..
            } => self.handle_asset_data(transfer_id, packet_index, status, data),
            InboundMessage::TransferAbort { transfer_id } => self.handle_asset_cancel(transfer_id),
        }
    }

    fn handle_texture_header(&mut self, image_id: Uuid, size: u32, data: Bytes) {
        let Some(transfer) = self.texture_transfers.get_mut(&image_id) else {
            debug!(asset_id = %image_id, "Header received for nonexisting texture transfer");
            return;
        };

        transfer.set_size(u64::from(size));
        transfer.receive_data(0, data);
        self.after_data(Registry::Texture, image_id);
    }

    fn handle_texture_data(&mut self, image_id: Uuid, packet_index: u16, data: Bytes) {
        let Some(transfer) = self.texture_transfers.get_mut(&image_id) else {
            debug!(asset_id = %image_id, "Data received for nonexisting texture transfer");
            return;
        };

        transfer.receive_data(u32::from(packet_index), data);
        self.after_data(Registry::Texture, image_id);
    }

    fn handle_texture_cancel(&mut self, image_id: Uuid) {
        match self.texture_transfers.remove(&image_id) {
            Some(transfer) => {
                debug!(asset_id = %image_id, "Texture transfer canceled, not in database");
                self.send_canceled(&transfer, "not in database");
            }
            None => {
                debug!(asset_id = %image_id, "Cancel received for nonexisting texture transfer");
            }
        }
    }

    fn handle_asset_header(&mut self, transfer_id: Uuid, status: TransferStatus, size: i32) {
        let Some(transfer) = self.asset_transfers.get_mut(&transfer_id) else {
            debug!(%transfer_id, "Header received for nonexisting asset transfer");
            return;
        };

        if !status.is_ok() {
            self.cancel_asset_transfer(transfer_id, status);
            return;
        }

        transfer.set_size(u64::try_from(size).unwrap_or(0));
        // Data packets may already be here, so readiness is checked too
        self.after_data(Registry::Asset, transfer_id);
    }

    fn handle_asset_data(
        &mut self,
        transfer_id: Uuid,
        packet_index: i32,
        status: TransferStatus,
        data: Bytes,
    ) {
        let Some(transfer) = self.asset_transfers.get_mut(&transfer_id) else {
            debug!(%transfer_id, "Data received for nonexisting asset transfer");
            return;
        };

        if !status.is_ok() {
            self.cancel_asset_transfer(transfer_id, status);
            return;
        }

        let Ok(index) = u32::try_from(packet_index) else {
            warn!(%transfer_id, packet_index, "Negative packet index dropped");
            return;
        };
        transfer.receive_data(index, data);
        self.after_data(Registry::Asset, transfer_id);
    }

    fn handle_asset_cancel(&mut self, transfer_id: Uuid) {
        match self.asset_transfers.remove(&transfer_id) {
            Some(transfer) => {
                debug!(asset_id = %transfer.asset_id(), "Asset transfer aborted by server");
                self.send_canceled(&transfer, "aborted by server");
            }
            None => {
                debug!(%transfer_id, "Cancel received for nonexisting asset transfer");
            }
        }
    }

    fn cancel_asset_transfer(&mut self, transfer_id: Uuid, status: TransferStatus) {
        if let Some(transfer) = self.asset_transfers.remove(&transfer_id) {
            debug!(
                asset_id = %transfer.asset_id(),
                status = status.code(),
                "Asset transfer canceled by status"
            );
            self.send_canceled(&transfer, &format!("transfer status {}", status.code()));
        }
    }

    /// Raise progress and finalize the transfer if it became ready.
    fn after_data(&mut self, registry: Registry, key: Uuid) {
        let map = match registry {
            Registry::Texture => &mut self.texture_transfers,
            Registry::Asset => &mut self.asset_transfers,
        };
        let Some(transfer) = map.get(&key) else {
            return;
        };

        let status = transfer.status();
        self.events.progress(
            transfer.asset_id(),
            transfer.asset_type(),
            status.size,
            status.received,
            status.received_continuous,
        );

        if transfer.ready() {
            if let Some(transfer) = map.remove(&key) {
                self.store_asset(transfer);
            }
        }
    }

    fn store_asset(&self, transfer: Transfer) {
        let (asset, tags) = transfer.into_asset();
        debug!(asset_id = %asset.id(), bytes = asset.size(), "Datagram transfer complete");
        let handle = self.cache.store(asset);
        self.events.ready(&handle, &tags);
    }

    fn send_canceled(&self, transfer: &Transfer, reason: &str) {
        self.events.canceled(
            transfer.asset_id(),
            transfer.asset_type(),
            transfer.tags(),
            Some(reason),
        );
    }

    /// Turn every active transfer back into a pending request.
    fn make_transfers_pending(&mut self) {
        if self.texture_transfers.is_empty() && self.asset_transfers.is_empty() {
            return;
        }

        let transfers = self
            .texture_transfers
            .drain()
            .chain(self.asset_transfers.drain())
            .map(|(_, transfer)| transfer);

        for transfer in transfers {
            let Ok(asset_id) = Uuid::parse_str(transfer.asset_id()) else {
                continue;
            };
            let Some(type_code) = asset_type::code_from_name(transfer.asset_type()) else {
                continue;
            };
            self.pending.push(PendingRequest {
                asset_id,
                asset_type: transfer.asset_type().to_string(),
                type_code,
                tags: transfer.tags().to_vec(),
            });
        }
        info!(pending = self.pending.len(), "Connection lost, transfers made pending");
    }

    fn send_pending_requests(&mut self) {
        for request in std::mem::take(&mut self.pending) {
            if request.asset_type == asset_type::TEXTURE {
                self.request_texture(request);
            } else {
                self.request_other_asset(request);
            }
        }
    }

    fn request_texture(&mut self, request: PendingRequest) {
        if let Some(transfer) = self.texture_transfers.get_mut(&request.asset_id) {
            transfer.add_tags(&request.tags);
            return;
        }

        let mut transfer = Transfer::new(request.asset_id.to_string(), request.asset_type);
        transfer.add_tags(&request.tags);
        self.texture_transfers.insert(request.asset_id, transfer);

        debug!(asset_id = %request.asset_id, "Requesting texture");
        if let Err(e) = self
            .transport
            .send(OutboundMessage::request_image(request.asset_id))
        {
            warn!(asset_id = %request.asset_id, error = %e, "Texture request not sent");
        }
    }

    fn request_other_asset(&mut self, request: PendingRequest) {
        let id = request.asset_id.to_string();
        if let Some(transfer) = self
            .asset_transfers
            .values_mut()
            .find(|t| t.asset_id() == id)
        {
            transfer.add_tags(&request.tags);
            return;
        }

        let transfer_id = Uuid::new_v4();
        let mut transfer = Transfer::new(id, request.asset_type);
        transfer.add_tags(&request.tags);
        self.asset_transfers.insert(transfer_id, transfer);

        debug!(asset_id = %request.asset_id, %transfer_id, "Requesting asset");
        let message =
            OutboundMessage::transfer_request(transfer_id, request.asset_id, request.type_code);
        if let Err(e) = self.transport.send(message) {
            warn!(asset_id = %request.asset_id, error = %e, "Asset request not sent");
        }
    }

    fn handle_texture_timeouts(&mut self, delta: Duration) {
        let timeout = self.timeout;
        let expired: Vec<Uuid> = self
            .texture_transfers
            .iter_mut()
            .filter_map(|(id, t)| (!t.ready() && t.add_time(delta) > timeout).then_some(*id))
            .collect();

        for image_id in expired {
            if let Some(transfer) = self.texture_transfers.remove(&image_id) {
                info!(asset_id = %image_id, "Texture transfer timed out");
                if let Err(e) = self.transport.send(OutboundMessage::cancel_image(image_id)) {
                    warn!(asset_id = %image_id, error = %e, "Texture cancel not sent");
                }
                self.send_canceled(&transfer, "timed out");
            }
        }
    }

    fn handle_asset_timeouts(&mut self, delta: Duration) {
        let timeout = self.timeout;
        let expired: Vec<Uuid> = self
            .asset_transfers
            .iter_mut()
            .filter_map(|(id, t)| (!t.ready() && t.add_time(delta) > timeout).then_some(*id))
            .collect();

        for transfer_id in expired {
            if let Some(transfer) = self.asset_transfers.remove(&transfer_id) {
                info!(asset_id = %transfer.asset_id(), "Asset transfer timed out");
                if let Err(e) = self
                    .transport
                    .send(OutboundMessage::transfer_abort(transfer_id))
                {
                    warn!(%transfer_id, error = %e, "Transfer abort not sent");
                }
                self.send_canceled(&transfer, "timed out");
            }
        }
    }

    fn get_transfer(&self, asset_id: &str) -> Option<&Transfer> {
        if let Ok(uuid) = Uuid::parse_str(asset_id) {
            if let Some(transfer) = self.texture_transfers.get(&uuid) {
                return Some(transfer);
            }
        }
        self.asset_transfers
            .values()
            .find(|t| t.asset_id() == asset_id)
    }

    fn is_pending(&self, asset_id: &str) -> bool {
        Uuid::parse_str(asset_id)
            .map(|uuid| self.pending.iter().any(|r| r.asset_id == uuid))
            .unwrap_or(false)
    }
}

impl<T: DatagramTransport> AssetProvider for DatagramProvider<T> {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_valid_id(&self, id: &str, _asset_type: &str) -> bool {
        Uuid::parse_str(id).is_ok()
    }

    fn request_asset(&mut self, id: &str, asset_type: &str, tag: RequestTag) -> bool {
        let Ok(asset_id) = Uuid::parse_str(id) else {
            return false;
        };
        if asset_id.is_nil() {
            return false;
        }
        // Only the fixed set of wire types can be requested
        let Some(type_code) = asset_type::code_from_name(asset_type) else {
            return false;
        };

        self.pending.push(PendingRequest {
            asset_id,
            asset_type: asset_type.to_string(),
            type_code,
            tags: vec![tag],
        });
        true
    }

    fn in_progress(&self, id: &str) -> bool {
        self.get_transfer(id).is_some() || self.is_pending(id)
    }

    fn query_asset_status(&self, id: &str) -> Option<AssetStatus> {
        self.get_transfer(id).map(Transfer::status)
    }

    fn get_incomplete_asset(
        &self,
        id: &str,
        _asset_type: &str,
        min_continuous: u64,
    ) -> Option<Asset> {
        self.get_transfer(id)?.incomplete_asset(min_continuous)
    }

    fn update(&mut self, delta: Duration) {
        while let Ok(message) = self.inbound_rx.try_recv() {
            self.handle_message(message);
        }

        if !self.transport.is_connected() {
            self.make_transfers_pending();
            return;
        }

        self.send_pending_requests();
        self.handle_texture_timeouts(delta);
        self.handle_asset_timeouts(delta);
    }

    fn transfer_info(&self) -> Vec<TransferInfo> {
        self.texture_transfers
            .values()
            .chain(self.asset_transfers.values())
            .map(|t| TransferInfo {
                id: t.asset_id().to_string(),
                asset_type: t.asset_type().to_string(),
                provider: PROVIDER_NAME.to_string(),
                size: t.size(),
                received: t.received(),
                received_continuous: t.received_continuous(),
            })
            .collect()
    }

    fn clear_all_transfers(&mut self) {
        self.pending.clear();
        self.texture_transfers.clear();
        self.asset_transfers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSettings;
    use crate::events::tests::drain;
    use crate::events::{AssetEvent, AssetEventReceiver};
    use crate::provider::datagram::messages::ChannelType;
    use crate::provider::datagram::transport::tests::MockTransport;

    fn provider() -> (DatagramProvider<MockTransport>, AssetEventReceiver) {
        let (events, rx) = AssetEvents::channel();
        let cache = Arc::new(AssetCache::new(CacheSettings::memory_only(), events.clone()));
        let provider = DatagramProvider::new(MockTransport::connected(), cache, events)
            .with_timeout(Duration::from_secs(10));
        (provider, rx)
    }

    fn chunk(byte: u8, len: usize) -> Bytes {
        Bytes::from(vec![byte; len])
    }

    /// Transfer id of the last TransferRequest sent.
    fn last_transfer_id(provider: &DatagramProvider<MockTransport>) -> Uuid {
        provider
            .transport()
            .sent
            .iter()
            .rev()
            .find_map(|m| match m {
                OutboundMessage::TransferRequest { transfer_id, .. } => Some(*transfer_id),
                _ => None,
            })
            .expect("no transfer request sent")
    }

    fn ready_tags(events: &[AssetEvent]) -> Vec<RequestTag> {
        events
            .iter()
            .filter_map(|e| match e {
                AssetEvent::Ready { tag, .. } => Some(*tag),
                _ => None,
            })
            .collect()
    }

    fn canceled_tags(events: &[AssetEvent]) -> Vec<RequestTag> {
        events
            .iter()
            .filter_map(|e| match e {
                AssetEvent::Canceled { tag, .. } => Some(*tag),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_rejects_invalid_ids_and_types() {
        let (mut provider, _rx) = provider();
        assert!(!provider.request_asset("not-a-uuid", "Texture", RequestTag(1)));
        assert!(!provider.request_asset(&Uuid::nil().to_string(), "Texture", RequestTag(1)));
        assert!(!provider.request_asset(&Uuid::new_v4().to_string(), "Hologram", RequestTag(1)));
        assert_eq!(provider.pending_count(), 0);
    }

    #[test]
    fn test_pending_until_tick() {
        let (mut provider, _rx) = provider();
        let id = Uuid::new_v4();
        assert!(provider.request_asset(&id.to_string(), "Texture", RequestTag(1)));

        assert!(provider.in_progress(&id.to_string()));
        assert!(provider.query_asset_status(&id.to_string()).is_none());
        assert!(provider.transport().sent.is_empty());

        provider.update(Duration::from_millis(10));
        assert_eq!(
            provider.transport().sent,
            vec![OutboundMessage::request_image(id)]
        );
        assert!(provider.query_asset_status(&id.to_string()).is_some());
    }

    #[test]
    fn test_texture_out_of_order_walkthrough() {
        let (mut provider, mut rx) = provider();
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        provider.request_asset(&id_str, "Texture", RequestTag(1));
        provider.update(Duration::ZERO);

        // Data packet before the header
        provider.handle_message(InboundMessage::ImagePacket {
            image_id: id,
            packet_index: 2,
            data: chunk(3, 400),
        });
        assert_eq!(
            provider.query_asset_status(&id_str).unwrap().received_continuous,
            0
        );

        provider.handle_message(InboundMessage::ImageData {
            image_id: id,
            codec: 2,
            size: 1000,
            packets: 3,
            data: chunk(1, 300),
        });
        assert_eq!(
            provider.query_asset_status(&id_str).unwrap().received_continuous,
            300
        );

        let partial = provider.get_incomplete_asset(&id_str, "Texture", 300).unwrap();
        assert_eq!(partial.size(), 300);

        provider.handle_message(InboundMessage::ImagePacket {
            image_id: id,
            packet_index: 1,
            data: chunk(2, 300),
        });

        assert!(!provider.in_progress(&id_str));
        let events = drain(&mut rx);
        assert_eq!(ready_tags(&events), vec![RequestTag(1)]);

        let asset = events
            .iter()
            .find_map(|e| match e {
                AssetEvent::Ready { asset, .. } => Some(asset.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(asset.size(), 1000);
        assert_eq!(asset.data()[0], 1);
        assert_eq!(asset.data()[300], 2);
        assert_eq!(asset.data()[600], 3);
    }

    #[test]
    fn test_generic_asset_handshake() {
        let (mut provider, mut rx) = provider();
        let id = Uuid::new_v4();
        provider.request_asset(&id.to_string(), "Sound", RequestTag(5));
        provider.update(Duration::ZERO);

        let transfer_id = last_transfer_id(&provider);
        assert!(matches!(
            provider.transport().sent[0],
            OutboundMessage::TransferRequest { asset_id, asset_type: 1, .. } if asset_id == id
        ));

        provider.handle_message(InboundMessage::TransferInfo {
            transfer_id,
            channel: ChannelType::Asset,
            target: 2,
            status: TransferStatus::Ok,
            size: 6,
        });
        provider.handle_message(InboundMessage::TransferPacket {
            transfer_id,
            channel: ChannelType::Asset,
            packet_index: 0,
            status: TransferStatus::Ok,
            data: chunk(1, 3),
        });
        provider.handle_message(InboundMessage::TransferPacket {
            transfer_id,
            channel: ChannelType::Asset,
            packet_index: 1,
            status: TransferStatus::Done,
            data: chunk(2, 3),
        });

        let events = drain(&mut rx);
        assert_eq!(ready_tags(&events), vec![RequestTag(5)]);
        assert!(!provider.in_progress(&id.to_string()));
    }

    #[test]
    fn test_generic_header_after_data() {
        let (mut provider, mut rx) = provider();
        let id = Uuid::new_v4();
        provider.request_asset(&id.to_string(), "Notecard", RequestTag(1));
        provider.update(Duration::ZERO);
        let transfer_id = last_transfer_id(&provider);

        provider.handle_message(InboundMessage::TransferPacket {
            transfer_id,
            channel: ChannelType::Asset,
            packet_index: 0,
            status: TransferStatus::Ok,
            data: chunk(1, 4),
        });
        assert!(ready_tags(&drain(&mut rx)).is_empty());

        provider.handle_message(InboundMessage::TransferInfo {
            transfer_id,
            channel: ChannelType::Asset,
            target: 2,
            status: TransferStatus::Ok,
            size: 4,
        });
        assert_eq!(ready_tags(&drain(&mut rx)), vec![RequestTag(1)]);
    }

    #[test]
    fn test_bad_status_cancels_once_per_tag() {
        let (mut provider, mut rx) = provider();
        let id = Uuid::new_v4();
        provider.request_asset(&id.to_string(), "Sound", RequestTag(1));
        provider.request_asset(&id.to_string(), "Sound", RequestTag(2));
        provider.update(Duration::ZERO);

        // Second request joined the first transfer
        let requests = provider
            .transport()
            .sent
            .iter()
            .filter(|m| matches!(m, OutboundMessage::TransferRequest { .. }))
            .count();
        assert_eq!(requests, 1);

        let transfer_id = last_transfer_id(&provider);
        provider.handle_message(InboundMessage::TransferInfo {
            transfer_id,
            channel: ChannelType::Asset,
            target: 2,
            status: TransferStatus::NotFound,
            size: 0,
        });

        let events = drain(&mut rx);
        assert_eq!(canceled_tags(&events), vec![RequestTag(1), RequestTag(2)]);
        assert!(!provider.in_progress(&id.to_string()));
    }

    #[test]
    fn test_image_not_in_database() {
        let (mut provider, mut rx) = provider();
        let id = Uuid::new_v4();
        provider.request_asset(&id.to_string(), "Texture", RequestTag(1));
        provider.update(Duration::ZERO);

        provider.handle_message(InboundMessage::ImageNotInDatabase { image_id: id });
        assert_eq!(canceled_tags(&drain(&mut rx)), vec![RequestTag(1)]);

        // A second cancel for the same id is noise
        provider.handle_message(InboundMessage::ImageNotInDatabase { image_id: id });
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_server_abort() {
        let (mut provider, mut rx) = provider();
        let id = Uuid::new_v4();
        provider.request_asset(&id.to_string(), "Animation", RequestTag(1));
        provider.update(Duration::ZERO);
        let transfer_id = last_transfer_id(&provider);

        provider.handle_message(InboundMessage::TransferAbort { transfer_id });
        assert_eq!(canceled_tags(&drain(&mut rx)), vec![RequestTag(1)]);
        assert_eq!(provider.active_count(), 0);
    }

    #[test]
    fn test_timeout_cancels_and_aborts() {
        let (mut provider, mut rx) = provider();
        let texture = Uuid::new_v4();
        let sound = Uuid::new_v4();
        provider.request_asset(&texture.to_string(), "Texture", RequestTag(1));
        provider.request_asset(&sound.to_string(), "Sound", RequestTag(2));
        provider.update(Duration::ZERO);
        let transfer_id = last_transfer_id(&provider);

        for _ in 0..9 {
            provider.update(Duration::from_secs(1));
        }
        assert_eq!(provider.active_count(), 2);
        assert!(canceled_tags(&drain(&mut rx)).is_empty());

        provider.update(Duration::from_secs(2));
        assert_eq!(provider.active_count(), 0);

        let mut tags = canceled_tags(&drain(&mut rx));
        tags.sort();
        assert_eq!(tags, vec![RequestTag(1), RequestTag(2)]);

        let sent = &provider.transport().sent;
        assert!(sent.contains(&OutboundMessage::cancel_image(texture)));
        assert!(sent.contains(&OutboundMessage::transfer_abort(transfer_id)));

        // Nothing more on later ticks
        provider.update(Duration::from_secs(60));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_data_resets_idle_timer() {
        let (mut provider, mut rx) = provider();
        let id = Uuid::new_v4();
        provider.request_asset(&id.to_string(), "Texture", RequestTag(1));
        provider.update(Duration::ZERO);

        provider.update(Duration::from_secs(8));
        provider.handle_message(InboundMessage::ImagePacket {
            image_id: id,
            packet_index: 3,
            data: chunk(1, 10),
        });
        provider.update(Duration::from_secs(8));

        assert!(canceled_tags(&drain(&mut rx)).is_empty());
        assert_eq!(provider.active_count(), 1);
    }

    #[test]
    fn test_disconnect_requeues_and_resumes() {
        let (mut provider, mut rx) = provider();
        let id = Uuid::new_v4();
        provider.request_asset(&id.to_string(), "Texture", RequestTag(1));
        provider.update(Duration::ZERO);
        assert_eq!(provider.active_count(), 1);

        provider.transport_mut().connected = false;
        provider.update(Duration::from_secs(100));
        assert_eq!(provider.active_count(), 0);
        assert_eq!(provider.pending_count(), 1);
        assert!(provider.in_progress(&id.to_string()));
        assert!(drain(&mut rx).is_empty());

        provider.transport_mut().connected = true;
        provider.update(Duration::ZERO);
        assert_eq!(provider.active_count(), 1);
        let requests = provider
            .transport()
            .sent
            .iter()
            .filter(|m| **m == OutboundMessage::request_image(id))
            .count();
        assert_eq!(requests, 2);

        provider.handle_message(InboundMessage::ImageData {
            image_id: id,
            codec: 2,
            size: 5,
            packets: 1,
            data: chunk(1, 5),
        });
        assert_eq!(ready_tags(&drain(&mut rx)), vec![RequestTag(1)]);
    }

    #[test]
    fn test_inbound_channel_is_drained_on_tick() {
        let (mut provider, mut rx) = provider();
        let id = Uuid::new_v4();
        provider.request_asset(&id.to_string(), "Texture", RequestTag(1));
        provider.update(Duration::ZERO);

        let sender = provider.inbound_sender();
        sender
            .send(InboundMessage::ImageData {
                image_id: id,
                codec: 2,
                size: 3,
                packets: 1,
                data: chunk(9, 3),
            })
            .unwrap();
        assert!(ready_tags(&drain(&mut rx)).is_empty());

        provider.update(Duration::from_millis(16));
        assert_eq!(ready_tags(&drain(&mut rx)), vec![RequestTag(1)]);
    }

    #[test]
    fn test_unknown_transfer_messages_are_ignored() {
        let (mut provider, mut rx) = provider();
        provider.handle_message(InboundMessage::TransferPacket {
            transfer_id: Uuid::new_v4(),
            channel: ChannelType::Asset,
            packet_index: 0,
            status: TransferStatus::Ok,
            data: chunk(1, 1),
        });
        provider.handle_message(InboundMessage::ImagePacket {
            image_id: Uuid::new_v4(),
            packet_index: 0,
            data: chunk(1, 1),
        });
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_transfer_info_and_clear() {
        let (mut provider, _rx) = provider();
        provider.request_asset(&Uuid::new_v4().to_string(), "Texture", RequestTag(1));
        provider.request_asset(&Uuid::new_v4().to_string(), "Mesh", RequestTag(2));
        provider.update(Duration::ZERO);

        let info = provider.transfer_info();
        assert_eq!(info.len(), 2);
        assert!(info.iter().all(|i| i.provider == "Legacy UDP"));

        provider.clear_all_transfers();
        assert!(provider.transfer_info().is_empty());
        assert_eq!(provider.pending_count(), 0);
    }
}
