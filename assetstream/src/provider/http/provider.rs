//! HTTP provider state machine.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::session::{HttpConnector, HttpSession, SessionRead};
use crate::asset::{Asset, RequestTag};
use crate::asset_type;
use crate::cache::AssetCache;
use crate::events::AssetEvents;
use crate::provider::{AssetProvider, AssetStatus, ProviderError, TransferInfo};
use crate::transfer::{ReassemblyBuffer, Transfer};

/// Default idle timeout for HTTP transfers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of simultaneously open sessions.
pub const DEFAULT_MAX_TRANSFERS: usize = 64;

/// Body bytes read per transfer per tick (64KB).
const READ_BUDGET: usize = 64 * 1024;

const PROVIDER_NAME: &str = "Http";

const METADATA_SUFFIX: &str = "/metadata";
const DATA_SUFFIX: &str = "/data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    FetchingMetadata,
    FetchingData,
}

/// Outcome of pumping one transfer.
#[derive(Debug)]
enum Step {
    Running,
    Complete,
    Failed(String),
}

/// URLs a fetch goes through.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FetchPlan {
    metadata_url: Option<Url>,
    data_url: Url,
}

/// One HTTP fetch, queued or active.
struct HttpTransfer {
    transfer: Transfer,
    plan: FetchPlan,
    phase: Phase,
    session: Option<Box<dyn HttpSession>>,
    /// Whether the current phase's response head has arrived.
    head_seen: bool,
    /// Declared length of the current phase's body.
    content_length: Option<u64>,
    /// Next packet index within the current phase.
    packet: u32,
    metadata: ReassemblyBuffer,
    metadata_bytes: Option<Vec<u8>>,
}

impl HttpTransfer {
    fn new(id: &str, asset_type: &str, plan: FetchPlan) -> Self {
        let phase = if plan.metadata_url.is_some() {
            Phase::FetchingMetadata
        } else {
            Phase::FetchingData
        };
        Self {
            transfer: Transfer::new(id, asset_type),
            plan,
            phase,
            session: None,
            head_seen: false,
            content_length: None,
            packet: 0,
            metadata: ReassemblyBuffer::new(),
            metadata_bytes: None,
        }
    }

    fn phase_url(&self) -> &Url {
        match (self.phase, &self.plan.metadata_url) {
            (Phase::FetchingMetadata, Some(url)) => url,
            _ => &self.plan.data_url,
        }
    }

    fn phase_received(&self) -> u64 {
        match self.phase {
            Phase::FetchingMetadata => self.metadata.received(),
            Phase::FetchingData => self.transfer.received(),
        }
    }

    /// Read up to the per-tick budget from the current session.
    fn pump(&mut self, connector: &dyn HttpConnector, events: &AssetEvents) -> Step {
        let mut budget = READ_BUDGET;

        while budget > 0 {
            if self.session.is_none() {
                debug!(asset_id = %self.transfer.asset_id(), url = %self.phase_url(), "Opening HTTP session");
                match connector.open(self.phase_url()) {
                    Ok(session) => self.session = Some(session),
                    Err(e) => return Step::Failed(e.to_string()),
                }
            }
            let Some(session) = self.session.as_mut() else {
                return Step::Running;
            };

            match session.read(budget) {
                Ok(SessionRead::Pending) => return Step::Running,
                Ok(SessionRead::Head {
                    status,
                    content_length,
                }) => {
                    if !(200..300).contains(&status) {
                        return Step::Failed(format!("HTTP status {}", status));
                    }
                    self.head_seen = true;
                    self.content_length = content_length;
                    match (self.phase, content_length) {
                        (Phase::FetchingData, Some(len)) => self.transfer.set_size(len),
                        _ => self.transfer.reset_idle(),
                    }
                }
                Ok(SessionRead::Data(bytes)) => {
                    budget = budget.saturating_sub(bytes.len());
                    let index = self.packet;
                    self.packet += 1;
                    match self.phase {
                        Phase::FetchingMetadata => {
                            self.metadata.receive(index, bytes);
                            self.transfer.reset_idle();
                        }
                        Phase::FetchingData => {
                            self.transfer.receive_data(index, bytes);
                            let status = self.transfer.status();
                            events.progress(
                                self.transfer.asset_id(),
                                self.transfer.asset_type(),
                                status.size,
                                status.received,
                                status.received_continuous,
                            );
                        }
                    }
                }
                Ok(SessionRead::End) => {
                    if !self.head_seen {
                        return Step::Failed("connection closed before response".to_string());
                    }
                    let received = self.phase_received();
                    if let Some(expected) = self.content_length {
                        if expected != received {
                            return Step::Failed(format!(
                                "content length mismatch: expected {}, received {}",
                                expected, received
                            ));
                        }
                    }

                    match self.phase {
                        Phase::FetchingMetadata => {
                            self.metadata_bytes = Some(self.metadata.assemble());
                            self.phase = Phase::FetchingData;
                            self.session = None;
                            self.head_seen = false;
                            self.content_length = None;
                            self.packet = 0;
                        }
                        Phase::FetchingData => {
                            if self.transfer.size() == 0 {
                                self.transfer.set_size(received);
                            }
                            return Step::Complete;
                        }
                    }
                }
                Err(e) => return Step::Failed(e.to_string()),
            }
        }

        Step::Running
    }

    fn into_asset(self) -> (Asset, Vec<RequestTag>) {
        let (asset, tags) = self.transfer.into_asset();
        match self.metadata_bytes {
            Some(metadata) => (asset.with_metadata(metadata), tags),
            None => (asset, tags),
        }
    }
}

/// Provider fetching assets with HTTP GETs.
pub struct HttpProvider {
    connector: Arc<dyn HttpConnector>,
    cache: Arc<AssetCache>,
    events: AssetEvents,
    timeout: Duration,
    texture_cap: Option<Url>,
    max_transfers: usize,
    /// Transfers with an open (or opening) session.
    active: HashMap<String, HttpTransfer>,
    /// Transfers waiting for a free session slot, oldest first.
    queued: VecDeque<HttpTransfer>,
}

impl HttpProvider {
    pub fn new(connector: Arc<dyn HttpConnector>, cache: Arc<AssetCache>, events: AssetEvents) -> Self {
        Self {
            connector,
            cache,
            events,
            timeout: DEFAULT_TIMEOUT,
            texture_cap: None,
            max_transfers: DEFAULT_MAX_TRANSFERS,
            active: HashMap::new(),
            queued: VecDeque::new(),
        }
    }

    /// Set the idle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap on simultaneously open sessions (minimum 1).
    pub fn with_max_transfers(mut self, max_transfers: usize) -> Self {
        self.max_transfers = max_transfers.max(1);
        self
    }

    /// Capability URL used for UUID texture and mesh ids.
    pub fn with_texture_cap(mut self, url: &str) -> Result<Self, ProviderError> {
        let parsed = Url::parse(url).map_err(|e| ProviderError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.texture_cap = Some(parsed);
        Ok(self)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    /// Work out which URLs to fetch for an id.
    fn plan(&self, id: &str, asset_type: &str) -> Option<FetchPlan> {
        if let Ok(uuid) = Uuid::parse_str(id) {
            let cap = self.texture_cap.as_ref()?;
            if !asset_type::is_capability_type(asset_type) {
                return None;
            }
            let mut data_url = cap.clone();
            data_url
                .query_pairs_mut()
                .append_pair("texture_id", &uuid.to_string());
            return Some(FetchPlan {
                metadata_url: None,
                data_url,
            });
        }

        let url = Url::parse(id).ok()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }

        let path = url.path().to_string();
        if let Some(base) = path.strip_suffix(METADATA_SUFFIX) {
            let mut data_url = url.clone();
            data_url.set_path(&format!("{}{}", base, DATA_SUFFIX));
            Some(FetchPlan {
                metadata_url: Some(url),
                data_url,
            })
        } else if let Some(base) = path.strip_suffix(DATA_SUFFIX) {
            let mut metadata_url = url.clone();
            metadata_url.set_path(&format!("{}{}", base, METADATA_SUFFIX));
            Some(FetchPlan {
                metadata_url: Some(metadata_url),
                data_url: url,
            })
        } else {
            Some(FetchPlan {
                metadata_url: None,
                data_url: url,
            })
        }
    }

    fn find(&self, id: &str) -> Option<&HttpTransfer> {
        self.active
            .get(id)
            .or_else(|| self.queued.iter().find(|t| t.transfer.asset_id() == id))
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut HttpTransfer> {
        if let Some(transfer) = self.active.get_mut(id) {
            return Some(transfer);
        }
        self.queued
            .iter_mut()
            .find(|t| t.transfer.asset_id() == id)
    }

    fn start_queued(&mut self) {
        while self.active.len() < self.max_transfers {
            let Some(transfer) = self.queued.pop_front() else {
                break;
            };
            self.active
                .insert(transfer.transfer.asset_id().to_string(), transfer);
        }
    }

    fn finish(&mut self, id: &str, step: Step) {
        let Some(transfer) = self.active.remove(id) else {
            return;
        };

        match step {
            Step::Running => {
                self.active.insert(id.to_string(), transfer);
            }
            Step::Complete => {
                let (asset, tags) = transfer.into_asset();
                debug!(asset_id = %asset.id(), bytes = asset.size(), "HTTP transfer complete");
                let handle = self.cache.store(asset);
                self.events.ready(&handle, &tags);
            }
            Step::Failed(reason) => {
                warn!(asset_id = %id, %reason, "HTTP transfer failed");
                self.events.canceled(
                    transfer.transfer.asset_id(),
                    transfer.transfer.asset_type(),
                    transfer.transfer.tags(),
                    Some(reason.as_str()),
                );
            }
        }
    }
}

impl AssetProvider for HttpProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_valid_id(&self, id: &str, asset_type: &str) -> bool {
        self.plan(id, asset_type).is_some()
    }

    fn request_asset(&mut self, id: &str, asset_type: &str, tag: RequestTag) -> bool {
        let Some(plan) = self.plan(id, asset_type) else {
            return false;
        };

        if let Some(existing) = self.find_mut(id) {
            existing.transfer.add_tags(&[tag]);
            return true;
        }

        let mut transfer = HttpTransfer::new(id, asset_type, plan);
        transfer.transfer.add_tags(&[tag]);
        self.queued.push_back(transfer);
        true
    }

    fn in_progress(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    fn query_asset_status(&self, id: &str) -> Option<AssetStatus> {
        self.find(id).map(|t| t.transfer.status())
    }

    fn get_incomplete_asset(
        &self,
        id: &str,
        _asset_type: &str,
        min_continuous: u64,
    ) -> Option<Asset> {
        self.find(id)?.transfer.incomplete_asset(min_continuous)
    }

    fn update(&mut self, delta: Duration) {
        self.start_queued();

        let ids: Vec<String> = self.active.keys().cloned().collect();
        for id in &ids {
            let step = match self.active.get_mut(id) {
                Some(transfer) => transfer.pump(self.connector.as_ref(), &self.events),
                None => continue,
            };
            if !matches!(step, Step::Running) {
                self.finish(id, step);
            }
        }

        let timeout = self.timeout;
        let expired: Vec<String> = self
            .active
            .iter_mut()
            .filter_map(|(id, t)| (t.transfer.add_time(delta) > timeout).then(|| id.clone()))
            .collect();
        for id in expired {
            info!(asset_id = %id, "HTTP transfer timed out");
            self.finish(&id, Step::Failed("timed out".to_string()));
        }

        // Slots freed this tick are refilled on the next one
    }

    fn transfer_info(&self) -> Vec<TransferInfo> {
        self.active
            .values()
            .chain(self.queued.iter())
            .map(|t| TransferInfo {
                id: t.transfer.asset_id().to_string(),
                asset_type: t.transfer.asset_type().to_string(),
                provider: PROVIDER_NAME.to_string(),
                size: t.transfer.size(),
                received: t.transfer.received(),
                received_continuous: t.transfer.received_continuous(),
            })
            .collect()
    }

    fn clear_all_transfers(&mut self) {
        self.active.clear();
        self.queued.clear();
    }
}
