//! Request bookkeeping for the XML-RPC provider.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use url::Url;

use super::pool::{Job, JobResult, WorkerPool};
use super::transport::RpcTransport;
use super::xmlrpc::{decode_response, encode_call, RpcValue};
use crate::asset::{Asset, RequestTag};
use crate::cache::AssetCache;
use crate::events::AssetEvents;
use crate::provider::{AssetProvider, AssetStatus, TransferInfo};

/// Default time to wait for a reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Method fetching one stored item by hash.
pub const GET_ITEM_METHOD: &str = "GetItem";

const PROVIDER_NAME: &str = "XmlRpc";

const AVATAR_SEGMENT: &str = "/avatar/";
const XMLRPC_SEGMENT: &str = "/xmlrpc/";

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    host: String,
    endpoint: String,
    hash: String,
}

/// Split an id into worker host, call endpoint and item hash.
fn parse_target(id: &str) -> Option<Target> {
    let url = Url::parse(id).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => return None,
    };

    let split = id.rfind(AVATAR_SEGMENT)?;
    let hash = &id[split + AVATAR_SEGMENT.len()..];
    if hash.is_empty() || hash.contains('/') || hash.contains('?') {
        return None;
    }

    Some(Target {
        host,
        endpoint: format!("{}{}", &id[..split], XMLRPC_SEGMENT),
        hash: hash.to_string(),
    })
}

/// One outstanding request. Later requests for the same id join its tags.
#[derive(Debug)]
struct RpcRequest {
    correlation: u64,
    asset_id: String,
    asset_type: String,
    target: Target,
    tags: Vec<RequestTag>,
    elapsed: Duration,
    submitted: bool,
}

/// Provider fetching assets with XML-RPC calls on a worker pool.
pub struct RpcProvider {
    pool: WorkerPool,
    cache: Arc<AssetCache>,
    events: AssetEvents,
    timeout: Duration,
    next_correlation: u64,
    requests: Vec<RpcRequest>,
}

impl RpcProvider {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        runtime: Handle,
        cache: Arc<AssetCache>,
        events: AssetEvents,
    ) -> Self {
        Self {
            pool: WorkerPool::new(transport, runtime),
            cache,
            events,
            timeout: DEFAULT_TIMEOUT,
            next_correlation: 1,
            requests: Vec::new(),
        }
    }

    /// Set the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    fn submit_new_requests(&mut self) {
        for request in self.requests.iter_mut().filter(|r| !r.submitted) {
            let params = [RpcValue::structure([(
                "hashcode",
                RpcValue::String(request.target.hash.clone()),
            )])];
            let job = Job {
                correlation: request.correlation,
                endpoint: request.target.endpoint.clone(),
                body: encode_call(GET_ITEM_METHOD, &params),
            };
            debug!(
                asset_id = %request.asset_id,
                correlation = request.correlation,
                "Submitting RPC request"
            );
            self.pool.submit(&request.target.host, job);
            request.submitted = true;
        }
    }

    fn handle_result(&mut self, result: JobResult) {
        let Some(position) = self
            .requests
            .iter()
            .position(|r| r.correlation == result.correlation)
        else {
            warn!(correlation = result.correlation, "RPC result for unknown request dropped");
            return;
        };
        let request = self.requests.remove(position);

        let reply = result.outcome.and_then(|body| decode_response(&body));
        let value = match reply {
            Ok(value) => value,
            Err(e) => {
                warn!(asset_id = %request.asset_id, error = %e, "RPC request failed");
                self.cancel(&request, &e.to_string());
                return;
            }
        };

        if let Some(message) = value.member("Error").and_then(RpcValue::as_str) {
            warn!(asset_id = %request.asset_id, %message, "Storage reported an error");
            self.cancel(&request, message);
            return;
        }

        match value.member("binaries").and_then(RpcValue::as_bytes) {
            Some(bytes) => {
                debug!(asset_id = %request.asset_id, bytes = bytes.len(), "RPC transfer complete");
                let asset = Asset::new(request.asset_id, request.asset_type, bytes.to_vec());
                let handle = self.cache.store(asset);
                self.events.ready(&handle, &request.tags);
            }
            None => {
                warn!(asset_id = %request.asset_id, "Reply carried no binaries");
                self.cancel(&request, "reply carried no binaries");
            }
        }
    }

    fn cancel(&self, request: &RpcRequest, reason: &str) {
        self.events.canceled(
            &request.asset_id,
            &request.asset_type,
            &request.tags,
            Some(reason),
        );
    }

    fn find(&self, id: &str) -> Option<&RpcRequest> {
        self.requests.iter().find(|r| r.asset_id == id)
    }
}

impl AssetProvider for RpcProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_valid_id(&self, id: &str, _asset_type: &str) -> bool {
        parse_target(id).is_some()
    }

    fn request_asset(&mut self, id: &str, asset_type: &str, tag: RequestTag) -> bool {
        let Some(target) = parse_target(id) else {
            return false;
        };

        if let Some(existing) = self.requests.iter_mut().find(|r| r.asset_id == id) {
            if !existing.tags.contains(&tag) {
                existing.tags.push(tag);
            }
            return true;
        }

        let correlation = self.next_correlation;
        self.next_correlation += 1;
        self.requests.push(RpcRequest {
            correlation,
            asset_id: id.to_string(),
            asset_type: asset_type.to_string(),
            target,
            tags: vec![tag],
            elapsed: Duration::ZERO,
            submitted: false,
        });
        true
    }

    fn in_progress(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    fn query_asset_status(&self, id: &str) -> Option<AssetStatus> {
        // Replies arrive whole, so there is no partial progress to report
        self.find(id).map(|_| AssetStatus::default())
    }

    fn get_incomplete_asset(&self, _id: &str, _asset_type: &str, _min_continuous: u64) -> Option<Asset> {
        None
    }

    fn update(&mut self, delta: Duration) {
        self.submit_new_requests();

        for result in self.pool.poll() {
            self.handle_result(result);
        }

        let timeout = self.timeout;
        let mut index = 0;
        while index < self.requests.len() {
            self.requests[index].elapsed += delta;
            if self.requests[index].elapsed > timeout {
                let request = self.requests.remove(index);
                info!(asset_id = %request.asset_id, "RPC request timed out");
                self.cancel(&request, "timed out");
            } else {
                index += 1;
            }
        }

        if self.requests.is_empty() && self.pool.worker_count() > 0 {
            self.pool.release();
        }
    }

    fn transfer_info(&self) -> Vec<TransferInfo> {
        self.requests
            .iter()
            .map(|r| TransferInfo {
                id: r.asset_id.clone(),
                asset_type: r.asset_type.clone(),
                provider: PROVIDER_NAME.to_string(),
                size: 0,
                received: 0,
                received_continuous: 0,
            })
            .collect()
    }

    fn clear_all_transfers(&mut self) {
        self.requests.clear();
        self.pool.release();
    }
}
