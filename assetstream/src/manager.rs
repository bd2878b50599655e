//! Asset manager.
//!
//! Owns the providers and the shared cache, hands out request tags and
//! drives everything from [`AssetManager::update`].

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::asset::{Asset, AssetHandle, RequestTag};
use crate::cache::AssetCache;
use crate::config::ConfigFile;
use crate::events::{AssetEventReceiver, AssetEvents};
use crate::provider::{
    AssetProvider, AssetStatus, HttpProvider, ProviderError, ReqwestConnector,
    ReqwestRpcTransport, RpcProvider, TransferInfo,
};

/// Front door of the engine.
///
/// Requests are answered from the cache when possible (memory, then disk)
/// and otherwise routed to the first provider, in registration order, that
/// accepts the id.
pub struct AssetManager {
    providers: Vec<Box<dyn AssetProvider>>,
    cache: Arc<AssetCache>,
    events: AssetEvents,
    next_tag: u64,
}

impl AssetManager {
    /// Create a manager with no providers.
    pub fn new(cache: Arc<AssetCache>, events: AssetEvents) -> Self {
        Self {
            providers: Vec::new(),
            cache,
            events,
            next_tag: 1,
        }
    }

    /// Build the cache and the network providers from configuration.
    ///
    /// A provider whose transport cannot be initialized is left out and the
    /// rest keep working. The datagram provider needs a live session from
    /// the embedding application and is added with [`add_provider`].
    ///
    /// [`add_provider`]: AssetManager::add_provider
    pub fn from_config(config: &ConfigFile, runtime: Handle) -> (Self, AssetEventReceiver) {
        let (events, receiver) = AssetEvents::channel();
        let cache = Arc::new(AssetCache::new(config.cache_settings(), events.clone()));
        let mut manager = Self::new(Arc::clone(&cache), events.clone());

        // Avatar storage ids are also plain http(s) URLs, so XML-RPC routes first
        match ReqwestRpcTransport::new() {
            Ok(transport) => {
                let provider = RpcProvider::new(
                    Arc::new(transport),
                    runtime.clone(),
                    Arc::clone(&cache),
                    events.clone(),
                )
                .with_timeout(config.asset_system.rpc_timeout);
                manager.add_provider(Box::new(provider));
            }
            Err(e) => warn!(error = %e, "XML-RPC provider unavailable"),
        }

        match build_http_provider(config, runtime, &cache, &events) {
            Ok(provider) => manager.add_provider(Box::new(provider)),
            Err(e) => warn!(error = %e, "HTTP provider unavailable"),
        }

        (manager, receiver)
    }

    /// Register a provider after the existing ones.
    ///
    /// The datagram provider takes its idle timeout from `[asset_system] udp_timeout`:
    ///
    /// ```ignore
    /// let provider = DatagramProvider::new(transport, manager.cache().clone(), manager.events().clone())
    ///     .with_timeout(config.asset_system.udp_timeout);
    /// manager.add_provider(Box::new(provider));
    /// ```
    pub fn add_provider(&mut self, provider: Box<dyn AssetProvider>) {
        info!(provider = provider.name(), "Asset provider registered");
        self.providers.push(provider);
    }

    /// Names of the registered providers, in routing order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn cache(&self) -> &Arc<AssetCache> {
        &self.cache
    }

    /// Event sender, for constructing providers that share this manager's
    /// event stream.
    pub fn events(&self) -> &AssetEvents {
        &self.events
    }

    /// Request an asset.
    ///
    /// Returns the tag that the eventual `Ready` or `Canceled` event will
    /// carry, or `None` if no provider accepts the id. A cache hit raises
    /// `Ready` immediately.
    pub fn request_asset(&mut self, id: &str, asset_type: &str) -> Option<RequestTag> {
        let tag = RequestTag(self.next_tag);
        self.next_tag += 1;

        if let Some(asset) = self.cache.get(id, true, true) {
            debug!(asset_id = %id, %tag, "Request served from cache");
            self.events.ready(&asset, &[tag]);
            return Some(tag);
        }

        for provider in &mut self.providers {
            if provider.is_valid_id(id, asset_type) && provider.request_asset(id, asset_type, tag) {
                debug!(asset_id = %id, %asset_type, %tag, provider = provider.name(), "Asset requested");
                return Some(tag);
            }
        }

        warn!(asset_id = %id, %asset_type, "No provider accepts asset id");
        None
    }

    /// A cached asset, from memory or disk.
    pub fn get_asset(&self, id: &str) -> Option<AssetHandle> {
        self.cache.get(id, true, true)
    }

    pub fn is_in_progress(&self, id: &str) -> bool {
        self.providers.iter().any(|p| p.in_progress(id))
    }

    /// Progress of an in-flight fetch.
    pub fn query_asset_status(&self, id: &str) -> Option<AssetStatus> {
        self.providers
            .iter()
            .find(|p| p.in_progress(id))
            .and_then(|p| p.query_asset_status(id))
    }

    /// Gap-free prefix of an in-flight fetch, if at least `min_continuous`
    /// bytes of it are available.
    pub fn get_incomplete_asset(&self, id: &str, asset_type: &str, min_continuous: u64) -> Option<Asset> {
        self.providers
            .iter()
            .find(|p| p.in_progress(id))
            .and_then(|p| p.get_incomplete_asset(id, asset_type, min_continuous))
    }

    /// One tick: every provider in registration order, then cache upkeep.
    pub fn update(&mut self, delta: Duration) {
        for provider in &mut self.providers {
            provider.update(delta);
        }
        self.cache.update(delta);
    }

    /// Active transfers of every provider.
    pub fn transfer_info(&self) -> Vec<TransferInfo> {
        self.providers
            .iter()
            .flat_map(|p| p.transfer_info())
            .collect()
    }

    /// Drop every pending and active transfer without raising events.
    pub fn clear_all_transfers(&mut self) {
        for provider in &mut self.providers {
            provider.clear_all_transfers();
        }
    }
}

fn build_http_provider(
    config: &ConfigFile,
    runtime: Handle,
    cache: &Arc<AssetCache>,
    events: &AssetEvents,
) -> Result<HttpProvider, ProviderError> {
    let connector = ReqwestConnector::new(runtime)?;
    let provider = HttpProvider::new(Arc::new(connector), Arc::clone(cache), events.clone())
        .with_timeout(config.asset_system.http_timeout)
        .with_max_transfers(config.asset_system.max_http_transfers);

    match &config.asset_system.texture_cap_url {
        Some(url) => provider.with_texture_cap(url),
        None => Ok(provider),
    }
}
