//! AssetStream - asset transfer and caching engine
//!
//! This library fetches opaque binary assets (textures, meshes, sounds, avatar
//! descriptors) from several transports, reassembles packetized or partial
//! transfers, stores the results in a two-tier memory/disk cache and notifies
//! consumers through asset events.
//!
//! # Tick Model
//!
//! Everything that mutates transfer state runs inside [`AssetManager::update`],
//! called once per logical frame with the elapsed time. Network activity that
//! cannot block the tick (HTTP bodies, XML-RPC calls) runs on a Tokio runtime
//! and is handed back through channels that the providers drain each tick.
//!
//! ```ignore
//! use assetstream::{AssetManager, ConfigFile};
//!
//! let config = ConfigFile::load()?;
//! let (mut manager, mut events) = AssetManager::from_config(&config, runtime.handle().clone());
//!
//! let tag = manager.request_asset("http://assets.example.com/a1/data", "Texture");
//! loop {
//!     manager.update(Duration::from_millis(50));
//!     while let Ok(event) = events.try_recv() { /* ... */ }
//! }
//! ```

pub mod asset;
pub mod asset_type;
pub mod cache;
pub mod config;
pub mod events;
pub mod logging;
pub mod manager;
pub mod provider;
pub mod transfer;

pub use asset::{Asset, AssetHandle, RequestTag};
pub use cache::{AssetCache, CacheError};
pub use config::{ConfigError, ConfigFile};
pub use events::{AssetEvent, AssetEventReceiver, AssetEvents};
pub use manager::AssetManager;
pub use provider::{AssetProvider, AssetStatus, ProviderError, TransferInfo};
