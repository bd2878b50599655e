//! Asset provider abstraction
//!
//! A provider fetches assets over one transport. Three implementations exist:
//!
//! - [`DatagramProvider`]: legacy packetized transport with image and generic
//!   transfer channels
//! - [`HttpProvider`]: plain HTTP GETs, optionally with a metadata phase
//! - [`RpcProvider`]: XML-RPC calls to avatar storage, executed on a
//!   per-host worker pool
//!
//! The manager holds providers as `Box<dyn AssetProvider>` and routes each
//! request to the first one whose [`AssetProvider::is_valid_id`] accepts it.

mod datagram;
mod http;
mod rpc;
mod types;

pub use datagram::{
    ChannelType, DatagramProvider, DatagramTransport, ImageType, InboundMessage, OutboundMessage,
    SourceType, TransferStatus,
};
pub use http::{HttpConnector, HttpProvider, HttpSession, ReqwestConnector, SessionRead};
pub use rpc::{ReqwestRpcTransport, RpcError, RpcProvider, RpcTransport, RpcValue};
pub use types::{AssetProvider, AssetStatus, BoxFuture, ProviderError, TransferInfo};

#[cfg(test)]
pub(crate) use datagram::MockTransport;
#[cfg(test)]
pub(crate) use http::{MockConnector, MockResponse};
