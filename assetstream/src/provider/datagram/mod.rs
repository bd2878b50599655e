//! Legacy datagram transport.
//!
//! Assets travel over two channels with different correlation ids:
//!
//! - **Image channel** (textures): keyed by the asset id. The header
//!   (`ImageData`) carries packet 0 and the total size, but data packets may
//!   arrive before it.
//! - **Transfer channel** (everything else): keyed by a random transfer id
//!   chosen by the client. Request, then `TransferInfo` header, then
//!   `TransferPacket`s.
//!
//! Requests are queued until the transport reports a live connection. When
//! the connection drops, active transfers are turned back into pending
//! requests and re-issued on reconnect.

mod messages;
mod provider;
mod transport;

pub use messages::{
    ChannelType, ImageType, InboundMessage, OutboundMessage, SourceType, TransferStatus,
};
pub use provider::DatagramProvider;
pub use transport::DatagramTransport;

#[cfg(test)]
pub(crate) use transport::tests::MockTransport;
