//! Outbound side of the datagram transport.

use super::messages::OutboundMessage;
use crate::provider::ProviderError;

/// Connection used by the datagram provider to reach the asset server.
///
/// Inbound messages are not pulled through this trait; the network layer
/// pushes them into the provider's inbound channel.
pub trait DatagramTransport: Send {
    /// Whether a live connection exists.
    fn is_connected(&self) -> bool;

    /// Send a message reliably.
    fn send(&mut self, message: OutboundMessage) -> Result<(), ProviderError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Mock transport recording every sent message.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        pub connected: bool,
        pub sent: Vec<OutboundMessage>,
    }

    impl MockTransport {
        pub fn connected() -> Self {
            Self {
                connected: true,
                sent: Vec::new(),
            }
        }
    }

    impl DatagramTransport for MockTransport {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send(&mut self, message: OutboundMessage) -> Result<(), ProviderError> {
            if !self.connected {
                return Err(ProviderError::NotConnected);
            }
            self.sent.push(message);
            Ok(())
        }
    }

    #[test]
    fn test_mock_refuses_when_disconnected() {
        let mut transport = MockTransport::default();
        let result = transport.send(OutboundMessage::request_image(uuid::Uuid::new_v4()));
        assert!(matches!(result, Err(ProviderError::NotConnected)));
        assert!(transport.sent.is_empty());
    }
}
