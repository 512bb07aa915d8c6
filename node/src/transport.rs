//! Contract with the peer transport.
//!
//! The transport owns connection establishment. The node only broadcasts opaque
//! envelopes and consumes [`TransportEvent`]s.

use bytes::Bytes;
use ludo_types::PlayerId;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    Reliable,
    BestEffort,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("send failed: {0}")]
    Send(String),
}

/// Outbound half of the peer set.
pub trait Transport: Send + 'static {
    /// Deliver `bytes` to every other peer.
    fn broadcast(&self, bytes: Bytes, mode: DeliveryMode) -> Result<(), TransportError>;
}

/// Inbound half of the peer set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Received { bytes: Bytes, sender: PlayerId },
    Connected(PlayerId),
    Disconnected(PlayerId),
}
