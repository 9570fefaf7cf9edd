//! Error types for transport operations.

use std::io;

/// Errors emitted by [`Connector`](super::Connector) implementations and the
/// sessions and links they create.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket-level failure (DNS, TCP, read or write).
    #[error("network error: {0}")]
    Io(#[from] io::Error),
    /// The TCP connection was not established within the connect timeout.
    #[error("connect timed out")]
    ConnectTimeout,
    /// The peer rejected the connection, for example on bad credentials.
    #[error("connection refused by peer: {0}")]
    Refused(String),
    /// The peer sent a frame that violates the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Failed to encode an outbound frame.
    #[error("failed to encode frame")]
    Encode(#[source] bincode::error::EncodeError),
    /// Failed to decode an inbound frame.
    #[error("failed to decode frame")]
    Decode(#[source] bincode::error::DecodeError),
    /// The peer detached the link.
    #[error("link detached by peer: {0}")]
    Detached(String),
    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,
}

impl TransportError {
    /// Returns true for failures of the underlying network transport.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentlink::transport::TransportError;
    ///
    /// assert!(TransportError::ConnectTimeout.is_network());
    /// assert!(!TransportError::Refused("bad credentials".into()).is_network());
    /// ```
    #[must_use]
    pub fn is_network(&self) -> bool { matches!(self, Self::Io(_) | Self::ConnectTimeout) }
}
