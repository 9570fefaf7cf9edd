//! Error types for command client operations.

use std::time::Duration;

use crate::transport::TransportError;

/// Errors returned to callers of [`CommandClient`](super::CommandClient).
///
/// Connection-level failures never appear here: they are retried by the
/// supervisor and only observable through
/// [`connected`](super::CommandClient::connected).
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The command could not be transmitted.
    #[error("failed to send command: {0}")]
    Send(#[source] TransportError),
    /// No response arrived within the caller's deadline.
    #[error("timed out after {0:?} waiting for response")]
    Timeout(Duration),
    /// The client was stopped, or never started, before a response arrived.
    #[error("command client is stopped")]
    Stopped,
    /// The connection carrying the command was torn down before a response
    /// arrived. Only produced under [`OrphanPolicy::Fail`](super::OrphanPolicy::Fail).
    #[error("connection lost before a response arrived")]
    ConnectionLost,
}
