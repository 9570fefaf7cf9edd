#![doc(html_root_url = "https://docs.rs/agentlink/latest")]
//! Public API for the `agentlink` library.
//!
//! This crate provides a self-healing command/response client that lets a
//! controller send administrative commands to remote agents over a message
//! bus and receive correlated replies, together with the transport
//! abstraction it drives and a bundled TCP transport.

pub mod client;
pub mod message;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod test_helpers;
pub mod transport;

pub use client::{BackoffPolicy, CommandClient, CommandClientBuilder, CommandError, OrphanPolicy};
pub use message::{Message, Properties};
pub use transport::{ConnectOptions, Connector, TcpConnector, TransportError};
