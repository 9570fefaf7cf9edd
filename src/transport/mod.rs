//! Transport abstraction consumed by the command client.
//!
//! The command client never touches sockets directly. It drives a
//! [`Connector`] through the connection, session and link lifecycle described
//! by these traits. [`tcp`] provides the bundled implementation speaking the
//! length-delimited bus protocol in [`frame`].

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;

mod error;
pub mod frame;
pub mod tcp;

pub use error::TransportError;
pub use tcp::TcpConnector;

use crate::message::Message;

/// Settlement mode requested when attaching a sending link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum SettleMode {
    /// Every transfer is acknowledged by the peer.
    Unsettled,
    /// Transfers are settled on send.
    Settled,
    /// The sender decides per transfer.
    #[default]
    Mixed,
}

/// Credentials presented when opening a connection.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Low-level connection options.
///
/// The command client treats these as opaque and hands them to the
/// [`Connector`] on every dial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Identifier announced to the peer when the connection opens.
    pub container_id: String,
    /// Optional credentials.
    pub credentials: Option<Credentials>,
    /// Idle timeout announced to the peer.
    pub idle_timeout: Option<Duration>,
    /// Upper bound on establishing the TCP connection.
    pub connect_timeout: Option<Duration>,
    /// Whether to disable Nagle's algorithm.
    pub nodelay: bool,
    /// Maximum accepted frame length in bytes.
    pub max_frame_length: usize,
    /// Additional properties passed through to the peer.
    pub properties: BTreeMap<String, String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            container_id: format!("agentlink-{}", uuid::Uuid::new_v4()),
            credentials: None,
            idle_timeout: None,
            connect_timeout: Some(Duration::from_secs(10)),
            nodelay: true,
            max_frame_length: 1024 * 1024,
            properties: BTreeMap::new(),
        }
    }
}

impl ConnectOptions {
    /// Attach credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Set the idle timeout announced to the peer.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set the TCP connect timeout. `None` waits for the operating system.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Add a free-form connection property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Establishes physical connections to a bus.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connection type produced by [`dial`](Self::dial).
    type Connection: Connection;

    /// Open a connection to `addr`.
    async fn dial(
        &self,
        addr: &str,
        options: &ConnectOptions,
    ) -> Result<Self::Connection, TransportError>;
}

/// An open physical connection.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Session type produced by [`new_session`](Self::new_session).
    type Session: Session;

    /// Begin a logical session on this connection.
    async fn new_session(&mut self) -> Result<Self::Session, TransportError>;

    /// Close the connection.
    async fn close(self) -> Result<(), TransportError>;
}

/// A logical session multiplexed over a [`Connection`].
#[async_trait]
pub trait Session: Send + 'static {
    /// Sending link type.
    type Sender: Sender;
    /// Receiving link type.
    type Receiver: Receiver;

    /// Attach a sending link targeting `target`.
    async fn new_sender(
        &mut self,
        target: &str,
        settle: SettleMode,
    ) -> Result<Self::Sender, TransportError>;

    /// Attach a receiving link on `source`.
    ///
    /// When `dynamic` is set the peer assigns the listening address, which
    /// is then available from [`Receiver::address`].
    async fn new_receiver(
        &mut self,
        source: &str,
        dynamic: bool,
    ) -> Result<Self::Receiver, TransportError>;

    /// End the session.
    async fn close(self) -> Result<(), TransportError>;
}

/// A link transmitting messages to a fixed address.
#[async_trait]
pub trait Sender: Send + 'static {
    /// Transmit `message`.
    async fn send(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Detach the link.
    async fn close(self) -> Result<(), TransportError>;
}

/// A link delivering inbound messages.
///
/// Implementations must be cancellation-safe: dropping a pending
/// `receive()` future must not lose a message.
#[async_trait]
pub trait Receiver: Send + 'static {
    /// Address at which this link listens.
    fn address(&self) -> Option<&str>;

    /// Wait for the next inbound message.
    async fn receive(&mut self) -> Result<Message, TransportError>;

    /// Acknowledge consumption of `message`.
    async fn accept(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Detach the link.
    async fn close(self) -> Result<(), TransportError>;
}
