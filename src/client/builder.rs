//! Builder for configuring a command client.

use std::time::Duration;

use super::{BackoffPolicy, ClientConfig, CommandClient, OrphanPolicy};
use crate::transport::{ConnectOptions, Connector, TcpConnector};

/// Builder for [`CommandClient`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use agentlink::{client::CommandClientBuilder, transport::ConnectOptions};
///
/// let client = CommandClientBuilder::new("amqp://127.0.0.1:5672", "$management")
///     .connect_options(ConnectOptions::default().credentials("admin", "secret"))
///     .poll_interval(Duration::from_millis(100))
///     .build();
/// assert!(!client.connected());
/// ```
#[derive(Clone, Debug)]
pub struct CommandClientBuilder {
    config: ClientConfig,
}

impl CommandClientBuilder {
    /// Start building a client that dials `addr` and sends commands to
    /// `command_address`.
    #[must_use]
    pub fn new(addr: impl Into<String>, command_address: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(addr.into(), command_address.into()),
        }
    }

    /// Source address requested for the dynamic reply link.
    #[must_use]
    pub fn response_address(mut self, address: impl Into<String>) -> Self {
        self.config.response_address = address.into();
        self
    }

    /// Connection options handed to the connector unchanged.
    #[must_use]
    pub fn connect_options(mut self, options: ConnectOptions) -> Self {
        self.config.connect_options = options;
        self
    }

    /// Bound on each receive poll of the reply link.
    ///
    /// Shorter intervals reap abandoned requests sooner.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Reconnect back-off tiers.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Capacity of the submission queue. Values below one are raised to one.
    ///
    /// With the default of one, a submission is handed to the worker before
    /// the next can be queued.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity.max(1);
        self
    }

    /// Treatment of requests left unanswered when a connection is torn down.
    #[must_use]
    pub fn orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.config.orphan_policy = policy;
        self
    }

    /// Build a client using the bundled TCP transport.
    #[must_use]
    pub fn build(self) -> CommandClient<TcpConnector> { self.build_with(TcpConnector) }

    /// Build a client using `connector`.
    #[must_use]
    pub fn build_with<C: Connector>(self, connector: C) -> CommandClient<C> {
        CommandClient::new(self.config, connector)
    }
}
