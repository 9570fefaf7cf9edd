//! Configuration consumed by the command client runtime.

use std::time::Duration;

use super::BackoffPolicy;
use crate::transport::ConnectOptions;

/// Default bound on a single receive poll of the reply link.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What happens to requests still awaiting a reply when their connection is
/// torn down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Keep the requests unanswered. Callers recover through their own
    /// deadline, or wait until the client stops if they used
    /// [`request`](super::CommandClient::request).
    #[default]
    Retain,
    /// Fail each request with [`CommandError::ConnectionLost`](super::CommandError::ConnectionLost).
    Fail,
}

/// Settings shared by the supervisor and every connection worker it runs.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub(crate) addr: String,
    pub(crate) command_address: String,
    pub(crate) response_address: String,
    pub(crate) connect_options: ConnectOptions,
    pub(crate) poll_interval: Duration,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) queue_capacity: usize,
    pub(crate) orphan_policy: OrphanPolicy,
}

impl ClientConfig {
    pub(crate) fn new(addr: String, command_address: String) -> Self {
        Self {
            addr,
            command_address,
            response_address: String::new(),
            connect_options: ConnectOptions::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: BackoffPolicy::default(),
            queue_capacity: 1,
            orphan_policy: OrphanPolicy::default(),
        }
    }

    /// Bus address the client dials.
    #[must_use]
    pub fn addr(&self) -> &str { &self.addr }

    /// Fixed address commands are sent to.
    #[must_use]
    pub fn command_address(&self) -> &str { &self.command_address }

    /// Source address requested for the dynamic reply link.
    #[must_use]
    pub fn response_address(&self) -> &str { &self.response_address }

    /// Options passed to the connector on every dial.
    #[must_use]
    pub fn connect_options(&self) -> &ConnectOptions { &self.connect_options }

    /// Bound on a single receive poll.
    #[must_use]
    pub fn poll_interval(&self) -> Duration { self.poll_interval }

    /// Reconnect back-off.
    #[must_use]
    pub fn backoff(&self) -> BackoffPolicy { self.backoff }

    /// Capacity of the submission queue.
    #[must_use]
    pub fn queue_capacity(&self) -> usize { self.queue_capacity }

    /// Treatment of unanswered requests at teardown.
    #[must_use]
    pub fn orphan_policy(&self) -> OrphanPolicy { self.orphan_policy }
}
