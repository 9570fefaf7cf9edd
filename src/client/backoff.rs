//! Reconnect back-off for the command client supervisor.

use std::time::Duration;

use crate::transport::TransportError;

/// Broad class of a connection-level failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// DNS, TCP or socket-level failure.
    Network,
    /// Protocol negotiation, authentication, link setup and the rest.
    Other,
}

impl FailureClass {
    /// Classify `err`.
    #[must_use]
    pub fn of(err: &TransportError) -> Self {
        if err.is_network() {
            Self::Network
        } else {
            Self::Other
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Other => "other",
        }
    }
}

/// Fixed two-tier delays applied before reconnecting.
///
/// There is no growth, jitter or cap: the supervisor waits the tier's delay
/// after every failed attempt and retries until stopped.
///
/// # Default Values
/// - `network_delay`: 30 seconds
/// - `other_delay`: 5 seconds
///
/// # Examples
///
/// ```
/// use std::{io, time::Duration};
///
/// use agentlink::{client::BackoffPolicy, transport::TransportError};
///
/// let policy = BackoffPolicy::default();
/// let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
/// assert_eq!(policy.delay_for(&TransportError::Io(refused)), Duration::from_secs(30));
/// assert_eq!(policy.delay_for(&TransportError::Closed), Duration::from_secs(5));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after a network-transport failure.
    pub network_delay: Duration,
    /// Delay after any other failure.
    pub other_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            network_delay: Duration::from_secs(30),
            other_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait before retrying after `err`.
    #[must_use]
    pub fn delay_for(&self, err: &TransportError) -> Duration {
        self.delay_for_class(FailureClass::of(err))
    }

    /// Delay to wait before retrying after a failure of `class`.
    #[must_use]
    pub fn delay_for_class(&self, class: FailureClass) -> Duration {
        match class {
            FailureClass::Network => self.network_delay,
            FailureClass::Other => self.other_delay,
        }
    }
}
