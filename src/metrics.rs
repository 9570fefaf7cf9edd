//! Metric helpers for `agentlink`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate.

use metrics::{counter, gauge};

use crate::client::FailureClass;

/// Name of the gauge reporting whether the command client is connected.
pub const CONNECTED: &str = "agentlink_connected";
/// Name of the counter tracking dispatched commands.
pub const COMMANDS_TOTAL: &str = "agentlink_commands_total";
/// Name of the counter tracking received replies.
pub const REPLIES_TOTAL: &str = "agentlink_replies_total";
/// Name of the counter tracking connection restarts.
pub const RECONNECTS_TOTAL: &str = "agentlink_reconnects_total";

/// Result of dispatching a command.
#[derive(Clone, Copy)]
pub enum CommandOutcome {
    /// The command was transmitted and awaits its reply.
    Sent,
    /// Transmission failed and the caller was notified.
    SendFailed,
}

impl CommandOutcome {
    fn as_str(self) -> &'static str {
        match self {
            CommandOutcome::Sent => "sent",
            CommandOutcome::SendFailed => "send_failed",
        }
    }
}

/// Result of correlating a reply.
#[derive(Clone, Copy)]
pub enum ReplyOutcome {
    /// The reply matched a waiting request.
    Matched,
    /// The reply carried an unknown or missing token and was dropped.
    Unmatched,
}

impl ReplyOutcome {
    fn as_str(self) -> &'static str {
        match self {
            ReplyOutcome::Matched => "matched",
            ReplyOutcome::Unmatched => "unmatched",
        }
    }
}

/// Record the connectivity flag.
pub fn set_connected(connected: bool) {
    gauge!(CONNECTED).set(if connected { 1.0 } else { 0.0 });
}

/// Record a dispatched command.
pub fn inc_commands(outcome: CommandOutcome) {
    counter!(COMMANDS_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

/// Record a received reply.
pub fn inc_replies(outcome: ReplyOutcome) {
    counter!(REPLIES_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

/// Record a connection restart after a failure of `class`.
pub fn inc_reconnects(class: FailureClass) {
    counter!(RECONNECTS_TOTAL, "class" => class.as_str()).increment(1);
}
