//! Outstanding requests and the table correlating them with replies.
//!
//! The table is owned by the connection worker and touched only from its
//! control flow, so it is a plain map with no synchronization.

use std::collections::HashMap;

use tokio::sync::oneshot;

use super::CommandError;
use crate::message::Message;

/// Result delivered to the caller waiting on a request.
pub(crate) type CommandResult = Result<Message, CommandError>;

/// A command awaiting its reply.
///
/// The response slot is a one-shot channel: completing the request consumes
/// it, so a result can be written at most once.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) message: Message,
    slot: oneshot::Sender<CommandResult>,
}

impl PendingRequest {
    /// Create a request for `message` and the receiver its caller waits on.
    pub(crate) fn new(message: Message) -> (Self, oneshot::Receiver<CommandResult>) {
        let (slot, response) = oneshot::channel();
        (Self { message, slot }, response)
    }

    /// Deliver `result` to the caller.
    ///
    /// Returns `false` if the caller stopped waiting; the result is dropped.
    pub(crate) fn complete(self, result: CommandResult) -> bool { self.slot.send(result).is_ok() }

    /// Returns true once the caller has stopped waiting for the result.
    pub(crate) fn is_abandoned(&self) -> bool { self.slot.is_closed() }
}

/// Map from correlation token to the request it identifies.
///
/// Every token present corresponds to a command sent but not yet answered.
#[derive(Debug, Default)]
pub(crate) struct CorrelationTable {
    entries: HashMap<String, PendingRequest>,
}

impl CorrelationTable {
    pub(crate) fn new() -> Self { Self::default() }

    /// Register `request` under `token`.
    pub(crate) fn insert(&mut self, token: String, request: PendingRequest) {
        let previous = self.entries.insert(token, request);
        debug_assert!(previous.is_none(), "correlation tokens must be unique");
    }

    /// Remove and return the request registered under `token`.
    pub(crate) fn take(&mut self, token: &str) -> Option<PendingRequest> {
        self.entries.remove(token)
    }

    pub(crate) fn len(&self) -> usize { self.entries.len() }

    pub(crate) fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Drop entries whose caller has gone away, returning how many were removed.
    pub(crate) fn reap_abandoned(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, request| !request.is_abandoned());
        before - self.entries.len()
    }

    /// Move every entry of `other` into this table.
    pub(crate) fn absorb(&mut self, other: CorrelationTable) { self.entries.extend(other.entries); }

    /// Complete every entry with the error produced by `error`.
    pub(crate) fn fail_all(self, error: impl Fn() -> CommandError) {
        for (_, request) in self.entries {
            request.complete(Err(error()));
        }
    }
}
