//! Command/response client for administrative traffic to remote agents.
//!
//! [`CommandClient`] keeps one long-lived connection to the bus, restarting
//! it after failures, and correlates each reply with the caller that issued
//! the matching command. The moving parts, leaf first:
//!
//! - [`BackoffPolicy`] maps a connection failure to a wait before retrying.
//! - The correlation table maps request tokens to waiting callers.
//! - The connection worker owns one connection attempt: it sends commands,
//!   polls for replies and delivers them.
//! - The supervisor reruns the worker after each failure until stopped.
//! - [`CommandClient`] is the facade business logic uses.

mod backoff;
mod builder;
mod config;
mod correlation;
mod error;
mod runtime;
mod state;
mod supervisor;
mod worker;

pub use backoff::{BackoffPolicy, FailureClass};
pub use builder::CommandClientBuilder;
pub use config::{ClientConfig, DEFAULT_POLL_INTERVAL, OrphanPolicy};
pub use error::CommandError;
pub use runtime::CommandClient;
