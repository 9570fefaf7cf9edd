#![cfg(any(test, feature = "test-helpers"))]
//! Test-only helpers for shared test utilities.

pub mod memory;

pub use memory::{MemoryBus, MemoryConnector, RemoteAgent, Released, memory_transport};
