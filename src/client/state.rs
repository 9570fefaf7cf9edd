//! Connectivity flag shared between the background task and callers.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Best-effort view of whether the worker currently holds a live connection.
///
/// Written only by the worker and supervisor; read by any caller.
#[derive(Debug, Default)]
pub(crate) struct Connectivity(AtomicBool);

impl Connectivity {
    pub(crate) fn set(&self, connected: bool) {
        let previous = self.0.swap(connected, Ordering::AcqRel);
        if previous != connected {
            debug!(connected, "connectivity changed");
            #[cfg(feature = "metrics")]
            crate::metrics::set_connected(connected);
        }
    }

    pub(crate) fn get(&self) -> bool { self.0.load(Ordering::Acquire) }
}
