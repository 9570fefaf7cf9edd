//! Restart loop wrapping the connection worker.

use std::sync::Arc;

use tokio::{select, sync::mpsc, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{
    ClientConfig,
    CommandError,
    OrphanPolicy,
    backoff::FailureClass,
    correlation::{CorrelationTable, PendingRequest},
    state::Connectivity,
    worker::{ConnectionWorker, Exit},
};
use crate::transport::Connector;

/// Background task owning the submission queue for the client's lifetime.
pub(super) struct Supervisor<C: Connector> {
    pub(super) connector: Arc<C>,
    pub(super) config: Arc<ClientConfig>,
    pub(super) connectivity: Arc<Connectivity>,
    pub(super) shutdown: CancellationToken,
    pub(super) requests: mpsc::Receiver<PendingRequest>,
}

impl<C: Connector> Supervisor<C> {
    /// Run connection workers until shutdown, waiting out the back-off after
    /// each failure.
    pub(super) async fn run(mut self) {
        let mut orphans = CorrelationTable::new();
        loop {
            let teardown = ConnectionWorker {
                connector: self.connector.as_ref(),
                config: &self.config,
                connectivity: &self.connectivity,
                shutdown: &self.shutdown,
                requests: &mut self.requests,
            }
            .run()
            .await;
            self.settle_orphans(teardown.unanswered, &mut orphans);

            let err = match teardown.exit {
                Exit::Stopped => break,
                Exit::Failed(err) => err,
            };
            self.connectivity.set(false);
            let class = FailureClass::of(&err);
            let backoff = self.config.backoff.delay_for_class(class);
            warn!(
                addr = %self.config.addr,
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                class = class.as_str(),
                error = %err,
                "command client restarting"
            );
            #[cfg(feature = "metrics")]
            crate::metrics::inc_reconnects(class);

            select! {
                biased;

                () = self.shutdown.cancelled() => break,
                () = sleep(backoff) => {}
            }
        }
        self.finish(orphans);
    }

    fn settle_orphans(&self, unanswered: CorrelationTable, orphans: &mut CorrelationTable) {
        match self.config.orphan_policy {
            OrphanPolicy::Retain => {
                orphans.reap_abandoned();
                orphans.absorb(unanswered);
            }
            OrphanPolicy::Fail => unanswered.fail_all(|| CommandError::ConnectionLost),
        }
    }

    /// Close the submission path and release everything still waiting.
    fn finish(mut self, orphans: CorrelationTable) {
        self.connectivity.set(false);
        self.requests.close();
        let mut discarded = 0usize;
        while let Ok(request) = self.requests.try_recv() {
            request.complete(Err(CommandError::Stopped));
            discarded += 1;
        }
        if !orphans.is_empty() || discarded > 0 {
            info!(
                unanswered = orphans.len(),
                discarded, "releasing requests on shutdown"
            );
        }
        orphans.fail_all(|| CommandError::Stopped);
        info!(addr = %self.config.addr, "command client stopped");
    }
}
