//! Command client facade.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, info_span, warn};

use super::{
    ClientConfig,
    CommandClientBuilder,
    CommandError,
    correlation::{CommandResult, PendingRequest},
    state::Connectivity,
    supervisor::Supervisor,
};
use crate::{message::Message, transport::Connector};

/// Self-healing request/response client for administrative commands.
///
/// A single background task owns the connection. Callers hand it commands
/// through a bounded queue and wait on a private one-shot slot for the
/// correlated reply. Connection failures are retried with a fixed back-off
/// and are never returned to callers; [`connected`](Self::connected) is the
/// only signal of ongoing trouble.
///
/// # Caller responsibilities
///
/// * Call [`start`](Self::start) once, from within a tokio runtime.
/// * [`request`](Self::request) has no deadline and can wait across any
///   number of reconnects. Use [`request_with_timeout`](Self::request_with_timeout)
///   when bounded latency matters.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use agentlink::{CommandClient, Message};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), agentlink::CommandError> {
/// let client = CommandClient::builder("amqp://127.0.0.1:5672", "$management").build();
/// client.start();
/// let reply = client
///     .request_with_timeout(Message::new("{}").with_subject("listQueues"), Duration::from_secs(5))
///     .await?;
/// println!("{} bytes", reply.body.len());
/// client.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct CommandClient<C: Connector> {
    config: Arc<ClientConfig>,
    connector: Arc<C>,
    connectivity: Arc<Connectivity>,
    requests: mpsc::Sender<PendingRequest>,
    queue: Mutex<Option<mpsc::Receiver<PendingRequest>>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl<C: Connector> fmt::Debug for CommandClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandClient")
            .field("addr", &self.config.addr)
            .field("command_address", &self.config.command_address)
            .field("connected", &self.connected())
            .finish_non_exhaustive()
    }
}

impl CommandClient<crate::transport::TcpConnector> {
    /// Start building a client that dials `addr` and sends commands to
    /// `command_address`.
    #[must_use]
    pub fn builder(
        addr: impl Into<String>,
        command_address: impl Into<String>,
    ) -> CommandClientBuilder {
        CommandClientBuilder::new(addr, command_address)
    }
}

impl<C: Connector> CommandClient<C> {
    pub(crate) fn new(config: ClientConfig, connector: C) -> Self {
        let (requests, queue) = mpsc::channel(config.queue_capacity);
        Self {
            config: Arc::new(config),
            connector: Arc::new(connector),
            connectivity: Arc::new(Connectivity::default()),
            requests,
            queue: Mutex::new(Some(queue)),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Settings this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig { &self.config }

    /// Spawn the background supervisor and return immediately.
    ///
    /// Must be called from within a tokio runtime. Calls after the first, or
    /// after [`stop`](Self::stop), are ignored.
    pub fn start(&self) {
        let Some(requests) = self.take_queue() else {
            warn!(addr = %self.config.addr, "command client already started or stopped");
            return;
        };
        let supervisor = Supervisor {
            connector: Arc::clone(&self.connector),
            config: Arc::clone(&self.config),
            connectivity: Arc::clone(&self.connectivity),
            shutdown: self.shutdown.clone(),
            requests,
        };
        let span = info_span!("command_client", addr = %self.config.addr);
        self.tracker.spawn(supervisor.run().instrument(span));
    }

    /// Stop the background task and wait until it has released the
    /// connection.
    ///
    /// Queued submissions and requests still awaiting a reply fail with
    /// [`CommandError::Stopped`], as does any later submission.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        drop(self.take_queue());
        self.tracker.close();
        self.tracker.wait().await;
        self.connectivity.set(false);
    }

    /// Whether the background task currently holds a live connection.
    ///
    /// Best-effort: `true` does not guarantee the next request succeeds.
    #[must_use]
    pub fn connected(&self) -> bool { self.connectivity.get() }

    /// Send `message` and wait for its reply without a deadline.
    ///
    /// The identity fields of `message` (message id, correlation id,
    /// reply-to) are overwritten. The call first waits for the worker to
    /// accept the submission, then for the reply. It can wait indefinitely if
    /// no reply ever arrives.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Send`] if the command could not be transmitted
    /// and [`CommandError::Stopped`] if the client stops first.
    pub async fn request(&self, message: Message) -> Result<Message, CommandError> {
        let response = self.submit(message).await?;
        response.await.unwrap_or(Err(CommandError::Stopped))
    }

    /// Send `message` and wait at most `deadline` for its reply.
    ///
    /// The deadline covers both the submission handoff and the reply. On
    /// expiry the command is not cancelled; a late reply is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Timeout`] when the deadline passes, otherwise
    /// as for [`request`](Self::request).
    pub async fn request_with_timeout(
        &self,
        message: Message,
        deadline: Duration,
    ) -> Result<Message, CommandError> {
        timeout(deadline, self.request(message))
            .await
            .unwrap_or(Err(CommandError::Timeout(deadline)))
    }

    async fn submit(
        &self,
        message: Message,
    ) -> Result<oneshot::Receiver<CommandResult>, CommandError> {
        if self.shutdown.is_cancelled() {
            return Err(CommandError::Stopped);
        }
        let (request, response) = PendingRequest::new(message);
        self.requests
            .send(request)
            .await
            .map_err(|_| CommandError::Stopped)?;
        Ok(response)
    }

    fn take_queue(&self) -> Option<mpsc::Receiver<PendingRequest>> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<C: Connector> Drop for CommandClient<C> {
    fn drop(&mut self) { self.shutdown.cancel(); }
}
