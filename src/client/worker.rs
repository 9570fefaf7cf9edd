//! Connection worker: one run per connection attempt.
//!
//! The worker opens the connection, session and both links, then alternates
//! between dispatching submitted commands and polling the reply link. It is
//! the only code that touches the links or the [`CorrelationTable`], which is
//! why the table needs no lock. A `tokio::select!` loop with the `biased`
//! keyword gives submissions priority over the receive poll.

use std::future::Future;

use tokio::{select, sync::mpsc, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    ClientConfig,
    CommandError,
    correlation::{CorrelationTable, PendingRequest},
    state::Connectivity,
};
use crate::{
    message::Message,
    transport::{Connection, Connector, Receiver, Sender, Session, SettleMode, TransportError},
};

type SessionOf<C> = <<C as Connector>::Connection as Connection>::Session;
type SenderOf<C> = <SessionOf<C> as Session>::Sender;
type ReceiverOf<C> = <SessionOf<C> as Session>::Receiver;

/// Why a worker run ended.
#[derive(Debug)]
pub(super) enum Exit {
    /// Shutdown was requested.
    Stopped,
    /// The connection failed during setup or while polling for replies.
    Failed(TransportError),
}

/// Result of a worker run: why it ended and the requests it left unanswered.
#[derive(Debug)]
pub(super) struct Teardown {
    pub(super) exit: Exit,
    pub(super) unanswered: CorrelationTable,
}

impl Teardown {
    fn before_connect(exit: Exit) -> Self {
        Self {
            exit,
            unanswered: CorrelationTable::new(),
        }
    }
}

/// Events returned by [`ConnectionWorker::next_event`].
#[derive(Debug)]
enum Event {
    Shutdown,
    Submitted(Option<PendingRequest>),
    Inbound(Result<Message, TransportError>),
    /// The receive poll elapsed without a message.
    Idle,
}

/// Everything opened for one connection, released in reverse order.
struct Links<C: Connector> {
    connection: C::Connection,
    session: SessionOf<C>,
    sender: SenderOf<C>,
    receiver: ReceiverOf<C>,
    reply_to: String,
}

/// Borrowed context for a single connection attempt.
pub(super) struct ConnectionWorker<'a, C: Connector> {
    pub(super) connector: &'a C,
    pub(super) config: &'a ClientConfig,
    pub(super) connectivity: &'a Connectivity,
    pub(super) shutdown: &'a CancellationToken,
    pub(super) requests: &'a mut mpsc::Receiver<PendingRequest>,
}

impl<C: Connector> ConnectionWorker<'_, C> {
    /// Run one connection attempt to completion.
    pub(super) async fn run(mut self) -> Teardown {
        info!(addr = %self.config.addr, "command client connecting");
        let opened = select! {
            biased;

            () = self.shutdown.cancelled() => return Teardown::before_connect(Exit::Stopped),
            opened = open_links(self.connector, self.config) => opened,
        };
        let mut links = match opened {
            Ok(links) => links,
            Err(err) => return Teardown::before_connect(Exit::Failed(err)),
        };
        info!(
            addr = %self.config.addr,
            reply_to = %links.reply_to,
            "command client connected"
        );
        self.connectivity.set(true);

        let mut table = CorrelationTable::new();
        let exit = self.serve(&mut links, &mut table).await;

        self.connectivity.set(false);
        release_links(links).await;
        if !table.is_empty() {
            warn!(
                addr = %self.config.addr,
                unanswered = table.len(),
                "connection closed with requests awaiting replies"
            );
        }
        Teardown {
            exit,
            unanswered: table,
        }
    }

    async fn serve(
        &mut self,
        links: &mut Links<C>,
        table: &mut CorrelationTable,
    ) -> Exit {
        loop {
            match self.next_event(&mut links.receiver).await {
                Event::Shutdown | Event::Submitted(None) => return Exit::Stopped,
                Event::Submitted(Some(request)) => {
                    dispatch(&mut links.sender, &links.reply_to, table, request).await;
                }
                Event::Inbound(Ok(message)) => {
                    if let Err(err) = links.receiver.accept(&message).await {
                        return Exit::Failed(err);
                    }
                    correlate(table, message);
                }
                Event::Inbound(Err(err)) => return Exit::Failed(err),
                Event::Idle => {
                    let reaped = table.reap_abandoned();
                    if reaped > 0 {
                        debug!(reaped, "dropped requests abandoned by their callers");
                    }
                }
            }
        }
    }

    async fn next_event(&mut self, receiver: &mut ReceiverOf<C>) -> Event {
        select! {
            biased;

            () = self.shutdown.cancelled() => Event::Shutdown,
            request = self.requests.recv() => Event::Submitted(request),
            polled = timeout(self.config.poll_interval, receiver.receive()) => {
                polled.map_or(Event::Idle, Event::Inbound)
            }
        }
    }
}

/// Stamp, send and register a submitted command.
///
/// A send failure is reported to that caller alone; the connection stays up.
/// A request whose caller already gave up is dropped unsent.
async fn dispatch<S: Sender>(
    sender: &mut S,
    reply_to: &str,
    table: &mut CorrelationTable,
    mut request: PendingRequest,
) {
    if request.is_abandoned() {
        debug!("dropping command abandoned before dispatch");
        return;
    }
    let token = Uuid::new_v4().to_string();
    request.message.stamp(&token, reply_to);
    match sender.send(&request.message).await {
        Ok(()) => {
            debug!(token = %token, "command sent");
            #[cfg(feature = "metrics")]
            crate::metrics::inc_commands(crate::metrics::CommandOutcome::Sent);
            table.insert(token, request);
        }
        Err(err) => {
            warn!(token = %token, error = %err, "failed to send command");
            #[cfg(feature = "metrics")]
            crate::metrics::inc_commands(crate::metrics::CommandOutcome::SendFailed);
            request.complete(Err(CommandError::Send(err)));
        }
    }
}

/// Route a reply to the caller whose token it carries.
///
/// Replies with an unknown or missing token are logged and dropped.
fn correlate(table: &mut CorrelationTable, message: Message) {
    let Some(token) = message.correlation_id() else {
        warn!("reply without correlation id (ignored)");
        #[cfg(feature = "metrics")]
        crate::metrics::inc_replies(crate::metrics::ReplyOutcome::Unmatched);
        return;
    };
    let Some(request) = table.take(token) else {
        warn!(token = %token, "unable to find request for reply (ignored)");
        #[cfg(feature = "metrics")]
        crate::metrics::inc_replies(crate::metrics::ReplyOutcome::Unmatched);
        return;
    };
    #[cfg(feature = "metrics")]
    crate::metrics::inc_replies(crate::metrics::ReplyOutcome::Matched);
    if !request.complete(Ok(message)) {
        debug!("reply arrived after its caller stopped waiting");
    }
}

async fn open_links<C: Connector>(
    connector: &C,
    config: &ClientConfig,
) -> Result<Links<C>, TransportError> {
    let mut connection = connector
        .dial(&config.addr, &config.connect_options)
        .await?;

    let mut session = match connection.new_session().await {
        Ok(session) => session,
        Err(err) => {
            discard("connection", connection.close()).await;
            return Err(err);
        }
    };

    debug!(command_address = %config.command_address, "attaching command link");
    let sender = match session
        .new_sender(&config.command_address, SettleMode::Mixed)
        .await
    {
        Ok(sender) => sender,
        Err(err) => {
            discard("session", session.close()).await;
            discard("connection", connection.close()).await;
            return Err(err);
        }
    };

    let receiver = match session
        .new_receiver(&config.response_address, true)
        .await
    {
        Ok(receiver) => receiver,
        Err(err) => {
            discard("command link", sender.close()).await;
            discard("session", session.close()).await;
            discard("connection", connection.close()).await;
            return Err(err);
        }
    };

    let Some(reply_to) = receiver.address().map(str::to_owned) else {
        discard("reply link", receiver.close()).await;
        discard("command link", sender.close()).await;
        discard("session", session.close()).await;
        discard("connection", connection.close()).await;
        return Err(TransportError::Protocol(
            "reply link was not assigned an address".to_owned(),
        ));
    };

    Ok(Links {
        connection,
        session,
        sender,
        receiver,
        reply_to,
    })
}

async fn release_links<C: Connector>(links: Links<C>) {
    let Links {
        connection,
        session,
        sender,
        receiver,
        ..
    } = links;
    discard("reply link", receiver.close()).await;
    discard("command link", sender.close()).await;
    discard("session", session.close()).await;
    discard("connection", connection.close()).await;
}

async fn discard(resource: &str, close: impl Future<Output = Result<(), TransportError>>) {
    if let Err(err) = close.await {
        debug!(resource, error = %err, "error while closing");
    }
}
