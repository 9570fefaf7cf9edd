//! Scripted in-memory transport.
//!
//! [`MemoryConnector`] implements the transport traits over channels. Each
//! successful dial hands the test a [`RemoteAgent`] through [`MemoryBus`],
//! from which it reads the commands the client sent and injects replies or
//! receive failures. Dial and send failures are scripted up front.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    message::Message,
    transport::{
        ConnectOptions,
        Connection,
        Connector,
        Receiver,
        Sender,
        Session,
        SettleMode,
        TransportError,
    },
};

/// Resource released by the client, recorded in close order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Released {
    /// The reply link.
    Receiver,
    /// The command link.
    Sender,
    /// The session.
    Session,
    /// The connection.
    Connection,
}

#[derive(Default)]
struct Script {
    dial_failures: VecDeque<TransportError>,
    send_failures: VecDeque<TransportError>,
    dials: usize,
    connections: usize,
    accepted: usize,
    released: Vec<Released>,
    last_options: Option<ConnectOptions>,
    last_target: Option<(String, SettleMode)>,
}

type Shared = Arc<Mutex<Script>>;

fn with_script<R>(script: &Shared, f: impl FnOnce(&mut Script) -> R) -> R {
    f(&mut script.lock().unwrap_or_else(PoisonError::into_inner))
}

/// Connector handing out in-memory connections.
#[derive(Clone)]
pub struct MemoryConnector {
    script: Shared,
    agents: mpsc::UnboundedSender<RemoteAgent>,
}

/// Test-side handle observing a [`MemoryConnector`].
pub struct MemoryBus {
    script: Shared,
    agents: mpsc::UnboundedReceiver<RemoteAgent>,
}

/// Create a connector and the handle used to drive it.
#[must_use]
pub fn memory_transport() -> (MemoryConnector, MemoryBus) {
    let script = Shared::default();
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryConnector {
            script: Arc::clone(&script),
            agents: tx,
        },
        MemoryBus { script, agents: rx },
    )
}

impl MemoryBus {
    /// Fail the next dial with `err`. Failures are consumed in order.
    pub fn fail_dial(&self, err: TransportError) {
        with_script(&self.script, |s| s.dial_failures.push_back(err));
    }

    /// Fail the next send with `err`. Failures are consumed in order.
    pub fn fail_send(&self, err: TransportError) {
        with_script(&self.script, |s| s.send_failures.push_back(err));
    }

    /// Number of dial attempts, successful or not.
    #[must_use]
    pub fn dials(&self) -> usize { with_script(&self.script, |s| s.dials) }

    /// Number of replies acknowledged by the client.
    #[must_use]
    pub fn accepted(&self) -> usize { with_script(&self.script, |s| s.accepted) }

    /// Resources released so far, in order.
    #[must_use]
    pub fn released(&self) -> Vec<Released> { with_script(&self.script, |s| s.released.clone()) }

    /// Options passed to the most recent dial.
    #[must_use]
    pub fn last_options(&self) -> Option<ConnectOptions> {
        with_script(&self.script, |s| s.last_options.clone())
    }

    /// Target address and settlement mode of the most recent command link.
    #[must_use]
    pub fn last_target(&self) -> Option<(String, SettleMode)> {
        with_script(&self.script, |s| s.last_target.clone())
    }

    /// Wait for the client to establish its next connection.
    pub async fn next_agent(&mut self) -> Option<RemoteAgent> { self.agents.recv().await }
}

/// The remote end of one in-memory connection.
pub struct RemoteAgent {
    commands: mpsc::UnboundedReceiver<Message>,
    inbound: mpsc::UnboundedSender<Result<Message, TransportError>>,
    reply_address: String,
}

impl RemoteAgent {
    /// Address the client's reply link listens on.
    #[must_use]
    pub fn reply_address(&self) -> &str { &self.reply_address }

    /// Wait for the next command sent by the client.
    pub async fn next_command(&mut self) -> Option<Message> { self.commands.recv().await }

    /// Reply to `command`, echoing its message id as the correlation id.
    pub fn reply(&self, command: &Message, body: impl Into<Vec<u8>>) {
        let mut reply = Message::new(body);
        reply.properties.correlation_id = command.properties.message_id.clone();
        reply.properties.to = command.properties.reply_to.clone();
        self.deliver(reply);
    }

    /// Deliver `message` on the reply link as-is.
    pub fn deliver(&self, message: Message) { let _ = self.inbound.send(Ok(message)); }

    /// Make the client's next receive fail with `err`.
    pub fn fail_receive(&self, err: TransportError) { let _ = self.inbound.send(Err(err)); }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn dial(
        &self,
        _addr: &str,
        options: &ConnectOptions,
    ) -> Result<MemoryConnection, TransportError> {
        let index = with_script(&self.script, |s| {
            s.dials += 1;
            s.last_options = Some(options.clone());
            match s.dial_failures.pop_front() {
                Some(err) => Err(err),
                None => {
                    s.connections += 1;
                    Ok(s.connections)
                }
            }
        })?;
        Ok(MemoryConnection {
            script: Arc::clone(&self.script),
            agents: self.agents.clone(),
            index,
        })
    }
}

/// In-memory connection.
pub struct MemoryConnection {
    script: Shared,
    agents: mpsc::UnboundedSender<RemoteAgent>,
    index: usize,
}

#[async_trait]
impl Connection for MemoryConnection {
    type Session = MemorySession;

    async fn new_session(&mut self) -> Result<MemorySession, TransportError> {
        Ok(MemorySession {
            script: Arc::clone(&self.script),
            agents: self.agents.clone(),
            index: self.index,
            commands: None,
        })
    }

    async fn close(self) -> Result<(), TransportError> {
        with_script(&self.script, |s| s.released.push(Released::Connection));
        Ok(())
    }
}

/// In-memory session.
pub struct MemorySession {
    script: Shared,
    agents: mpsc::UnboundedSender<RemoteAgent>,
    index: usize,
    commands: Option<mpsc::UnboundedReceiver<Message>>,
}

#[async_trait]
impl Session for MemorySession {
    type Sender = MemorySender;
    type Receiver = MemoryReceiver;

    async fn new_sender(
        &mut self,
        target: &str,
        settle: SettleMode,
    ) -> Result<MemorySender, TransportError> {
        with_script(&self.script, |s| {
            s.last_target = Some((target.to_owned(), settle));
        });
        let (tx, rx) = mpsc::unbounded_channel();
        self.commands = Some(rx);
        Ok(MemorySender {
            script: Arc::clone(&self.script),
            commands: tx,
        })
    }

    async fn new_receiver(
        &mut self,
        _source: &str,
        dynamic: bool,
    ) -> Result<MemoryReceiver, TransportError> {
        if !dynamic {
            return Err(TransportError::Protocol(
                "memory transport only supports dynamic reply links".to_owned(),
            ));
        }
        let commands = self.commands.take().ok_or_else(|| {
            TransportError::Protocol("attach the command link first".to_owned())
        })?;
        let (tx, rx) = mpsc::unbounded_channel();
        let address = format!("reply-{}", self.index);
        let agent = RemoteAgent {
            commands,
            inbound: tx,
            reply_address: address.clone(),
        };
        self.agents
            .send(agent)
            .map_err(|_| TransportError::Closed)?;
        Ok(MemoryReceiver {
            script: Arc::clone(&self.script),
            inbound: rx,
            address,
        })
    }

    async fn close(self) -> Result<(), TransportError> {
        with_script(&self.script, |s| s.released.push(Released::Session));
        Ok(())
    }
}

/// In-memory command link.
pub struct MemorySender {
    script: Shared,
    commands: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl Sender for MemorySender {
    async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        if let Some(err) = with_script(&self.script, |s| s.send_failures.pop_front()) {
            return Err(err);
        }
        self.commands
            .send(message.clone())
            .map_err(|_| TransportError::Closed)
    }

    async fn close(self) -> Result<(), TransportError> {
        with_script(&self.script, |s| s.released.push(Released::Sender));
        Ok(())
    }
}

/// In-memory reply link.
pub struct MemoryReceiver {
    script: Shared,
    inbound: mpsc::UnboundedReceiver<Result<Message, TransportError>>,
    address: String,
}

#[async_trait]
impl Receiver for MemoryReceiver {
    fn address(&self) -> Option<&str> { Some(&self.address) }

    async fn receive(&mut self) -> Result<Message, TransportError> {
        self.inbound.recv().await.unwrap_or(Err(TransportError::Closed))
    }

    async fn accept(&mut self, _message: &Message) -> Result<(), TransportError> {
        with_script(&self.script, |s| s.accepted += 1);
        Ok(())
    }

    async fn close(self) -> Result<(), TransportError> {
        with_script(&self.script, |s| s.released.push(Released::Receiver));
        Ok(())
    }
}
