//! In-process bus peer answering commands over TCP.
//!
//! The agent accepts any number of connections. Each connection may attach
//! sending links (the client's command links) and dynamic receiving links
//! (reply links). A transfer on a command link is answered on the reply link
//! named by the command's `reply_to`, according to [`AgentMode`].

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
    io,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use agentlink::{
    message::Message,
    transport::frame::{Frame, Role},
};
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::watch,
    task::JoinHandle,
};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

type Wire = Framed<TcpStream, LengthDelimitedCodec>;

/// How the agent answers commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AgentMode {
    /// Reply to every command immediately with its body.
    #[default]
    Echo,
    /// Hold each odd command and answer pairs in reverse order.
    Reorder,
    /// Reply with a correlation id that matches no request.
    Mismatch,
    /// Consume commands without replying.
    Silent,
}

#[derive(Default)]
struct Stats {
    connections: usize,
    refused: usize,
    commands: usize,
    dispositions: usize,
    last_properties: BTreeMap<String, String>,
}

struct Shared {
    mode: AgentMode,
    credentials: Option<(String, String)>,
    rejected_targets: Vec<String>,
    stats: Mutex<Stats>,
}

impl Shared {
    fn stats<R>(&self, f: impl FnOnce(&mut Stats) -> R) -> R {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Configures an [`EchoAgent`] before it starts listening.
#[derive(Debug, Default)]
pub struct EchoAgentBuilder {
    mode: AgentMode,
    credentials: Option<(String, String)>,
    rejected_targets: Vec<String>,
}

impl EchoAgentBuilder {
    /// Select the reply behaviour.
    #[must_use]
    pub fn mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Refuse connections not presenting exactly these credentials.
    #[must_use]
    pub fn require_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Detach any command link attached to `target`.
    #[must_use]
    pub fn reject_target(mut self, target: impl Into<String>) -> Self {
        self.rejected_targets.push(target.into());
        self
    }

    /// Bind a loopback listener and start accepting connections.
    ///
    /// # Errors
    ///
    /// Returns any error raised while binding the listener.
    pub async fn spawn(self) -> io::Result<EchoAgent> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            mode: self.mode,
            credentials: self.credentials,
            rejected_targets: self.rejected_targets,
            stats: Mutex::default(),
        });
        let (kick, kicked) = watch::channel(0u64);
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&shared), kicked));
        Ok(EchoAgent {
            addr,
            shared,
            kick,
            task,
        })
    }
}

/// A running echo agent. Dropping it stops the listener and closes every
/// open connection.
pub struct EchoAgent {
    addr: SocketAddr,
    shared: Arc<Shared>,
    kick: watch::Sender<u64>,
    task: JoinHandle<()>,
}

impl EchoAgent {
    /// Start configuring an agent.
    #[must_use]
    pub fn builder() -> EchoAgentBuilder { EchoAgentBuilder::default() }

    /// Start an agent with `mode` and no credential check.
    ///
    /// # Errors
    ///
    /// Returns any error raised while binding the listener.
    pub async fn spawn(mode: AgentMode) -> io::Result<Self> {
        Self::builder().mode(mode).spawn().await
    }

    /// Socket address the agent listens on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr { self.addr }

    /// Bus URI for the agent.
    #[must_use]
    pub fn url(&self) -> String { format!("amqp://{}", self.addr) }

    /// Connections opened successfully.
    #[must_use]
    pub fn connections(&self) -> usize { self.shared.stats(|s| s.connections) }

    /// Connections refused for bad credentials.
    #[must_use]
    pub fn refused(&self) -> usize { self.shared.stats(|s| s.refused) }

    /// Commands received across all connections.
    #[must_use]
    pub fn commands(&self) -> usize { self.shared.stats(|s| s.commands) }

    /// Replies acknowledged by clients.
    #[must_use]
    pub fn dispositions(&self) -> usize { self.shared.stats(|s| s.dispositions) }

    /// Properties announced by the most recent successful open.
    #[must_use]
    pub fn last_properties(&self) -> BTreeMap<String, String> {
        self.shared.stats(|s| s.last_properties.clone())
    }

    /// Close every open connection with an error, leaving the listener up.
    pub fn drop_connections(&self) { self.kick.send_modify(|generation| *generation += 1); }
}

impl Drop for EchoAgent {
    fn drop(&mut self) { self.task.abort(); }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, kicked: watch::Receiver<u64>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let shared = Arc::clone(&shared);
                let mut kicked = kicked.clone();
                kicked.mark_unchanged();
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, &shared, kicked).await {
                        debug!("echo agent connection failed: peer={peer}, error={e}");
                    }
                });
            }
            Err(e) => {
                warn!("echo agent accept failed: error={e}");
                return;
            }
        }
    }
}

fn invalid(err: impl Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

async fn write(wire: &mut Wire, frame: &Frame) -> io::Result<()> {
    let bytes = frame.encode().map_err(invalid)?;
    wire.send(bytes).await
}

/// Links attached on one connection.
#[derive(Default)]
struct Links {
    commands: HashMap<(u16, u32), String>,
    replies: HashMap<String, (u16, u32)>,
    next_delivery: u64,
    held: Option<Message>,
}

async fn serve(
    stream: TcpStream,
    shared: &Shared,
    mut kicked: watch::Receiver<u64>,
) -> io::Result<()> {
    let mut wire = Framed::new(stream, LengthDelimitedCodec::new());
    if !handshake(&mut wire, shared).await? {
        return Ok(());
    }

    let mut links = Links::default();
    loop {
        let bytes = select! {
            biased;

            changed = kicked.changed() => {
                if changed.is_ok() {
                    write(&mut wire, &Frame::Close {
                        error: Some("connection dropped by agent".to_owned()),
                    })
                    .await?;
                }
                return Ok(());
            }
            next = wire.next() => match next {
                Some(bytes) => bytes?,
                None => return Ok(()),
            },
        };

        match Frame::decode(&bytes).map_err(invalid)? {
            Frame::Attach {
                channel,
                handle,
                role: Role::Sender,
                address,
                ..
            } => {
                let target = address.unwrap_or_default();
                if shared.rejected_targets.contains(&target) {
                    write(
                        &mut wire,
                        &Frame::Detach {
                            channel,
                            handle,
                            error: Some(format!("no such node: {target}")),
                        },
                    )
                    .await?;
                    continue;
                }
                debug!(
                    "command link attached: channel={channel}, handle={handle}, target={target}"
                );
                links.commands.insert((channel, handle), target);
            }
            Frame::Attach {
                channel,
                handle,
                role: Role::Receiver,
                address,
                dynamic,
                ..
            } => {
                let address = if dynamic {
                    format!("echo-reply/{channel}/{handle}")
                } else {
                    address.unwrap_or_default()
                };
                links.replies.insert(address.clone(), (channel, handle));
                write(
                    &mut wire,
                    &Frame::Attached {
                        channel,
                        handle,
                        address,
                    },
                )
                .await?;
            }
            Frame::Transfer {
                channel,
                handle,
                message,
                ..
            } if links.commands.contains_key(&(channel, handle)) => {
                shared.stats(|s| s.commands += 1);
                for reply in answer(shared.mode, &mut links.held, &message) {
                    route(&mut wire, &mut links, reply).await?;
                }
            }
            Frame::Disposition { .. } => shared.stats(|s| s.dispositions += 1),
            Frame::Close { .. } => return Ok(()),
            other => debug!("echo agent ignoring frame: kind={}", other.name()),
        }
    }
}

/// Read the open frame and accept or refuse it. Returns whether the
/// connection proceeds.
async fn handshake(wire: &mut Wire, shared: &Shared) -> io::Result<bool> {
    let Some(bytes) = wire.next().await else {
        return Ok(false);
    };
    let Frame::Open {
        username,
        password,
        properties,
        ..
    } = Frame::decode(&bytes?).map_err(invalid)?
    else {
        return Err(invalid("expected open frame"));
    };

    if let Some((user, pass)) = &shared.credentials {
        if username.as_deref() != Some(user.as_str()) || password.as_deref() != Some(pass.as_str())
        {
            shared.stats(|s| s.refused += 1);
            write(
                wire,
                &Frame::Refused {
                    reason: "invalid credentials".to_owned(),
                },
            )
            .await?;
            return Ok(false);
        }
    }

    shared.stats(|s| {
        s.connections += 1;
        s.last_properties = properties;
    });
    write(
        wire,
        &Frame::Opened {
            container_id: "echo-agent".to_owned(),
        },
    )
    .await?;
    Ok(true)
}

/// Build the replies released by `command` under `mode`.
fn answer(mode: AgentMode, held: &mut Option<Message>, command: &Message) -> Vec<Message> {
    let mut reply = Message::new(command.body.clone());
    reply.properties.subject = command.properties.subject.clone();
    reply.properties.to = command.properties.reply_to.clone();
    reply.properties.correlation_id = command.properties.message_id.clone();

    match mode {
        AgentMode::Echo => vec![reply],
        AgentMode::Silent => Vec::new(),
        AgentMode::Mismatch => {
            reply.properties.correlation_id = reply
                .properties
                .correlation_id
                .map(|id| format!("{id}-mismatch"));
            vec![reply]
        }
        AgentMode::Reorder => match held.take() {
            Some(first) => vec![reply, first],
            None => {
                *held = Some(reply);
                Vec::new()
            }
        },
    }
}

async fn route(wire: &mut Wire, links: &mut Links, reply: Message) -> io::Result<()> {
    let Some(&(channel, handle)) = reply
        .properties
        .to
        .as_deref()
        .and_then(|to| links.replies.get(to))
    else {
        warn!("no reply link for command: reply_to={:?}", reply.properties.to);
        return Ok(());
    };
    let delivery_id = links.next_delivery;
    links.next_delivery += 1;
    write(
        wire,
        &Frame::Transfer {
            channel,
            handle,
            delivery_id,
            message: reply,
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{AgentMode, answer};
    use agentlink::message::Message;

    fn command(id: &str) -> Message {
        let mut message = Message::new(id);
        message.stamp(id, "reply");
        message
    }

    #[rstest]
    #[case(AgentMode::Echo, Some("a"))]
    #[case(AgentMode::Mismatch, Some("a-mismatch"))]
    fn single_reply_modes(#[case] mode: AgentMode, #[case] expected: Option<&str>) {
        let mut held = None;
        let replies = answer(mode, &mut held, &command("a"));
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].correlation_id(), expected);
        assert_eq!(replies[0].properties.to.as_deref(), Some("reply"));
    }

    #[test]
    fn silent_mode_never_replies() {
        let mut held = None;
        assert!(answer(AgentMode::Silent, &mut held, &command("a")).is_empty());
        assert!(held.is_none());
    }

    #[test]
    fn reorder_mode_answers_pairs_backwards() {
        let mut held = None;
        assert!(answer(AgentMode::Reorder, &mut held, &command("a")).is_empty());
        let replies = answer(AgentMode::Reorder, &mut held, &command("b"));
        let ids: Vec<_> = replies.iter().map(Message::correlation_id).collect();
        assert_eq!(ids, vec![Some("b"), Some("a")]);
        assert!(held.is_none());
    }
}
