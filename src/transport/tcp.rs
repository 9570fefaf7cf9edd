//! TCP implementation of the transport traits.
//!
//! One TCP stream carries one connection. The stream is split into a shared
//! write half, used by every session and link, and a read half consumed by
//! whichever endpoint is waiting for a frame. Only the connection handshake,
//! receiver attach and [`TcpReceiver::receive`] read from the stream, so a
//! connection supports a single inbound link. That reader also reports a peer
//! detach of the session's sending links.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    SinkExt,
    StreamExt,
    stream::{SplitSink, SplitStream},
};
use log::{debug, trace};
use tokio::{net::TcpStream, sync::Mutex, time::timeout};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use super::{
    ConnectOptions,
    Connection,
    Connector,
    Receiver,
    Sender,
    Session,
    SettleMode,
    TransportError,
    frame::{Frame, Role},
};
use crate::message::Message;

type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Strip an optional `scheme://` prefix and trailing path from a bus URI,
/// leaving the `host:port` authority.
///
/// # Examples
///
/// ```
/// use agentlink::transport::tcp::authority;
///
/// assert_eq!(authority("amqp://broker.local:5672"), "broker.local:5672");
/// assert_eq!(authority("127.0.0.1:5672/"), "127.0.0.1:5672");
/// ```
#[must_use]
pub fn authority(addr: &str) -> &str {
    let rest = addr.split_once("://").map_or(addr, |(_, rest)| rest);
    rest.split('/').next().unwrap_or(rest)
}

/// Shared handle on both halves of a framed TCP stream.
#[derive(Clone)]
struct Wire {
    sink: Arc<Mutex<SplitSink<FramedStream, Bytes>>>,
    stream: Arc<Mutex<SplitStream<FramedStream>>>,
}

impl Wire {
    fn new(framed: FramedStream) -> Self {
        let (sink, stream) = framed.split();
        Self {
            sink: Arc::new(Mutex::new(sink)),
            stream: Arc::new(Mutex::new(stream)),
        }
    }

    async fn write(&self, frame: &Frame) -> Result<(), TransportError> {
        trace!("writing frame: kind={}", frame.name());
        let bytes = frame.encode()?;
        self.sink.lock().await.send(bytes).await?;
        Ok(())
    }

    /// Read the next frame. Cancellation-safe.
    async fn read(&self) -> Result<Frame, TransportError> {
        let mut stream = self.stream.lock().await;
        match stream.next().await {
            Some(Ok(bytes)) => Frame::decode(&bytes),
            Some(Err(e)) => Err(e.into()),
            None => Err(TransportError::Closed),
        }
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.sink.lock().await.close().await?;
        Ok(())
    }
}

/// Connector opening bus connections over TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Connection = TcpConnection;

    async fn dial(
        &self,
        addr: &str,
        options: &ConnectOptions,
    ) -> Result<TcpConnection, TransportError> {
        let target = authority(addr);
        let stream = match options.connect_timeout {
            Some(limit) => timeout(limit, TcpStream::connect(target))
                .await
                .map_err(|_| TransportError::ConnectTimeout)??,
            None => TcpStream::connect(target).await?,
        };
        stream.set_nodelay(options.nodelay)?;
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(options.max_frame_length)
            .new_codec();
        let wire = Wire::new(Framed::new(stream, codec));

        let (username, password) = options
            .credentials
            .as_ref()
            .map(|c| (Some(c.username.clone()), Some(c.password.clone())))
            .unwrap_or_default();
        wire.write(&Frame::Open {
            container_id: options.container_id.clone(),
            username,
            password,
            idle_timeout_ms: options
                .idle_timeout
                .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
            properties: options.properties.clone(),
        })
        .await?;

        match wire.read().await? {
            Frame::Opened { container_id } => {
                debug!("connection opened: addr={target}, peer_container={container_id}");
                Ok(TcpConnection {
                    wire,
                    next_channel: 0,
                })
            }
            Frame::Refused { reason } => Err(TransportError::Refused(reason)),
            other => Err(TransportError::Protocol(format!(
                "expected opened, got {}",
                other.name()
            ))),
        }
    }
}

/// An open TCP bus connection.
pub struct TcpConnection {
    wire: Wire,
    next_channel: u16,
}

#[async_trait]
impl Connection for TcpConnection {
    type Session = TcpSession;

    async fn new_session(&mut self) -> Result<TcpSession, TransportError> {
        let channel = self.next_channel;
        self.next_channel = self.next_channel.wrapping_add(1);
        self.wire.write(&Frame::Begin { channel }).await?;
        Ok(TcpSession {
            wire: self.wire.clone(),
            channel,
            next_handle: 0,
        })
    }

    async fn close(self) -> Result<(), TransportError> {
        self.wire.write(&Frame::Close { error: None }).await?;
        self.wire.shutdown().await
    }
}

/// A session on a [`TcpConnection`].
pub struct TcpSession {
    wire: Wire,
    channel: u16,
    next_handle: u32,
}

impl TcpSession {
    fn allocate_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1);
        handle
    }
}

#[async_trait]
impl Session for TcpSession {
    type Sender = TcpSender;
    type Receiver = TcpReceiver;

    async fn new_sender(
        &mut self,
        target: &str,
        settle: SettleMode,
    ) -> Result<TcpSender, TransportError> {
        let handle = self.allocate_handle();
        self.wire
            .write(&Frame::Attach {
                channel: self.channel,
                handle,
                role: Role::Sender,
                address: Some(target.to_owned()),
                dynamic: false,
                settle,
            })
            .await?;
        Ok(TcpSender {
            wire: self.wire.clone(),
            channel: self.channel,
            handle,
            next_delivery: 0,
        })
    }

    async fn new_receiver(
        &mut self,
        source: &str,
        dynamic: bool,
    ) -> Result<TcpReceiver, TransportError> {
        let handle = self.allocate_handle();
        let channel = self.channel;
        self.wire
            .write(&Frame::Attach {
                channel,
                handle,
                role: Role::Receiver,
                address: Some(source.to_owned()),
                dynamic,
                settle: SettleMode::Unsettled,
            })
            .await?;

        let address = loop {
            match self.wire.read().await? {
                Frame::Attached {
                    channel: c,
                    handle: h,
                    address,
                } if c == channel && h == handle => break address,
                Frame::Detach {
                    channel: c,
                    handle: h,
                    error,
                } if c == channel => return Err(detached(h, error)),
                Frame::Close { error } => return Err(closed(error)),
                other => debug!("ignoring frame while attaching: kind={}", other.name()),
            }
        };

        Ok(TcpReceiver {
            wire: self.wire.clone(),
            channel,
            handle,
            address,
            last_delivery: None,
        })
    }

    async fn close(self) -> Result<(), TransportError> {
        self.wire
            .write(&Frame::End {
                channel: self.channel,
            })
            .await
    }
}

/// Sending link on a [`TcpSession`].
pub struct TcpSender {
    wire: Wire,
    channel: u16,
    handle: u32,
    next_delivery: u64,
}

#[async_trait]
impl Sender for TcpSender {
    async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let delivery_id = self.next_delivery;
        self.next_delivery = self.next_delivery.wrapping_add(1);
        self.wire
            .write(&Frame::Transfer {
                channel: self.channel,
                handle: self.handle,
                delivery_id,
                message: message.clone(),
            })
            .await
    }

    async fn close(self) -> Result<(), TransportError> {
        self.wire
            .write(&Frame::Detach {
                channel: self.channel,
                handle: self.handle,
                error: None,
            })
            .await
    }
}

/// Receiving link on a [`TcpSession`].
///
/// [`accept`](Receiver::accept) settles the most recently received delivery.
pub struct TcpReceiver {
    wire: Wire,
    channel: u16,
    handle: u32,
    address: String,
    last_delivery: Option<u64>,
}

#[async_trait]
impl Receiver for TcpReceiver {
    fn address(&self) -> Option<&str> { Some(&self.address) }

    async fn receive(&mut self) -> Result<Message, TransportError> {
        loop {
            match self.wire.read().await? {
                Frame::Transfer {
                    channel,
                    handle,
                    delivery_id,
                    message,
                } if channel == self.channel && handle == self.handle => {
                    self.last_delivery = Some(delivery_id);
                    return Ok(message);
                }
                Frame::Detach {
                    channel,
                    handle,
                    error,
                } if channel == self.channel => return Err(detached(handle, error)),
                Frame::Close { error } => return Err(closed(error)),
                other => trace!("ignoring frame on receiver: kind={}", other.name()),
            }
        }
    }

    async fn accept(&mut self, _message: &Message) -> Result<(), TransportError> {
        let Some(delivery_id) = self.last_delivery.take() else {
            return Ok(());
        };
        self.wire
            .write(&Frame::Disposition {
                channel: self.channel,
                delivery_id,
            })
            .await
    }

    async fn close(self) -> Result<(), TransportError> {
        self.wire
            .write(&Frame::Detach {
                channel: self.channel,
                handle: self.handle,
                error: None,
            })
            .await
    }
}

/// Error for a peer detach of any link on the session.
fn detached(handle: u32, error: Option<String>) -> TransportError {
    TransportError::Detached(error.unwrap_or_else(|| format!("link {handle} detached by peer")))
}

fn closed(error: Option<String>) -> TransportError {
    match error {
        Some(reason) => TransportError::Protocol(format!("peer closed connection: {reason}")),
        None => TransportError::Closed,
    }
}
