//! Wire frames of the bus protocol spoken by [`TcpConnector`](super::TcpConnector).
//!
//! Each frame travels as one length-delimited record whose body is the
//! bincode encoding of [`Frame`] in bincode's standard configuration.

use std::collections::BTreeMap;

use bincode::{Decode, Encode, config, decode_from_slice, encode_to_vec};
use bytes::Bytes;

use super::{SettleMode, TransportError};
use crate::message::Message;

/// Direction of a link from the point of view of the endpoint attaching it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Role {
    /// The attaching endpoint sends transfers on the link.
    Sender,
    /// The attaching endpoint receives transfers on the link.
    Receiver,
}

/// A single protocol frame.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Frame {
    /// First frame sent by the connecting endpoint.
    Open {
        container_id: String,
        username: Option<String>,
        password: Option<String>,
        idle_timeout_ms: Option<u64>,
        properties: BTreeMap<String, String>,
    },
    /// The peer accepted the connection.
    Opened { container_id: String },
    /// The peer rejected the connection.
    Refused { reason: String },
    /// Begin a session on `channel`.
    Begin { channel: u16 },
    /// End the session on `channel`.
    End { channel: u16 },
    /// Attach a link.
    Attach {
        channel: u16,
        handle: u32,
        role: Role,
        address: Option<String>,
        dynamic: bool,
        settle: SettleMode,
    },
    /// The peer confirmed a receiving link and its realized address.
    Attached {
        channel: u16,
        handle: u32,
        address: String,
    },
    /// A message travelling on a link.
    Transfer {
        channel: u16,
        handle: u32,
        delivery_id: u64,
        message: Message,
    },
    /// Acknowledge consumption of a delivery.
    Disposition { channel: u16, delivery_id: u64 },
    /// Detach a link, optionally reporting why.
    Detach {
        channel: u16,
        handle: u32,
        error: Option<String>,
    },
    /// Close the connection, optionally reporting why.
    Close { error: Option<String> },
}

impl Frame {
    /// Short name used in logs and protocol errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Opened { .. } => "opened",
            Self::Refused { .. } => "refused",
            Self::Begin { .. } => "begin",
            Self::End { .. } => "end",
            Self::Attach { .. } => "attach",
            Self::Attached { .. } => "attached",
            Self::Transfer { .. } => "transfer",
            Self::Disposition { .. } => "disposition",
            Self::Detach { .. } => "detach",
            Self::Close { .. } => "close",
        }
    }

    /// Encode the frame body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Encode`] if bincode rejects the frame.
    pub fn encode(&self) -> Result<Bytes, TransportError> {
        encode_to_vec(self, config::standard())
            .map(Bytes::from)
            .map_err(TransportError::Encode)
    }

    /// Decode a frame body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] if the bytes are not a valid frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        let (frame, consumed): (Self, usize) =
            decode_from_slice(bytes, config::standard()).map_err(TransportError::Decode)?;
        if consumed != bytes.len() {
            return Err(TransportError::Protocol(format!(
                "{} trailing bytes after {} frame",
                bytes.len() - consumed,
                frame.name()
            )));
        }
        Ok(frame)
    }
}
