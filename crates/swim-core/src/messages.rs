//! SWIM wire messages.
//!
//! Every frame is a one-byte type tag followed by a compact JSON body and a
//! terminating newline:
//!
//! ```text
//! [tag: u8][json body]['\n']
//! ```
//!
//! Compact JSON never contains a raw newline (string contents are escaped), so
//! the newline marks the end of the body without a length prefix.

use crate::membership::{MembershipLog, Update};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum frame size (1MB). Snapshots of large clusters are the biggest frames.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Byte terminating every frame.
pub const FRAME_DELIMITER: u8 = b'\n';

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode {ty:?} message: {source}")]
    Decode {
        ty: MessageType,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unrecognized message type: {0:#04x}")]
    UnrecognizedMessageType(u8),

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Ping-req target is not a valid UTF-8 address")]
    InvalidTarget(#[from] std::string::FromUtf8Error),
}

/// Message discriminant, sent as the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Join = 1,
    JoinResponse = 2,
    Query = 4,
    QueryResponse = 8,
}

impl MessageType {
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::Join),
            2 => Ok(Self::JoinResponse),
            4 => Ok(Self::Query),
            8 => Ok(Self::QueryResponse),
            other => Err(CodecError::UnrecognizedMessageType(other)),
        }
    }
}

/// Request to join the cluster through the receiving node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub name: String,
    pub address: String,
}

/// Full membership snapshot handed to a joining node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub members: MembershipLog,
}

/// Probe flavour carried in a [`Query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryKind {
    /// Direct probe of the receiver
    Ping,
    /// Ask the receiver to probe the address in `data` on our behalf
    PingReq,
}

/// Probe with piggybacked updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub name: QueryKind,
    pub updates: Vec<Update>,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Query {
    /// Direct probe carrying `updates`.
    pub fn ping(updates: Vec<Update>) -> Self {
        Self {
            name: QueryKind::Ping,
            updates,
            data: Vec::new(),
        }
    }

    /// Indirect probe of `target` carrying `updates`.
    pub fn ping_req(updates: Vec<Update>, target: &str) -> Self {
        Self {
            name: QueryKind::PingReq,
            updates,
            data: target.as_bytes().to_vec(),
        }
    }

    /// Address to probe for a ping-req.
    pub fn target_address(&self) -> Result<String, CodecError> {
        Ok(String::from_utf8(self.data.clone())?)
    }
}

/// Answer to a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub updates: Vec<Update>,
    /// Whether a ping-req target answered the helper
    #[serde(default)]
    pub ack: bool,
}

/// All messages understood by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Join(JoinRequest),
    JoinResponse(JoinResponse),
    Query(Query),
    QueryResponse(QueryResponse),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Join(_) => MessageType::Join,
            Message::JoinResponse(_) => MessageType::JoinResponse,
            Message::Query(_) => MessageType::Query,
            Message::QueryResponse(_) => MessageType::QueryResponse,
        }
    }

    /// Encode into a complete frame (tag, body, delimiter).
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = vec![self.message_type().tag()];

        let written = match self {
            Message::Join(body) => serde_json::to_writer(&mut buf, body),
            Message::JoinResponse(body) => serde_json::to_writer(&mut buf, body),
            Message::Query(body) => serde_json::to_writer(&mut buf, body),
            Message::QueryResponse(body) => serde_json::to_writer(&mut buf, body),
        };
        written.map_err(CodecError::Encode)?;

        buf.push(FRAME_DELIMITER);
        Ok(buf)
    }

    /// Decode a complete frame.
    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let (&tag, body) = frame.split_first().ok_or(CodecError::EmptyFrame)?;
        Self::decode_body(MessageType::try_from(tag)?, body)
    }

    /// Decode a body whose tag has already been read off the stream.
    pub fn decode_body(ty: MessageType, body: &[u8]) -> Result<Self, CodecError> {
        let body = body.strip_suffix(&[FRAME_DELIMITER]).unwrap_or(body);
        let err = |source| CodecError::Decode { ty, source };

        let message = match ty {
            MessageType::Join => Message::Join(serde_json::from_slice(body).map_err(err)?),
            MessageType::JoinResponse => {
                Message::JoinResponse(serde_json::from_slice(body).map_err(err)?)
            }
            MessageType::Query => Message::Query(serde_json::from_slice(body).map_err(err)?),
            MessageType::QueryResponse => {
                Message::QueryResponse(serde_json::from_slice(body).map_err(err)?)
            }
        };
        Ok(message)
    }
}

impl From<JoinRequest> for Message {
    fn from(body: JoinRequest) -> Self {
        Message::Join(body)
    }
}

impl From<JoinResponse> for Message {
    fn from(body: JoinResponse) -> Self {
        Message::JoinResponse(body)
    }
}

impl From<Query> for Message {
    fn from(body: Query) -> Self {
        Message::Query(body)
    }
}

impl From<QueryResponse> for Message {
    fn from(body: QueryResponse) -> Self {
        Message::QueryResponse(body)
    }
}
