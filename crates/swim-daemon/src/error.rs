//! Error types for the SWIM node.

use crate::config::ConfigError;
use swim_core::{CodecError, MembershipError, MessageType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out talking to {address}")]
    Timeout { address: String },

    #[error("Connection closed before a full message was received")]
    ConnectionClosed,

    #[error("Message exceeds max size ({0} bytes)")]
    MessageTooLarge(usize),

    #[error("Expected {expected:?} from {address}, got {actual:?}")]
    UnexpectedResponse {
        address: String,
        expected: MessageType,
        actual: MessageType,
    },

    #[error("Missing address")]
    MissingAddress,

    #[error("Ack not received: {helper} could not reach {target}")]
    AckNotReceived { helper: String, target: String },

    #[error("Listener not available (node stopped or already listening)")]
    NotStarted,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NodeError>;
