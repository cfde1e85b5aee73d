//! swim-core: Transport-independent pieces of the SWIM membership protocol.
//!
//! This crate provides:
//! - The membership log (alive/failed sets and round-bounded gossip updates)
//! - The tagged wire messages exchanged between nodes
//! - Failure detector settings
//!
//! Networking lives in `swim-daemon`.

pub mod failure;
pub mod membership;
pub mod messages;

pub use failure::FailureDetectorConfig;
pub use membership::{Member, MembershipError, MembershipLog, Update, UpdateKind};
pub use messages::{
    CodecError, JoinRequest, JoinResponse, MAX_MESSAGE_SIZE, Message, MessageType, Query,
    QueryKind, QueryResponse,
};
