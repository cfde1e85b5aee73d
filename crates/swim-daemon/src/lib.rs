//! swim-daemon library: The SWIM node runtime over TCP.
//!
//! Exposes the node so the binary and integration tests share one
//! implementation.

pub mod client;
pub mod config;
pub mod error;
mod gossip;
pub mod node;
mod server;

// Re-export key types for convenience
pub use client::Client;
pub use config::{ConfigError, NodeConfig};
pub use error::NodeError;
pub use node::{Node, NodeState};
