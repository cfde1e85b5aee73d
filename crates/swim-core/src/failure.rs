//! SWIM failure detection settings.
//!
//! Failure detection uses ping/ack with indirect probing:
//! 1. Every `ping_interval`, ping one random member
//! 2. If the ping fails, ask `indirect_probes` other members to ping it
//! 3. If none of them gets an ack, declare the member failed
//!
//! Every connect/read/write of a probe is bounded by `probe_timeout`, so a
//! single unresponsive peer cannot stall a gossip cycle.

use std::time::Duration;

/// Configuration for failure detection and dissemination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDetectorConfig {
    /// How often to run a gossip cycle (default: 50ms)
    pub ping_interval: Duration,
    /// Upper bound on each connect/read/write of a probe (default: 500ms)
    pub probe_timeout: Duration,
    /// Number of helpers asked for an indirect ping (default: 3)
    pub indirect_probes: usize,
    /// Gossip cycles an update is piggybacked for (default: 2)
    pub max_rounds: u32,
}

impl Default for FailureDetectorConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(50),
            probe_timeout: Duration::from_millis(500),
            indirect_probes: 3,
            max_rounds: 2,
        }
    }
}
