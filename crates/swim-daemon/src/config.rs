use std::time::Duration;
use swim_core::FailureDetectorConfig;

/// Default address a node listens on.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3001";

/// Node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Address to accept protocol connections on
    pub bind_address: String,
    /// Address other members should use to reach us (defaults to the bound socket address)
    pub advertise_address: Option<String>,
    /// Probe timing and dissemination settings
    pub detector: FailureDetectorConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            advertise_address: None,
            detector: FailureDetectorConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Default configuration listening on `bind_address`.
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            ..Self::default()
        }
    }

    /// Read deadline for a ping-req.
    ///
    /// The helper spends up to one connect and one exchange on the target
    /// before it can answer, so the requester waits for both plus its own read.
    pub fn indirect_timeout(&self) -> Duration {
        self.detector.probe_timeout.saturating_mul(3)
    }

    /// Reject settings that would make the node unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::EmptyBindAddress);
        }
        if matches!(self.advertise_address.as_deref(), Some(a) if a.trim().is_empty()) {
            return Err(ConfigError::EmptyAdvertiseAddress);
        }
        if self.detector.ping_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.detector.probe_timeout.is_zero() {
            return Err(ConfigError::ZeroProbeTimeout);
        }
        if self.detector.max_rounds == 0 {
            return Err(ConfigError::ZeroMaxRounds);
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("bind address must not be empty")]
    EmptyBindAddress,
    #[error("advertise address must not be empty when set")]
    EmptyAdvertiseAddress,
    #[error("gossip interval must be greater than zero")]
    ZeroInterval,
    #[error("probe timeout must be greater than zero")]
    ZeroProbeTimeout,
    #[error("max rounds must be at least 1")]
    ZeroMaxRounds,
}
