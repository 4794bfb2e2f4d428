//! Configuration for coordinator and peripheral nodes

use crate::error::ConfigError;
use crate::types::{PeerId, DEFAULT_PORT, EPSILON, PEER_COUNT};
use std::time::Duration;

/// Default per-round deadline
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Address to listen on
    pub bind_addr: String,

    /// TCP port to listen on
    pub port: u16,

    /// Number of peripherals that must register before round 1
    pub peer_count: usize,

    /// Stabilization tolerance
    pub epsilon: f64,

    /// Deadline for collecting one round of replies (None waits forever)
    pub round_timeout: Option<Duration>,
}

/// Peripheral settings
#[derive(Debug, Clone)]
pub struct PeripheralConfig {
    /// Node id, 1..=PEER_COUNT
    pub id: PeerId,

    /// Coordinator host
    pub host: String,

    /// Coordinator port
    pub port: u16,

    /// Deadline for each CENTRAL/DONE from the coordinator (None waits forever)
    pub round_timeout: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            peer_count: PEER_COUNT,
            epsilon: EPSILON,
            round_timeout: Some(DEFAULT_ROUND_TIMEOUT),
        }
    }
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            id: 1,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            round_timeout: Some(DEFAULT_ROUND_TIMEOUT),
        }
    }
}

impl CoordinatorConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_peer_count(mut self, count: usize) -> Self {
        self.peer_count = count;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_round_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.round_timeout = timeout;
        self
    }

    /// Check settings before starting a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peer_count == 0 {
            return Err(ConfigError::NoPeers);
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(ConfigError::InvalidEpsilon(self.epsilon));
        }
        if self.round_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

impl PeripheralConfig {
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_round_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.round_timeout = timeout;
        self
    }

    /// Check settings before connecting
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id == 0 || self.id as usize > PEER_COUNT {
            return Err(ConfigError::IdOutOfRange {
                id: self.id,
                max: PEER_COUNT,
            });
        }
        if self.round_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Initial temperatures must be finite to be sent on the wire
pub fn validate_initial_value(value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFiniteValue(value))
    }
}

/// Interpret a seconds value from the command line; 0 disables the deadline
pub fn round_timeout_from_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}
