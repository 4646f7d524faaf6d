use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use pacekeeper_limits_center::{load_snapshot, LimitsSnapshot};

/// Startup failures are the only fatal errors in the system; anything
/// after `start` resolves to structured denials or logged warnings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("limits file: {0}")]
    Limits(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Service configuration. The defaults run everything in-process with
/// the built-in policy snapshot.
#[derive(Clone, Debug)]
pub struct PaceKeeperConfig {
    /// Optional YAML overlay on top of the built-in limits.
    pub limits_path: Option<PathBuf>,
    pub safety_eval_interval: Duration,
    pub resume_sweep_interval: Duration,
    pub store_purge_interval: Duration,
    pub queue_poll_interval: Duration,
    pub event_bus_capacity: usize,
}

impl Default for PaceKeeperConfig {
    fn default() -> Self {
        Self {
            limits_path: None,
            safety_eval_interval: Duration::from_secs(60),
            resume_sweep_interval: Duration::from_secs(30),
            store_purge_interval: Duration::from_secs(300),
            queue_poll_interval: Duration::from_secs(1),
            event_bus_capacity: 1024,
        }
    }
}

impl PaceKeeperConfig {
    /// Validates the configuration and resolves the effective limits
    /// snapshot. A missing or malformed limits file is fatal here, per
    /// the startup-only fatality rule.
    pub fn resolve_limits(&self) -> Result<LimitsSnapshot, ConfigError> {
        if self.event_bus_capacity == 0 {
            return Err(ConfigError::Invalid("event bus capacity must be > 0".into()));
        }
        if self.queue_poll_interval.is_zero() {
            return Err(ConfigError::Invalid("queue poll interval must be > 0".into()));
        }
        load_snapshot(self.limits_path.as_deref())
            .map_err(|err| ConfigError::Limits(err.to_string()))
    }
}
