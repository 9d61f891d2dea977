use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session lifetime and history retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Time-to-live applied on every session write.
    #[serde(default = "SessionConfig::default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Period of the in-process expiry sweep. `0` disables the background task
    /// and leaves expiry to lazy checks on read.
    #[serde(default = "SessionConfig::default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    /// Maximum execution records kept per session (oldest dropped first).
    #[serde(default = "SessionConfig::default_max_history")]
    pub max_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: Self::default_ttl_seconds(),
            sweep_interval_seconds: Self::default_sweep_interval_seconds(),
            max_history: Self::default_max_history(),
        }
    }
}

impl SessionConfig {
    const fn default_ttl_seconds() -> u64 {
        3_600
    }

    const fn default_sweep_interval_seconds() -> u64 {
        60
    }

    const fn default_max_history() -> usize {
        100
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.ttl_seconds > 0,
            "session.ttl_seconds must be greater than 0"
        );
        ensure!(
            self.max_history > 0,
            "session.max_history must be at least 1"
        );
        Ok(())
    }
}
