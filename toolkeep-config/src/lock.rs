use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-session lock behaviour.
///
/// `ttl_ms` must cover the slowest expected tool run; a lock that expires
/// mid-execution lets a second caller in.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LockConfig {
    /// Lifetime of a lock marker, in milliseconds.
    #[serde(default = "LockConfig::default_ttl_ms")]
    pub ttl_ms: u64,
    /// How long a caller polls for a busy lock before giving up. `0` fails fast.
    #[serde(default)]
    pub wait_ms: u64,
    /// Poll interval while waiting for a busy lock.
    #[serde(default = "LockConfig::default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: Self::default_ttl_ms(),
            wait_ms: 0,
            retry_interval_ms: Self::default_retry_interval_ms(),
        }
    }
}

impl LockConfig {
    const fn default_ttl_ms() -> u64 {
        30_000
    }

    const fn default_retry_interval_ms() -> u64 {
        25
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.ttl_ms >= 10, "lock.ttl_ms must be at least 10ms");
        ensure!(
            self.wait_ms == 0 || self.retry_interval_ms > 0,
            "lock.retry_interval_ms must be greater than 0 when lock.wait_ms is set"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fail_fast() {
        let config = LockConfig::default();
        assert_eq!(config.wait(), Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn waiting_requires_poll_interval() {
        let config = LockConfig {
            wait_ms: 200,
            retry_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
