use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tool result cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Master switch. When off, `useCache` requests always run the tool.
    #[serde(default = "CacheConfig::default_enabled")]
    pub enabled: bool,
    /// Entries held in the in-process tier before the oldest write is evicted.
    #[serde(default = "CacheConfig::default_fast_capacity")]
    pub fast_capacity: usize,
    /// Expiry applied to cached results when the tool does not set its own.
    /// `0` keeps entries until evicted.
    #[serde(default = "CacheConfig::default_ttl_seconds")]
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            fast_capacity: Self::default_fast_capacity(),
            default_ttl_seconds: Self::default_ttl_seconds(),
        }
    }
}

impl CacheConfig {
    const fn default_enabled() -> bool {
        true
    }

    const fn default_fast_capacity() -> usize {
        1_000
    }

    const fn default_ttl_seconds() -> u64 {
        300
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_seconds > 0).then(|| Duration::from_secs(self.default_ttl_seconds))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.fast_capacity > 0,
            "cache.fast_capacity must be at least 1"
        );
        Ok(())
    }
}
