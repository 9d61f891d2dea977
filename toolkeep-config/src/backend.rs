use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::keys::DEFAULT_PREFIX;

/// Shared backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Address of the shared key/value backend (e.g. `redis://127.0.0.1:6379`).
    /// When unset the in-process store is used.
    #[serde(default)]
    pub url: Option<String>,
    /// Skip the shared backend entirely, even when `url` is set.
    #[serde(default)]
    pub force_memory: bool,
    /// Connectivity probe budget at startup, in milliseconds.
    #[serde(default = "BackendConfig::default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Prefix applied to every key written to the backend.
    #[serde(default = "BackendConfig::default_key_prefix")]
    pub key_prefix: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            force_memory: false,
            probe_timeout_ms: Self::default_probe_timeout_ms(),
            key_prefix: Self::default_key_prefix(),
        }
    }
}

impl BackendConfig {
    const fn default_probe_timeout_ms() -> u64 {
        500
    }

    fn default_key_prefix() -> String {
        DEFAULT_PREFIX.to_string()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Backend address to probe, if any. Blank strings count as unset.
    pub fn shared_url(&self) -> Option<&str> {
        if self.force_memory {
            return None;
        }
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.probe_timeout_ms > 0,
            "backend.probe_timeout_ms must be greater than 0"
        );
        ensure!(
            !self.key_prefix.trim().is_empty(),
            "backend.key_prefix must not be empty"
        );
        ensure!(
            !self.key_prefix.contains(char::is_whitespace),
            "backend.key_prefix must not contain whitespace"
        );
        Ok(())
    }
}
