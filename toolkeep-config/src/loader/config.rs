use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend::BackendConfig;
use crate::cache::CacheConfig;
use crate::debug::DebugConfig;
use crate::lock::LockConfig;
use crate::session::SessionConfig;

/// Main configuration structure for toolkeep
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ToolkeepConfig {
    /// Shared backend selection and probing
    #[serde(default)]
    pub backend: BackendConfig,

    /// Session lifetime and history retention
    #[serde(default)]
    pub session: SessionConfig,

    /// Per-session lock timing
    #[serde(default)]
    pub lock: LockConfig,

    /// Tool result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging settings
    #[serde(default)]
    pub debug: DebugConfig,
}

impl ToolkeepConfig {
    pub fn validate(&self) -> Result<()> {
        self.backend
            .validate()
            .context("Invalid backend configuration")?;

        self.session
            .validate()
            .context("Invalid session configuration")?;

        self.lock.validate().context("Invalid lock configuration")?;

        self.cache
            .validate()
            .context("Invalid cache configuration")?;

        Ok(())
    }

    /// Parse a TOML document, filling every missing section with defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}
