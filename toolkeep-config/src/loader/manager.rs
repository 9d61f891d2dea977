use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::constants::{CONFIG_FILE_NAME, USER_CONFIG_DIR, env};
use crate::loader::config::ToolkeepConfig;
use crate::loader::layers::{ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack};

/// Configuration manager for loading and validating configurations
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: ToolkeepConfig,
    config_path: Option<PathBuf>,
    layer_stack: ConfigLayerStack,
}

impl ConfigManager {
    /// Load configuration from the default locations, honouring
    /// `TOOLKEEP_CONFIG_PATH` and `TOOLKEEP_WORKSPACE`.
    pub fn load() -> Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok();

        if let Some(config_path) = lookup(env::CONFIG_PATH) {
            let trimmed = config_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_file_with_env(trimmed, lookup).with_context(|| {
                    format!(
                        "Failed to load configuration from {}={}",
                        env::CONFIG_PATH,
                        trimmed
                    )
                });
            }
        }

        if let Some(workspace_path) = lookup(env::WORKSPACE) {
            let trimmed = workspace_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_workspace_with_env(trimmed, lookup).with_context(|| {
                    format!(
                        "Failed to load configuration from {}={}",
                        env::WORKSPACE,
                        trimmed
                    )
                });
            }
        }

        Self::load_from_workspace_with_env(std::env::current_dir()?, lookup)
    }

    /// Load configuration from a specific workspace
    pub fn load_from_workspace(workspace: impl AsRef<Path>) -> Result<Self> {
        Self::load_from_workspace_with_env(workspace, |key| std::env::var(key).ok())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_from_file_with_env(path, |key| std::env::var(key).ok())
    }

    /// Same as [`ConfigManager::load_from_workspace`] with environment
    /// lookups routed through `lookup`.
    pub fn load_from_workspace_with_env<F>(workspace: impl AsRef<Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workspace = workspace.as_ref();
        let mut layer_stack = ConfigLayerStack::default();

        // 1. User home config (~/.toolkeep/toolkeep.toml)
        if let Some(user_config) = Self::user_config_path(&lookup)
            && user_config.exists()
        {
            let toml = Self::load_toml_from_file(&user_config)?;
            layer_stack.push(ConfigLayerEntry::new(
                ConfigLayerSource::User { file: user_config },
                toml,
            ));
        }

        // 2. Workspace config (toolkeep.toml in workspace root)
        let workspace_config = workspace.join(CONFIG_FILE_NAME);
        if workspace_config.exists() {
            let toml = Self::load_toml_from_file(&workspace_config)?;
            layer_stack.push(ConfigLayerEntry::new(
                ConfigLayerSource::Workspace {
                    file: workspace_config,
                },
                toml,
            ));
        }

        Self::finish(layer_stack, &lookup)
    }

    /// Same as [`ConfigManager::load_from_file`] with environment lookups
    /// routed through `lookup`.
    pub fn load_from_file_with_env<F>(path: impl AsRef<Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = path.as_ref().to_path_buf();
        let toml = Self::load_toml_from_file(&path)?;

        let mut layer_stack = ConfigLayerStack::default();
        layer_stack.push(ConfigLayerEntry::new(
            ConfigLayerSource::Explicit { file: path },
            toml,
        ));

        Self::finish(layer_stack, &lookup)
    }

    fn finish<F>(mut layer_stack: ConfigLayerStack, lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = layer_stack.layers().last().and_then(|l| match &l.source {
            ConfigLayerSource::User { file }
            | ConfigLayerSource::Workspace { file }
            | ConfigLayerSource::Explicit { file } => Some(file.clone()),
            ConfigLayerSource::Environment => None,
        });

        if let Some(overrides) = Self::env_overrides(lookup) {
            layer_stack.push(ConfigLayerEntry::new(
                ConfigLayerSource::Environment,
                overrides,
            ));
        }

        let config: ToolkeepConfig = if layer_stack.is_empty() {
            ToolkeepConfig::default()
        } else {
            layer_stack
                .effective_config()
                .try_into()
                .context("Failed to deserialize effective configuration")?
        };

        config
            .validate()
            .context("Configuration failed validation")?;

        debug!(
            layers = layer_stack.layers().len(),
            config_path = ?config_path,
            "Loaded toolkeep configuration"
        );

        Ok(Self {
            config,
            config_path,
            layer_stack,
        })
    }

    /// Build a TOML layer from the backend environment variables, if any are set.
    fn env_overrides<F>(lookup: &F) -> Option<toml::Value>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut backend = toml::Table::new();
        if let Some(url) = non_blank(env::BACKEND_URL).or_else(|| non_blank(env::REDIS_URL)) {
            backend.insert("url".into(), toml::Value::String(url));
        }
        if let Some(flag) = non_blank(env::FORCE_MEMORY) {
            let forced = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
            backend.insert("force_memory".into(), toml::Value::Boolean(forced));
        }

        if backend.is_empty() {
            return None;
        }

        let mut root = toml::Table::new();
        root.insert("backend".into(), toml::Value::Table(backend));
        Some(toml::Value::Table(root))
    }

    fn user_config_path<F>(lookup: &F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("HOME")
            .or_else(|| lookup("USERPROFILE"))
            .filter(|home| !home.trim().is_empty())
            .map(|home| {
                PathBuf::from(home)
                    .join(USER_CONFIG_DIR)
                    .join(CONFIG_FILE_NAME)
            })
    }

    fn load_toml_from_file(path: &Path) -> Result<toml::Value> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(value)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ToolkeepConfig {
        &self.config
    }

    /// Consume the manager, keeping only the configuration.
    pub fn into_config(self) -> ToolkeepConfig {
        self.config
    }

    /// Path of the highest-precedence file that contributed, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Layers in precedence order, lowest first
    pub fn layers(&self) -> &[ConfigLayerEntry] {
        self.layer_stack.layers()
    }
}
