//! Process startup: configuration, backend selection and service wiring.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use toolkeep_config::constants::env;
use toolkeep_config::{ConfigManager, ToolkeepConfig};
use toolkeep_core::{BackendSelection, ExecutionService, select_backend};
use tracing::{debug, info};

use crate::args::Cli;
use crate::tools::builtin_registry;

/// Everything a command needs once the process is configured.
#[derive(Debug)]
pub struct StartupContext {
    pub workspace: PathBuf,
    pub config: ToolkeepConfig,
    pub config_path: Option<PathBuf>,
    pub backend: BackendSelection,
    pub service: Arc<ExecutionService>,
    sweeper: Option<JoinHandle<()>>,
}

impl StartupContext {
    /// Resolve the workspace and load its configuration.
    ///
    /// `--config` wins over `--workspace`, which wins over the
    /// `TOOLKEEP_CONFIG_PATH` / `TOOLKEEP_WORKSPACE` discovery.
    pub fn load_config(args: &Cli) -> Result<(PathBuf, ConfigManager)> {
        let workspace = resolve_workspace(args.workspace.as_deref())?;
        let manager = match (&args.config, &args.workspace) {
            (Some(path), _) => ConfigManager::load_from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            (None, Some(_)) => ConfigManager::load_from_workspace(&workspace)?,
            (None, None) => ConfigManager::load()?,
        };
        Ok((workspace, manager))
    }

    /// Select the session backend and build the execution service.
    pub async fn start(workspace: PathBuf, manager: ConfigManager, force_memory: bool) -> Result<Self> {
        let config_path = manager.config_path().map(Path::to_path_buf);
        let mut config = manager.into_config();
        if force_memory {
            config.backend.force_memory = true;
        }
        debug!(
            workspace = %workspace.display(),
            config = ?config_path,
            "starting toolkeep"
        );

        let backend = select_backend(&config.backend).await;
        let sweeper = config
            .session
            .sweep_interval()
            .and_then(|interval| backend.spawn_sweeper(interval));
        info!(
            backend = %backend.kind,
            fallback_reason = backend.fallback_reason.as_deref().unwrap_or(""),
            "session backend ready"
        );

        let service = ExecutionService::new(
            Arc::clone(&backend.backend),
            builtin_registry(&workspace),
            &config,
        );

        Ok(Self {
            workspace,
            config,
            config_path,
            backend,
            service: Arc::new(service),
            sweeper,
        })
    }
}

impl Drop for StartupContext {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

fn resolve_workspace(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(env::WORKSPACE)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path.trim()));
    }
    std::env::current_dir().context("Failed to determine current directory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use toolkeep_core::BackendKind;

    #[tokio::test]
    async fn explicit_config_and_force_memory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[backend]\nurl = \"redis://127.0.0.1:1\"\n[session]\nmax_history = 7\n",
        )
        .expect("write config");

        let config_arg = path.to_str().expect("utf-8 path");
        let workspace_arg = dir.path().to_str().expect("utf-8 path");
        let args = Cli::try_parse_from([
            "toolkeep",
            "--config",
            config_arg,
            "--workspace",
            workspace_arg,
            "--force-memory",
            "probe",
        ])
        .expect("parse");

        let (workspace, manager) = StartupContext::load_config(&args).expect("load");
        assert_eq!(workspace, dir.path());
        let startup = StartupContext::start(workspace, manager, args.force_memory)
            .await
            .expect("start");

        assert_eq!(startup.backend.kind, BackendKind::Memory);
        assert_eq!(startup.config.session.max_history, 7);
        assert_eq!(startup.config_path.as_deref(), Some(path.as_path()));
        assert!(startup.service.registry().contains("metrics"));
    }
}
