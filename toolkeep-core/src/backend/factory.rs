use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use toolkeep_config::BackendConfig;
use tracing::{info, warn};

use super::{BackendKind, KvBackend, MemoryBackend, RedisBackend};

/// Outcome of the startup backend probe.
#[derive(Debug, Clone)]
pub struct BackendSelection {
    pub backend: Arc<dyn KvBackend>,
    pub kind: BackendKind,
    /// Why the in-process backend was chosen, when it was.
    pub fallback_reason: Option<String>,
    memory: Option<Arc<MemoryBackend>>,
}

impl BackendSelection {
    pub fn in_memory(reason: impl Into<String>) -> Self {
        let memory = Arc::new(MemoryBackend::new());
        Self {
            backend: memory.clone(),
            kind: BackendKind::Memory,
            fallback_reason: Some(reason.into()),
            memory: Some(memory),
        }
    }

    fn redis(backend: RedisBackend) -> Self {
        Self {
            backend: Arc::new(backend),
            kind: BackendKind::Redis,
            fallback_reason: None,
            memory: None,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.kind == BackendKind::Redis
    }

    /// Start the periodic expiry sweep when the in-process backend was
    /// selected. Shared backends expire keys themselves.
    pub fn spawn_sweeper(&self, interval: Duration) -> Option<JoinHandle<()>> {
        self.memory
            .as_ref()
            .map(|memory| memory.spawn_sweeper(interval))
    }
}

/// Pick the backend for this process.
///
/// Forced in-process mode or a missing URL select the in-process backend
/// directly. Otherwise the shared backend is connected and pinged within
/// `probe_timeout_ms`; any failure falls back to the in-process backend.
/// The choice is never revisited for the lifetime of the process.
pub async fn select_backend(config: &BackendConfig) -> BackendSelection {
    if config.force_memory {
        info!(backend = "memory", "in-process backend forced by configuration");
        return BackendSelection::in_memory("forced by configuration");
    }

    let Some(url) = config.shared_url() else {
        info!(backend = "memory", "no shared backend configured");
        return BackendSelection::in_memory("no backend url configured");
    };

    match RedisBackend::connect(url, config.probe_timeout()).await {
        Ok(backend) => {
            info!(backend = "redis", "using shared backend");
            BackendSelection::redis(backend)
        }
        Err(err) => {
            warn!(
                backend = "memory",
                error = %err,
                "shared backend unreachable, falling back to in-process store"
            );
            BackendSelection::in_memory(err.to_string())
        }
    }
}
