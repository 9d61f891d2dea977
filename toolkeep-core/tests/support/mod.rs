//! Shared fixtures for the execution service integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use toolkeep_config::ToolkeepConfig;
use toolkeep_core::session::StoreResult;
use toolkeep_core::{
    BackendError, DistributedLock, ExecutionOptions, ExecutionService, KeySpace, KvBackend,
    KvSessionStore, MemoryBackend, SessionRecord, SessionStore, StoreError, TieredCache, Tool,
    ToolError, ToolOutput, ToolRegistry,
};

/// Counts characters of `file` and remembers how many calls it served.
#[derive(Default)]
pub struct LengthTool {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Tool for LengthTool {
    fn name(&self) -> &str {
        "metrics"
    }

    fn state_schema(&self) -> Option<&str> {
        Some("metrics.v1")
    }

    async fn execute(&self, params: &Value, state: Option<&Value>) -> Result<ToolOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let file = params
            .get("file")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::invalid("missing 'file'"))?;
        let seen = state
            .and_then(|state| state.get("seen"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(ToolOutput::ok(json!({"file": file, "length": file.len()}))
            .with_state(json!({"seen": seen + 1})))
    }
}

/// Sleeps before answering; never cached.
pub struct SlowTool {
    pub delay: Duration,
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn cacheable(&self) -> bool {
        false
    }

    async fn execute(&self, params: &Value, _: Option<&Value>) -> Result<ToolOutput, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(ToolOutput::ok(params.clone()))
    }
}

/// Fails every call, either by raising or by reporting an error with data.
pub struct BrokenTool {
    pub partial: bool,
}

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "broken"
    }

    async fn execute(&self, _: &Value, _: Option<&Value>) -> Result<ToolOutput, ToolError> {
        if self.partial {
            Ok(ToolOutput::failed(json!({"parsed": 1}), "file truncated"))
        } else {
            Err(ToolError::failed("boom"))
        }
    }
}

/// Never finishes on its own.
pub struct HangingTool;

#[async_trait]
impl Tool for HangingTool {
    fn name(&self) -> &str {
        "hang"
    }

    async fn execute(&self, _: &Value, _: Option<&Value>) -> Result<ToolOutput, ToolError> {
        std::future::pending::<()>().await;
        Ok(ToolOutput::default())
    }
}

/// Panics on every call.
pub struct PanicTool;

#[async_trait]
impl Tool for PanicTool {
    fn name(&self) -> &str {
        "panic"
    }

    async fn execute(&self, _: &Value, _: Option<&Value>) -> Result<ToolOutput, ToolError> {
        panic!("index out of range in parser");
    }
}

pub fn registry() -> (Arc<LengthTool>, ToolRegistry) {
    let length = Arc::new(LengthTool::default());
    let registry = ToolRegistry::new()
        .with_tool(length.clone())
        .with_tool(Arc::new(SlowTool {
            delay: Duration::from_millis(40),
        }))
        .with_tool(Arc::new(BrokenTool { partial: false }))
        .with_tool(Arc::new(HangingTool))
        .with_tool(Arc::new(PanicTool));
    (length, registry)
}

pub fn config() -> ToolkeepConfig {
    let mut config = ToolkeepConfig::default();
    config.backend.force_memory = true;
    config
}

pub fn memory_service(registry: ToolRegistry, config: &ToolkeepConfig) -> (Arc<MemoryBackend>, ExecutionService) {
    let backend = Arc::new(MemoryBackend::new());
    let service = ExecutionService::new(backend.clone(), registry, config);
    (backend, service)
}

/// Session store whose writes can be switched to fail.
pub struct FlakyStore {
    inner: KvSessionStore<MemoryBackend>,
    pub fail_writes: AtomicBool,
    writes: AtomicUsize,
    fail_after: usize,
}

impl FlakyStore {
    /// Writes beyond the first `fail_after` fail once `fail_writes` is set.
    pub fn new(backend: Arc<MemoryBackend>, fail_after: usize) -> Self {
        Self {
            inner: KvSessionStore::new(backend, KeySpace::default()),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            fail_after,
        }
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Value>> {
        self.inner.get(id).await
    }

    async fn get_record(&self, id: &str) -> StoreResult<Option<SessionRecord>> {
        self.inner.get_record(id).await
    }

    async fn set(&self, id: &str, state: Value, ttl: Duration) -> StoreResult<()> {
        let write = self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) && write >= self.fail_after {
            return Err(StoreError::Backend(BackendError::Unavailable(
                "connection reset".into(),
            )));
        }
        self.inner.set(id, state, ttl).await
    }

    async fn clear(&self, id: &str) -> StoreResult<bool> {
        self.inner.clear(id).await
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        self.inner.list().await
    }

    async fn create_if_absent(&self, id: &str, initial: Value, ttl: Duration) -> StoreResult<Value> {
        self.inner.create_if_absent(id, initial, ttl).await
    }

    async fn get_ttl(&self, id: &str) -> StoreResult<Option<Duration>> {
        self.inner.get_ttl(id).await
    }

    async fn extend_ttl(&self, id: &str, seconds: u64) -> StoreResult<bool> {
        self.inner.extend_ttl(id, seconds).await
    }
}

/// Service over a [`FlakyStore`] sharing one in-process backend.
pub fn flaky_service(registry: ToolRegistry, fail_after: usize) -> (Arc<FlakyStore>, ExecutionService) {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(FlakyStore::new(backend.clone(), fail_after));
    let shared: Arc<dyn KvBackend> = backend;
    let service = ExecutionService::from_parts(
        store.clone(),
        DistributedLock::new(shared.clone(), KeySpace::default()),
        Some(Arc::new(TieredCache::new(shared, KeySpace::default(), 16, None))),
        registry,
        ExecutionOptions::default(),
    );
    (store, service)
}
