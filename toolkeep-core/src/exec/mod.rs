//! Orchestration of one tool call against a session.
//!
//! Per call: resolve the session id, take the session lock, load the
//! session, consult the cache, drive the state machine around the tool
//! invocation, persist the session, release the lock. Every failure is
//! folded into the returned [`ExecutionResult`].

mod result;
mod state;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use toolkeep_commons::ErrorCategory;
use toolkeep_config::ToolkeepConfig;
use tracing::{Instrument, debug, debug_span, warn};
use uuid::Uuid;

use crate::backend::{KeySpace, KvBackend};
use crate::cache::{CacheKey, CacheStats, TieredCache};
use crate::lock::{DistributedLock, LockToken};
use crate::machine::{self, ExecutionRecord, MachineEvent, MachineState};
use crate::session::{KvSessionStore, SessionRecord, SessionStore};
use crate::tools::{Tool, ToolError, ToolRegistry};

pub use result::{ExecutionError, ExecutionRequest, ExecutionResult, ExecutionStatus};
pub use state::{SessionState, ToolState};

/// Timing and retention knobs resolved from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub session_ttl: Duration,
    pub lock_ttl: Duration,
    pub lock_wait: Duration,
    pub lock_retry_interval: Duration,
    pub max_history: usize,
}

impl ExecutionOptions {
    pub fn from_config(config: &ToolkeepConfig) -> Self {
        Self {
            session_ttl: config.session.ttl(),
            lock_ttl: config.lock.ttl(),
            lock_wait: config.lock.wait(),
            lock_retry_interval: config.lock.retry_interval(),
            max_history: config.session.max_history,
        }
    }
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self::from_config(&ToolkeepConfig::default())
    }
}

/// Identity of one call, fixed before any I/O.
struct Invocation {
    execution_id: String,
    tool_id: String,
    session_id: String,
    params: Value,
    started: Instant,
    timestamp: DateTime<Utc>,
}

impl Invocation {
    fn new(request: ExecutionRequest) -> Self {
        let session_id = request
            .session_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let params = if request.params.is_null() {
            json!({})
        } else {
            request.params
        };
        Self {
            execution_id: Uuid::new_v4().to_string(),
            tool_id: request.tool_id.trim().to_string(),
            session_id,
            params,
            started: Instant::now(),
            timestamp: Utc::now(),
        }
    }

    fn finish(self, outcome: Outcome) -> ExecutionResult {
        ExecutionResult {
            execution_id: self.execution_id,
            tool_id: self.tool_id,
            session_id: self.session_id,
            params: self.params,
            result: outcome.result,
            error: outcome.error,
            status: outcome.status,
            execution_time_ms: u64::try_from(self.started.elapsed().as_millis())
                .unwrap_or(u64::MAX),
            timestamp: self.timestamp,
            from_cache: outcome.from_cache,
        }
    }
}

struct Outcome {
    status: ExecutionStatus,
    result: Option<Value>,
    error: Option<ExecutionError>,
    from_cache: bool,
}

impl Outcome {
    fn succeeded(result: Value, from_cache: bool) -> Self {
        Self {
            status: ExecutionStatus::Succeeded,
            result: Some(result),
            error: None,
            from_cache,
        }
    }

    fn failed(error: ExecutionError) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            result: None,
            error: Some(error),
            from_cache: false,
        }
    }

    fn cancelled() -> Self {
        Self {
            status: ExecutionStatus::Cancelled,
            result: None,
            error: Some(ExecutionError::new(
                ErrorCategory::Cancelled,
                "execution cancelled by caller",
            )),
            from_cache: false,
        }
    }
}

/// Runs tools against persistent sessions.
///
/// Constructed once per process and shared; holds no per-session state of
/// its own. All per-session mutation happens while holding that session's
/// [`DistributedLock`].
pub struct ExecutionService {
    store: Arc<dyn SessionStore>,
    lock: DistributedLock,
    cache: Option<Arc<TieredCache>>,
    registry: Arc<ToolRegistry>,
    options: ExecutionOptions,
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService")
            .field("registry", &self.registry)
            .field("cache_enabled", &self.cache.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ExecutionService {
    /// Wire the store, lock and cache onto one backend.
    pub fn new(backend: Arc<dyn KvBackend>, registry: ToolRegistry, config: &ToolkeepConfig) -> Self {
        let keys = KeySpace::new(config.backend.key_prefix.as_str());
        let store: Arc<dyn SessionStore> =
            Arc::new(KvSessionStore::new(Arc::clone(&backend), keys.clone()));
        let lock = DistributedLock::new(Arc::clone(&backend), keys.clone());
        let cache = config.cache.enabled.then(|| {
            Arc::new(TieredCache::new(
                backend,
                keys,
                config.cache.fast_capacity,
                config.cache.default_ttl(),
            ))
        });
        Self::from_parts(
            store,
            lock,
            cache,
            registry,
            ExecutionOptions::from_config(config),
        )
    }

    pub fn from_parts(
        store: Arc<dyn SessionStore>,
        lock: DistributedLock,
        cache: Option<Arc<TieredCache>>,
        registry: ToolRegistry,
        options: ExecutionOptions,
    ) -> Self {
        Self {
            store,
            lock,
            cache,
            registry: Arc::new(registry),
            options,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub async fn execute_tool(&self, request: ExecutionRequest) -> ExecutionResult {
        self.execute_tool_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Like [`ExecutionService::execute_tool`], but the tool call is abandoned
    /// when `cancel` fires. The session then records a cancelled execution.
    pub async fn execute_tool_with_cancellation(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let use_cache = request.use_cache;
        let call = Invocation::new(request);
        let span = debug_span!(
            "execute_tool",
            tool = %call.tool_id,
            session_id = %call.session_id,
            execution_id = %call.execution_id
        );

        async move {
            let tool = match self.validate(&call) {
                Ok(tool) => tool,
                Err(err) => {
                    debug!(error = %err, "rejected invalid request");
                    return call.finish(Outcome::failed(err));
                }
            };

            let token = match self.lock_session(&call.session_id).await {
                Ok(token) => token,
                Err(err) => return call.finish(Outcome::failed(err)),
            };

            let outcome = self
                .run_locked(&call, tool.as_ref(), use_cache, &cancel)
                .await;
            self.release(&call.session_id, &token).await;

            let result = call.finish(outcome);
            debug!(
                status = ?result.status,
                from_cache = result.from_cache,
                elapsed_ms = result.execution_time_ms,
                "tool execution finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    fn validate(&self, call: &Invocation) -> Result<Arc<dyn Tool>, ExecutionError> {
        if call.tool_id.is_empty() {
            return Err(ExecutionError::validation("tool id must not be empty"));
        }
        if !call.params.is_object() {
            return Err(ExecutionError::validation(
                "parameters must be a JSON object",
            ));
        }
        self.registry.get(&call.tool_id).ok_or_else(|| {
            ExecutionError::validation(format!("unknown tool '{}'", call.tool_id))
        })
    }

    fn cache_for(&self, tool: &dyn Tool) -> Option<&TieredCache> {
        self.cache.as_deref().filter(|_| tool.cacheable())
    }

    async fn run_locked(
        &self,
        call: &Invocation,
        tool: &dyn Tool,
        use_cache: bool,
        cancel: &CancellationToken,
    ) -> Outcome {
        let mut state = match self.load_state(&call.session_id).await {
            Ok(state) => state,
            Err(err) => return Outcome::failed(err),
        };
        let recovered = recover_stale(&call.session_id, &mut state);

        let cache = self.cache_for(tool);
        let cache_key = CacheKey::new(call.tool_id.as_str(), &call.params).logical();
        if use_cache
            && let Some(cache) = cache
            && let Some(hit) = cache.get(&cache_key, Some(call.tool_id.as_str())).await
        {
            if recovered && let Err(err) = self.persist(&call.session_id, &state).await {
                warn!(error = %err, "failed to persist recovered session state");
            }
            return Outcome::succeeded(hit, true);
        }

        let mut ctx = state.machine.clone();
        for event in [
            MachineEvent::SelectTool {
                tool_name: call.tool_id.clone(),
            },
            MachineEvent::SetParameters {
                params: call.params.clone(),
            },
            MachineEvent::Execute,
        ] {
            ctx = match machine::apply(&ctx, event) {
                Ok(next) => next,
                Err(err) => return Outcome::failed(ExecutionError::validation(err.to_string())),
            };
        }

        // Mark the session as executing so a crash mid-call is visible to
        // the next holder.
        state.machine = ctx;
        if let Err(err) = self.persist(&call.session_id, &state).await {
            return Outcome::failed(err);
        }

        let prior = state.tool_state_for(&call.tool_id, tool.state_schema());
        let invocation = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            output = AssertUnwindSafe(tool.execute(&call.params, prior.as_ref())).catch_unwind() => {
                Some(output.unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    warn!(panic = %message, "tool panicked during execution");
                    Err(ToolError::failed(format!("tool panicked: {message}")))
                }))
            }
        };

        let (event, mut outcome) = match invocation {
            None => {
                warn!("tool execution cancelled");
                (MachineEvent::Cancel, Outcome::cancelled())
            }
            Some(Ok(output)) => match output.error {
                Some(message) => {
                    let partial = Some(output.result).filter(|value| !value.is_null());
                    let outcome = Outcome {
                        result: partial,
                        ..Outcome::failed(ExecutionError::new(
                            ErrorCategory::ToolExecution,
                            message.clone(),
                        ))
                    };
                    (MachineEvent::Error { error: message }, outcome)
                }
                None => {
                    if let Some(tool_state) = output.state {
                        state.set_tool_state(&call.tool_id, tool.state_schema(), tool_state);
                    }
                    if let Some(cache) = cache {
                        cache
                            .set(
                                &cache_key,
                                output.result.clone(),
                                tool.cache_ttl(),
                                Some(call.tool_id.as_str()),
                            )
                            .await;
                    }
                    (
                        MachineEvent::ReceivedResult {
                            result: output.result.clone(),
                        },
                        Outcome::succeeded(output.result, false),
                    )
                }
            },
            Some(Err(err)) => {
                let message = err.to_string();
                debug!(error = %message, "tool returned an error");
                (
                    MachineEvent::Error {
                        error: message.clone(),
                    },
                    Outcome::failed(ExecutionError::new(err.category(), message)),
                )
            }
        };

        match machine::apply(&state.machine, event) {
            Ok(next) => state.machine = next,
            Err(err) => warn!(error = %err, "unexpected state machine rejection"),
        }
        state.machine.truncate_history(self.options.max_history);

        if let Err(err) = self.persist(&call.session_id, &state).await {
            warn!(error = %err, "failed to persist session after tool execution");
            if outcome.status != ExecutionStatus::Failed {
                outcome.status = ExecutionStatus::Failed;
                outcome.error = Some(err);
            }
        }
        outcome
    }

    async fn load_state(&self, session_id: &str) -> Result<SessionState, ExecutionError> {
        let initial = SessionState::default()
            .encode()
            .map_err(|err| ExecutionError::new(ErrorCategory::Serialization, err.to_string()))?;
        let value = self
            .store
            .create_if_absent(session_id, initial, self.options.session_ttl)
            .await?;
        Ok(SessionState::decode_or_default(session_id, value))
    }

    /// Write `state` back, refreshing the session TTL.
    async fn persist(&self, session_id: &str, state: &SessionState) -> Result<(), ExecutionError> {
        let value = state
            .encode()
            .map_err(|err| ExecutionError::new(ErrorCategory::Serialization, err.to_string()))?;
        self.store
            .set(session_id, value, self.options.session_ttl)
            .await?;
        Ok(())
    }

    async fn lock_session(&self, session_id: &str) -> Result<LockToken, ExecutionError> {
        match self
            .lock
            .acquire_within(
                session_id,
                self.options.lock_ttl,
                self.options.lock_wait,
                self.options.lock_retry_interval,
            )
            .await
        {
            Ok(Some(token)) => Ok(token),
            Ok(None) => Err(ExecutionError::lock_contention(session_id)),
            Err(err) => Err(ExecutionError::backend(err)),
        }
    }

    async fn release(&self, session_id: &str, token: &LockToken) {
        match self.lock.release(session_id, token).await {
            Ok(true) => {}
            Ok(false) => warn!(
                session_id,
                "session lock expired before release; another caller may have run concurrently"
            ),
            Err(err) => warn!(session_id, error = %err, "failed to release session lock"),
        }
    }

    /// Decoded session state, if the session exists.
    pub async fn session_state(&self, session_id: &str) -> Result<Option<SessionState>, ExecutionError> {
        Ok(self
            .store
            .get(session_id)
            .await?
            .map(|value| SessionState::decode_or_default(session_id, value)))
    }

    pub async fn session_record(&self, session_id: &str) -> Result<Option<SessionRecord>, ExecutionError> {
        Ok(self.store.get_record(session_id).await?)
    }

    pub async fn session_history(
        &self,
        session_id: &str,
    ) -> Result<Option<Vec<ExecutionRecord>>, ExecutionError> {
        Ok(self
            .session_state(session_id)
            .await?
            .map(|state| state.machine.history))
    }

    pub async fn session_ttl(&self, session_id: &str) -> Result<Option<Duration>, ExecutionError> {
        Ok(self.store.get_ttl(session_id).await?)
    }

    /// Return the session to `idle`, dropping its history and tool state.
    /// Returns false when the session does not exist.
    pub async fn reset_session(&self, session_id: &str) -> Result<bool, ExecutionError> {
        let token = self.lock_session(session_id).await?;
        let outcome = self.reset_locked(session_id).await;
        self.release(session_id, &token).await;
        outcome
    }

    async fn reset_locked(&self, session_id: &str) -> Result<bool, ExecutionError> {
        let Some(value) = self.store.get(session_id).await? else {
            return Ok(false);
        };
        let mut state = SessionState::decode_or_default(session_id, value);
        recover_stale(session_id, &mut state);
        if state.machine.state.accepts(machine::EventKind::Reset) {
            state.machine = machine::apply(&state.machine, MachineEvent::Reset)
                .map_err(|err| ExecutionError::validation(err.to_string()))?;
        }
        state.tool_states.clear();
        self.persist(session_id, &state).await?;
        debug!(session_id, "session reset");
        Ok(true)
    }

    /// Delete the session. Returns false when it did not exist.
    pub async fn clear_session(&self, session_id: &str) -> Result<bool, ExecutionError> {
        let token = self.lock_session(session_id).await?;
        let outcome = self.store.clear(session_id).await.map_err(ExecutionError::from);
        self.release(session_id, &token).await;
        outcome
    }

    pub async fn list_sessions(&self) -> Result<Vec<String>, ExecutionError> {
        Ok(self.store.list().await?)
    }

    /// Reset the session TTL to `seconds` from now. Later calls keep the
    /// longer of this and the configured TTL. Returns false when absent.
    pub async fn extend_session(&self, session_id: &str, seconds: u64) -> Result<bool, ExecutionError> {
        if seconds == 0 {
            return Err(ExecutionError::validation("ttl extension must be positive"));
        }
        let token = self.lock_session(session_id).await?;
        let outcome = self
            .store
            .extend_ttl(session_id, seconds)
            .await
            .map_err(ExecutionError::from);
        self.release(session_id, &token).await;
        outcome
    }

    /// Drop every cached result of one tool. Returns 0 when caching is off.
    pub async fn invalidate_tool_cache(&self, tool_id: &str) -> usize {
        match &self.cache {
            Some(cache) => cache.invalidate_namespace(tool_id).await,
            None => 0,
        }
    }

    pub async fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear().await;
        }
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }
}

/// A session persisted mid-execution belongs to a holder that died or lost
/// its lock. Move it to `cancelled` so the machine accepts a new call.
fn recover_stale(session_id: &str, state: &mut SessionState) -> bool {
    if state.machine.state != MachineState::Executing {
        return false;
    }
    warn!(
        session_id,
        tool = state.machine.tool_name.as_deref().unwrap_or(""),
        "session was left executing by a previous holder; marking it cancelled"
    );
    match machine::apply(&state.machine, MachineEvent::Cancel) {
        Ok(next) => {
            state.machine = next;
            true
        }
        Err(_) => false,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
