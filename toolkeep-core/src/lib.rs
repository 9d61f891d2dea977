//! Stateful tool-execution core for toolkeep.
//!
//! Callers invoke named [`Tool`]s repeatedly against a persistent session.
//! The [`ExecutionService`] serializes work per session with a
//! [`DistributedLock`], drives the [`machine`] through each invocation,
//! consults the [`TieredCache`] before running a tool, and persists the
//! updated session through a [`SessionStore`].
//!
//! Every storage concern sits on one [`KvBackend`]: an in-process map or a
//! shared Redis instance chosen once at startup by [`select_backend`].

pub mod backend;
pub mod cache;
pub mod exec;
pub mod lock;
pub mod machine;
pub mod session;
pub mod tools;

pub use backend::{
    BackendError, BackendKind, BackendSelection, KeySpace, KvBackend, MemoryBackend,
    RedisBackend, TtlStatus, select_backend,
};
pub use cache::{CacheKey, CacheStats, TieredCache};
pub use exec::{
    ExecutionError, ExecutionOptions, ExecutionRequest, ExecutionResult, ExecutionService,
    ExecutionStatus, SessionState, ToolState,
};
pub use lock::{DistributedLock, LockToken};
pub use machine::{
    EventKind, ExecutionRecord, InvalidTransition, MachineContext, MachineEvent, MachineState,
};
pub use session::{
    KvSessionStore, MemorySessionStore, RedisSessionStore, SessionRecord, SessionStore,
    StoreError,
};
pub use tools::{Tool, ToolError, ToolOutput, ToolRegistry};
