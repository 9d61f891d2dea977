//! Key/value primitives shared by the session store, the lock and the
//! cache slow tier.

mod factory;
mod keys;
mod memory;
mod redis_backend;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use toolkeep_commons::ErrorCategory;

pub use factory::{BackendSelection, select_backend};
pub use keys::KeySpace;
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached (connect, I/O or timeout).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The backend answered but rejected or failed the command.
    #[error("backend command failed: {0}")]
    Command(String),
}

impl BackendError {
    pub const fn category(&self) -> ErrorCategory {
        ErrorCategory::BackendUnavailable
    }
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    Missing,
    Persistent,
    Expires(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Redis,
}

impl BackendKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String key/value store with expiry, conditional create and atomic
/// compare-and-delete.
///
/// Values are opaque strings; callers own their encoding. Every method may
/// fail with [`BackendError`] on a shared backend, and callers must treat
/// that as "unavailable", never as "absent".
#[async_trait]
pub trait KvBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Lightweight connectivity check.
    async fn ping(&self) -> BackendResult<()>;

    async fn get(&self, key: &str) -> BackendResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> BackendResult<()>;

    /// Create `key` only when it does not exist. Returns whether it was written.
    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> BackendResult<bool>;

    async fn delete(&self, key: &str) -> BackendResult<bool>;

    /// Delete `key` only if its current value equals `expected`, atomically.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> BackendResult<bool>;

    async fn ttl(&self, key: &str) -> BackendResult<TtlStatus>;

    /// Reset the expiry of an existing key. Returns false when the key is missing.
    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<bool>;

    /// Live keys starting with `prefix`, in no particular order.
    async fn scan_prefix(&self, prefix: &str) -> BackendResult<Vec<String>>;

    async fn delete_prefix(&self, prefix: &str) -> BackendResult<usize>;

    /// Values for `keys`, positionally aligned.
    async fn get_many(&self, keys: &[String]) -> BackendResult<Vec<Option<String>>>;

    async fn set_many(
        &self,
        entries: Vec<(String, String)>,
        ttl: Option<Duration>,
    ) -> BackendResult<()>;
}
