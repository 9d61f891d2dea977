//! Durable session state keyed by opaque session ids.

mod store;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use toolkeep_commons::ErrorCategory;

use crate::backend::BackendError;

pub use store::{KvSessionStore, MemorySessionStore, RedisSessionStore};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("failed to encode session state: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub const fn category(&self) -> ErrorCategory {
        match self {
            StoreError::Backend(_) => ErrorCategory::BackendUnavailable,
            StoreError::Serialization(_) => ErrorCategory::Serialization,
        }
    }
}

/// Persisted form of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub state: Value,
    pub ttl_secs: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Key/value contract for session state with expiry.
///
/// The store does not serialize writers. Callers that read-modify-write a
/// session must hold its [`DistributedLock`](crate::DistributedLock).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> StoreResult<Option<Value>>;

    /// Full record including timestamps.
    async fn get_record(&self, id: &str) -> StoreResult<Option<SessionRecord>>;

    /// Store `state` with a lifetime of at least `ttl`. A session whose
    /// recorded lifetime is longer (see [`SessionStore::extend_ttl`]) keeps it.
    async fn set(&self, id: &str, state: Value, ttl: Duration) -> StoreResult<()>;

    async fn clear(&self, id: &str) -> StoreResult<bool>;

    /// Ids of live sessions, sorted.
    async fn list(&self) -> StoreResult<Vec<String>>;

    /// Return the existing state, or store `initial` and return it.
    async fn create_if_absent(&self, id: &str, initial: Value, ttl: Duration)
    -> StoreResult<Value>;

    /// Remaining lifetime; `None` when the session is absent or never expires.
    async fn get_ttl(&self, id: &str) -> StoreResult<Option<Duration>>;

    /// Reset the lifetime to `seconds` from now and record it as the
    /// session's own lifetime. Returns false when absent.
    async fn extend_ttl(&self, id: &str, seconds: u64) -> StoreResult<bool>;
}
