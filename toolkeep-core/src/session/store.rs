use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use super::{SessionRecord, SessionStore, StoreResult};
use crate::backend::{KeySpace, KvBackend, MemoryBackend, RedisBackend, TtlStatus};

/// Session store over any [`KvBackend`].
///
/// Records are JSON under `{prefix}:session:{id}` with the backend expiry
/// set to the session TTL. Records that fail to decode are logged and
/// reported as absent.
#[derive(Debug)]
pub struct KvSessionStore<B: KvBackend + ?Sized = dyn KvBackend> {
    backend: Arc<B>,
    keys: KeySpace,
}

/// In-process session store.
pub type MemorySessionStore = KvSessionStore<MemoryBackend>;
/// Session store shared through Redis.
pub type RedisSessionStore = KvSessionStore<RedisBackend>;

impl<B: KvBackend + ?Sized> Clone for KvSessionStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            keys: self.keys.clone(),
        }
    }
}

impl<B: KvBackend + ?Sized> KvSessionStore<B> {
    pub fn new(backend: Arc<B>, keys: KeySpace) -> Self {
        Self { backend, keys }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    fn decode(id: &str, raw: &str) -> Option<SessionRecord> {
        match serde_json::from_str::<SessionRecord>(raw) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(
                    session_id = id,
                    error = %err,
                    "discarding undecodable session record"
                );
                None
            }
        }
    }

    async fn read_record(&self, id: &str) -> StoreResult<Option<SessionRecord>> {
        let raw = self.backend.get(&self.keys.session(id)).await?;
        Ok(raw.and_then(|raw| Self::decode(id, &raw)))
    }

    fn encode(record: &SessionRecord) -> StoreResult<String> {
        Ok(serde_json::to_string(record)?)
    }

    fn fresh_record(id: &str, state: Value, ttl: Duration) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            id: id.to_string(),
            state,
            ttl_secs: ttl.as_secs(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl<B: KvBackend + ?Sized> SessionStore for KvSessionStore<B> {
    async fn get(&self, id: &str) -> StoreResult<Option<Value>> {
        Ok(self.read_record(id).await?.map(|record| record.state))
    }

    async fn get_record(&self, id: &str) -> StoreResult<Option<SessionRecord>> {
        self.read_record(id).await
    }

    async fn set(&self, id: &str, state: Value, ttl: Duration) -> StoreResult<()> {
        let (record, ttl) = match self.read_record(id).await? {
            Some(existing) => {
                // An extended session keeps its longer lifetime.
                let ttl = ttl.max(Duration::from_secs(existing.ttl_secs));
                let record = SessionRecord {
                    state,
                    ttl_secs: ttl.as_secs(),
                    updated_at: Utc::now(),
                    ..existing
                };
                (record, ttl)
            }
            None => (Self::fresh_record(id, state, ttl), ttl),
        };
        let raw = Self::encode(&record)?;
        self.backend
            .set(&self.keys.session(id), raw, Some(ttl))
            .await?;
        Ok(())
    }

    async fn clear(&self, id: &str) -> StoreResult<bool> {
        Ok(self.backend.delete(&self.keys.session(id)).await?)
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let prefix = self.keys.session_prefix();
        let mut ids: Vec<String> = self
            .backend
            .scan_prefix(&prefix)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn create_if_absent(
        &self,
        id: &str,
        initial: Value,
        ttl: Duration,
    ) -> StoreResult<Value> {
        if let Some(existing) = self.read_record(id).await? {
            return Ok(existing.state);
        }

        let key = self.keys.session(id);
        let record = Self::fresh_record(id, initial, ttl);
        let raw = Self::encode(&record)?;
        if self
            .backend
            .set_if_absent(&key, raw.clone(), Some(ttl))
            .await?
        {
            debug!(session_id = id, "created session");
            return Ok(record.state);
        }

        // Lost a creation race, or the stored record is undecodable.
        if let Some(existing) = self.read_record(id).await? {
            return Ok(existing.state);
        }
        self.backend.set(&key, raw, Some(ttl)).await?;
        Ok(record.state)
    }

    async fn get_ttl(&self, id: &str) -> StoreResult<Option<Duration>> {
        Ok(match self.backend.ttl(&self.keys.session(id)).await? {
            TtlStatus::Expires(remaining) => Some(remaining),
            TtlStatus::Missing | TtlStatus::Persistent => None,
        })
    }

    async fn extend_ttl(&self, id: &str, seconds: u64) -> StoreResult<bool> {
        let key = self.keys.session(id);
        let ttl = Duration::from_secs(seconds);
        let Some(existing) = self.read_record(id).await? else {
            return Ok(self.backend.expire(&key, ttl).await?);
        };
        let record = SessionRecord {
            ttl_secs: seconds,
            updated_at: Utc::now(),
            ..existing
        };
        self.backend.set(&key, Self::encode(&record)?, Some(ttl)).await?;
        Ok(true)
    }
}
