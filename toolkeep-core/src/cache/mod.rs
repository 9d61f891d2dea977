//! Two-level cache for tool results.
//!
//! The fast tier is a bounded in-process map; the slow tier is the shared
//! backend. Reads go fast → slow and repopulate the fast tier on a slow hit.
//! Writes go to both. Slow-tier failures are logged and swallowed: the
//! cache only ever degrades to a miss, it never fails the caller.
//!
//! The fast tier may be stale relative to the slow tier when another process
//! rewrites an entry; staleness is bounded by the entry TTL.

mod fast_tier;
mod fingerprint;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{KeySpace, KvBackend};
use fast_tier::{FastTier, Lookup};

pub use fingerprint::{CacheKey, canonical_json, fingerprint};

/// Namespace used when the caller does not supply one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub fast_hits: u64,
    pub slow_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub slow_write_failures: u64,
    pub evictions: u64,
    pub fast_entries: usize,
    pub fast_capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.fast_hits + self.slow_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    fast_hits: AtomicU64,
    slow_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    slow_write_failures: AtomicU64,
    evictions: AtomicU64,
}

impl CacheCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Slow-tier payload.
#[derive(Debug, Serialize)]
struct SlowEntryRef<'a> {
    value: &'a Value,
    written_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SlowEntry {
    value: Value,
    #[serde(default)]
    expires_at_ms: Option<i64>,
}

impl SlowEntry {
    /// Remaining lifetime, `Some(None)` for no expiry and `None` when expired.
    fn remaining(&self, now_ms: i64) -> Option<Option<Duration>> {
        match self.expires_at_ms {
            None => Some(None),
            Some(at) if at > now_ms => Some(Some(Duration::from_millis(
                u64::try_from(at - now_ms).unwrap_or(0),
            ))),
            Some(_) => None,
        }
    }
}

fn ttl_to_ms(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[derive(Debug)]
pub struct TieredCache<B: KvBackend + ?Sized = dyn KvBackend> {
    fast: FastTier,
    backend: Arc<B>,
    keys: KeySpace,
    default_ttl: Option<Duration>,
    counters: CacheCounters,
}

impl<B: KvBackend + ?Sized> TieredCache<B> {
    pub fn new(
        backend: Arc<B>,
        keys: KeySpace,
        fast_capacity: usize,
        default_ttl: Option<Duration>,
    ) -> Self {
        Self {
            fast: FastTier::new(fast_capacity),
            backend,
            keys,
            default_ttl,
            counters: CacheCounters::default(),
        }
    }

    fn storage_key(&self, key: &str, namespace: Option<&str>) -> String {
        self.keys
            .cache(namespace.unwrap_or(DEFAULT_NAMESPACE), &fingerprint(key))
    }

    fn fast_lookup(&self, storage_key: &str) -> Option<Value> {
        match self.fast.get(storage_key) {
            Lookup::Hit(value) => {
                CacheCounters::bump(&self.counters.fast_hits, 1);
                debug!(key = storage_key, tier = "fast", "cache hit");
                Some((*value).clone())
            }
            Lookup::Expired | Lookup::Miss => None,
        }
    }

    /// Decode a slow-tier payload and repopulate the fast tier on success.
    fn accept_slow(&self, storage_key: &str, raw: &str) -> Option<Value> {
        let entry = match serde_json::from_str::<SlowEntry>(raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key = storage_key, error = %err, "ignoring undecodable cache entry");
                CacheCounters::bump(&self.counters.misses, 1);
                return None;
            }
        };

        let Some(remaining) = entry.remaining(Utc::now().timestamp_millis()) else {
            CacheCounters::bump(&self.counters.misses, 1);
            return None;
        };

        let value = Arc::new(entry.value);
        let evicted = self.fast.insert(
            storage_key.to_string(),
            Arc::clone(&value),
            remaining.map(|ttl| Instant::now() + ttl),
        );
        CacheCounters::bump(&self.counters.evictions, evicted);
        CacheCounters::bump(&self.counters.slow_hits, 1);
        debug!(key = storage_key, tier = "slow", "cache hit");
        Some((*value).clone())
    }

    fn encode_slow(value: &Value, ttl: Option<Duration>) -> serde_json::Result<String> {
        let now_ms = Utc::now().timestamp_millis();
        serde_json::to_string(&SlowEntryRef {
            value,
            written_at_ms: now_ms,
            expires_at_ms: ttl.map(|ttl| now_ms.saturating_add(ttl_to_ms(ttl))),
        })
    }

    pub async fn get(&self, key: &str, namespace: Option<&str>) -> Option<Value> {
        let storage_key = self.storage_key(key, namespace);
        if let Some(value) = self.fast_lookup(&storage_key) {
            return Some(value);
        }

        match self.backend.get(&storage_key).await {
            Ok(Some(raw)) => self.accept_slow(&storage_key, &raw),
            Ok(None) => {
                CacheCounters::bump(&self.counters.misses, 1);
                debug!(key = %storage_key, "cache miss");
                None
            }
            Err(err) => {
                warn!(key = %storage_key, error = %err, "cache slow tier read failed");
                CacheCounters::bump(&self.counters.misses, 1);
                None
            }
        }
    }

    /// Write-through to both tiers. `ttl` falls back to the configured default.
    pub async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        namespace: Option<&str>,
    ) {
        let ttl = ttl.or(self.default_ttl);
        let storage_key = self.storage_key(key, namespace);
        let value = Arc::new(value);

        let evicted = self.fast.insert(
            storage_key.clone(),
            Arc::clone(&value),
            ttl.map(|ttl| Instant::now() + ttl),
        );
        CacheCounters::bump(&self.counters.evictions, evicted);
        CacheCounters::bump(&self.counters.writes, 1);

        let raw = match Self::encode_slow(&value, ttl) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key = %storage_key, error = %err, "failed to encode cache entry");
                CacheCounters::bump(&self.counters.slow_write_failures, 1);
                return;
            }
        };
        if let Err(err) = self.backend.set(&storage_key, raw, ttl).await {
            warn!(key = %storage_key, error = %err, "cache slow tier write failed");
            CacheCounters::bump(&self.counters.slow_write_failures, 1);
        }
    }

    /// Batch read; one pipelined slow-tier round trip for all fast-tier misses.
    pub async fn get_many(&self, keys: &[&str], namespace: Option<&str>) -> Vec<Option<Value>> {
        let storage_keys: Vec<String> = keys
            .iter()
            .map(|key| self.storage_key(key, namespace))
            .collect();
        let mut results: Vec<Option<Value>> = storage_keys
            .iter()
            .map(|storage_key| self.fast_lookup(storage_key))
            .collect();

        let missing: Vec<(usize, String)> = results
            .iter()
            .zip(&storage_keys)
            .enumerate()
            .filter(|(_, (hit, _))| hit.is_none())
            .map(|(index, (_, key))| (index, key.clone()))
            .collect();
        if missing.is_empty() {
            return results;
        }

        let lookup: Vec<String> = missing.iter().map(|(_, key)| key.clone()).collect();
        match self.backend.get_many(&lookup).await {
            Ok(raws) => {
                for ((index, storage_key), raw) in missing.into_iter().zip(raws) {
                    let value = match raw {
                        Some(raw) => self.accept_slow(&storage_key, &raw),
                        None => {
                            CacheCounters::bump(&self.counters.misses, 1);
                            None
                        }
                    };
                    if let Some(slot) = results.get_mut(index) {
                        *slot = value;
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, keys = lookup.len(), "cache slow tier batch read failed");
                CacheCounters::bump(&self.counters.misses, lookup.len() as u64);
            }
        }
        results
    }

    /// Batch write; one pipelined slow-tier round trip.
    pub async fn set_many(
        &self,
        entries: Vec<(String, Value)>,
        ttl: Option<Duration>,
        namespace: Option<&str>,
    ) {
        let ttl = ttl.or(self.default_ttl);
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut slow_entries = Vec::with_capacity(entries.len());

        for (key, value) in entries {
            let storage_key = self.storage_key(&key, namespace);
            let value = Arc::new(value);
            let evicted = self
                .fast
                .insert(storage_key.clone(), Arc::clone(&value), expires_at);
            CacheCounters::bump(&self.counters.evictions, evicted);
            CacheCounters::bump(&self.counters.writes, 1);

            match Self::encode_slow(&value, ttl) {
                Ok(raw) => slow_entries.push((storage_key, raw)),
                Err(err) => {
                    warn!(key = %storage_key, error = %err, "failed to encode cache entry");
                    CacheCounters::bump(&self.counters.slow_write_failures, 1);
                }
            }
        }

        let count = slow_entries.len() as u64;
        if count == 0 {
            return;
        }
        if let Err(err) = self.backend.set_many(slow_entries, ttl).await {
            warn!(error = %err, entries = count, "cache slow tier batch write failed");
            CacheCounters::bump(&self.counters.slow_write_failures, count);
        }
    }

    pub async fn delete(&self, key: &str, namespace: Option<&str>) -> bool {
        let storage_key = self.storage_key(key, namespace);
        let in_fast = self.fast.remove(&storage_key);
        match self.backend.delete(&storage_key).await {
            Ok(in_slow) => in_fast || in_slow,
            Err(err) => {
                warn!(key = %storage_key, error = %err, "cache slow tier delete failed");
                in_fast
            }
        }
    }

    /// Drop every entry in `namespace` from both tiers. Returns the number of
    /// slow-tier entries removed, or the fast-tier count if the slow tier
    /// could not be reached.
    pub async fn invalidate_namespace(&self, namespace: &str) -> usize {
        let prefix = self.keys.cache_namespace_prefix(namespace);
        let fast_removed = self.fast.remove_prefix(&prefix);
        match self.backend.delete_prefix(&prefix).await {
            Ok(removed) => {
                debug!(namespace, removed, "invalidated cache namespace");
                removed.max(fast_removed)
            }
            Err(err) => {
                warn!(namespace, error = %err, "cache namespace invalidation failed in slow tier");
                fast_removed
            }
        }
    }

    /// Wipe both tiers.
    pub async fn clear(&self) {
        self.fast.clear();
        if let Err(err) = self.backend.delete_prefix(&self.keys.cache_prefix()).await {
            warn!(error = %err, "cache slow tier clear failed");
        }
    }

    /// Wipe only the in-process tier.
    pub fn clear_fast_tier(&self) {
        self.fast.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CacheStats {
            fast_hits: load(&self.counters.fast_hits),
            slow_hits: load(&self.counters.slow_hits),
            misses: load(&self.counters.misses),
            writes: load(&self.counters.writes),
            slow_write_failures: load(&self.counters.slow_write_failures),
            evictions: load(&self.counters.evictions),
            fast_entries: self.fast.len(),
            fast_capacity: self.fast.capacity(),
        }
    }
}

#[cfg(test)]
mod tests;
