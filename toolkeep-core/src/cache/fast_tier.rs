//! Bounded in-process tier of the [`TieredCache`](super::TieredCache).
//!
//! Eviction drops the globally oldest *written* entry once the tier is over
//! capacity. Reads do not refresh an entry's position.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;

#[derive(Debug, Clone)]
struct FastEntry {
    value: Arc<Value>,
    written_seq: u64,
    expires_at: Option<Instant>,
}

impl FastEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

pub(super) enum Lookup {
    Hit(Arc<Value>),
    Expired,
    Miss,
}

#[derive(Debug, Default)]
struct FastTierInner {
    entries: FxHashMap<String, FastEntry>,
    next_seq: u64,
}

#[derive(Debug)]
pub(super) struct FastTier {
    inner: RwLock<FastTierInner>,
    capacity: usize,
}

impl FastTier {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(FastTierInner {
                entries: FxHashMap::with_capacity_and_hasher(capacity.min(4096), Default::default()),
                next_seq: 0,
            }),
            capacity,
        }
    }

    pub(super) fn get(&self, key: &str) -> Lookup {
        let now = Instant::now();
        let state = {
            let inner = self.inner.read();
            match inner.entries.get(key) {
                Some(entry) if !entry.is_expired(now) => Lookup::Hit(Arc::clone(&entry.value)),
                Some(_) => Lookup::Expired,
                None => Lookup::Miss,
            }
        };

        if matches!(state, Lookup::Expired) {
            let mut inner = self.inner.write();
            if inner
                .entries
                .get(key)
                .is_some_and(|entry| entry.is_expired(now))
            {
                inner.entries.remove(key);
            }
        }
        state
    }

    /// Insert or overwrite `key`. Returns how many entries were evicted.
    pub(super) fn insert(&self, key: String, value: Arc<Value>, expires_at: Option<Instant>) -> u64 {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let written_seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key,
            FastEntry {
                value,
                written_seq,
                expires_at,
            },
        );

        let mut evicted = 0;
        if inner.entries.len() > self.capacity {
            inner.entries.retain(|_, entry| !entry.is_expired(now));
        }
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.written_seq)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            inner.entries.remove(&oldest);
            evicted += 1;
        }
        evicted
    }

    pub(super) fn remove(&self, key: &str) -> bool {
        self.inner.write().entries.remove(key).is_some()
    }

    pub(super) fn remove_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key.starts_with(prefix));
        before - inner.entries.len()
    }

    pub(super) fn clear(&self) {
        self.inner.write().entries.clear();
    }

    pub(super) fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }
}
