use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{BackendKind, BackendResult, KvBackend, TtlStatus};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(value: String, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| now + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process backend: a concurrent map with per-entry expiry.
///
/// Expired entries are dropped lazily on access and periodically by
/// [`MemoryBackend::spawn_sweeper`]. Never shared across processes.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<FxHashMap<String, MemoryEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, including ones that expired but were not
    /// swept yet.
    pub fn raw_len(&self) -> usize {
        self.entries.read().len()
    }

    /// Run [`MemoryBackend::sweep_expired`] every `interval` until the
    /// backend is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(backend) = weak.upgrade() else {
                    break;
                };
                let removed = backend.sweep_expired();
                if removed > 0 {
                    debug!(removed, "swept expired in-process entries");
                }
            }
        })
    }

    fn live_value(&self, key: &str, now: Instant) -> Option<String> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        None
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn ping(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        Ok(self.live_value(key, Instant::now()))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> BackendResult<()> {
        let entry = MemoryEntry::new(value, ttl, Instant::now());
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> BackendResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| !entry.is_expired(now)) {
            return Ok(false);
        }
        entries.insert(key.to_string(), MemoryEntry::new(value, ttl, now));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> BackendResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> BackendResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let matches = entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now) && entry.value == expected);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn ttl(&self, key: &str) -> BackendResult<TtlStatus> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match entry.expires_at {
                Some(at) => TtlStatus::Expires(at.saturating_duration_since(now)),
                None => TtlStatus::Persistent,
            },
            _ => TtlStatus::Missing,
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> BackendResult<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> BackendResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let mut removed = 0;
        entries.retain(|key, entry| {
            if key.starts_with(prefix) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn get_many(&self, keys: &[String]) -> BackendResult<Vec<Option<String>>> {
        let now = Instant::now();
        Ok(keys.iter().map(|key| self.live_value(key, now)).collect())
    }

    async fn set_many(
        &self,
        entries: Vec<(String, String)>,
        ttl: Option<Duration>,
    ) -> BackendResult<()> {
        let now = Instant::now();
        let mut map = self.entries.write();
        for (key, value) in entries {
            map.insert(key, MemoryEntry::new(value, ttl, now));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let backend = MemoryBackend::new();
        backend
            .set("k", "v".into(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert_eq!(backend.ttl("k").await.unwrap(), TtlStatus::Missing);
        assert!(backend.scan_prefix("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_if_absent_respects_live_entries() {
        let backend = MemoryBackend::new();
        assert!(backend.set_if_absent("k", "a".into(), None).await.unwrap());
        assert!(!backend.set_if_absent("k", "b".into(), None).await.unwrap());
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn set_if_absent_replaces_expired_entries() {
        let backend = MemoryBackend::new();
        backend
            .set("k", "old".into(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(backend.set_if_absent("k", "new".into(), None).await.unwrap());
        assert_eq!(backend.ttl("k").await.unwrap(), TtlStatus::Persistent);
    }

    #[tokio::test]
    async fn compare_and_delete_requires_matching_value() {
        let backend = MemoryBackend::new();
        backend.set("lock", "token-a".into(), None).await.unwrap();

        assert!(!backend.compare_and_delete("lock", "token-b").await.unwrap());
        assert!(backend.get("lock").await.unwrap().is_some());
        assert!(backend.compare_and_delete("lock", "token-a").await.unwrap());
        assert!(backend.get("lock").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expire_extends_live_keys_only() {
        let backend = MemoryBackend::new();
        backend
            .set("k", "v".into(), Some(Duration::from_millis(30)))
            .await
            .unwrap();
        assert!(backend.expire("k", Duration::from_secs(60)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(backend.get("k").await.unwrap().is_some());
        assert!(!backend.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn prefix_operations() {
        let backend = MemoryBackend::new();
        backend
            .set_many(
                vec![
                    ("a:1".into(), "1".into()),
                    ("a:2".into(), "2".into()),
                    ("b:1".into(), "3".into()),
                ],
                None,
            )
            .await
            .unwrap();

        let mut keys = backend.scan_prefix("a:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a:1".to_string(), "a:2".to_string()]);

        let values = backend
            .get_many(&["b:1".into(), "zz".into()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("3".to_string()), None]);

        assert_eq!(backend.delete_prefix("a:").await.unwrap(), 2);
        assert_eq!(backend.raw_len(), 1);
    }

    #[tokio::test]
    async fn sweeper_drops_expired_entries() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .set("k", "v".into(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        let handle = backend.spawn_sweeper(Duration::from_millis(15));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(backend.raw_len(), 0);
        handle.abort();
    }
}
