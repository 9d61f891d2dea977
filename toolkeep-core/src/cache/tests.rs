use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::backend::{BackendError, BackendKind, BackendResult, MemoryBackend, TtlStatus};

fn cache(capacity: usize) -> (Arc<MemoryBackend>, TieredCache<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let cache = TieredCache::new(
        Arc::clone(&backend),
        KeySpace::new("test"),
        capacity,
        Some(Duration::from_secs(60)),
    );
    (backend, cache)
}

/// Backend whose every call fails, standing in for an unreachable server.
#[derive(Debug)]
struct DownBackend;

fn down<T>() -> BackendResult<T> {
    Err(BackendError::Unavailable("connection refused".into()))
}

#[async_trait]
impl KvBackend for DownBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }
    async fn ping(&self) -> BackendResult<()> {
        down()
    }
    async fn get(&self, _: &str) -> BackendResult<Option<String>> {
        down()
    }
    async fn set(&self, _: &str, _: String, _: Option<Duration>) -> BackendResult<()> {
        down()
    }
    async fn set_if_absent(&self, _: &str, _: String, _: Option<Duration>) -> BackendResult<bool> {
        down()
    }
    async fn delete(&self, _: &str) -> BackendResult<bool> {
        down()
    }
    async fn compare_and_delete(&self, _: &str, _: &str) -> BackendResult<bool> {
        down()
    }
    async fn ttl(&self, _: &str) -> BackendResult<TtlStatus> {
        down()
    }
    async fn expire(&self, _: &str, _: Duration) -> BackendResult<bool> {
        down()
    }
    async fn scan_prefix(&self, _: &str) -> BackendResult<Vec<String>> {
        down()
    }
    async fn delete_prefix(&self, _: &str) -> BackendResult<usize> {
        down()
    }
    async fn get_many(&self, _: &[String]) -> BackendResult<Vec<Option<String>>> {
        down()
    }
    async fn set_many(&self, _: Vec<(String, String)>, _: Option<Duration>) -> BackendResult<()> {
        down()
    }
}

#[tokio::test]
async fn set_then_get_round_trips() {
    let (_, cache) = cache(8);
    cache.set("k", json!({"lines": 3}), None, None).await;
    assert_eq!(cache.get("k", None).await, Some(json!({"lines": 3})));
    assert_eq!(cache.stats().fast_hits, 1);
}

#[tokio::test]
async fn entry_disappears_after_ttl() {
    let (_, cache) = cache(8);
    cache
        .set("k", json!(1), Some(Duration::from_millis(30)), None)
        .await;
    assert_eq!(cache.get("k", None).await, Some(json!(1)));

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.get("k", None).await, None);
}

#[tokio::test]
async fn slow_tier_repopulates_cleared_fast_tier() {
    let (_, cache) = cache(8);
    cache.set("k", json!("v"), None, Some("metrics")).await;
    cache.clear_fast_tier();
    assert_eq!(cache.stats().fast_entries, 0);

    assert_eq!(cache.get("k", Some("metrics")).await, Some(json!("v")));
    assert_eq!(cache.stats().slow_hits, 1);
    assert_eq!(cache.stats().fast_entries, 1);

    assert_eq!(cache.get("k", Some("metrics")).await, Some(json!("v")));
    assert_eq!(cache.stats().fast_hits, 1);
}

#[tokio::test]
async fn namespaces_are_isolated() {
    let (_, cache) = cache(8);
    cache.set("k", json!(1), None, Some("a")).await;
    cache.set("k", json!(2), None, Some("b")).await;

    assert_eq!(cache.get("k", Some("a")).await, Some(json!(1)));
    assert_eq!(cache.get("k", Some("b")).await, Some(json!(2)));

    assert_eq!(cache.invalidate_namespace("a").await, 1);
    assert_eq!(cache.get("k", Some("a")).await, None);
    assert_eq!(cache.get("k", Some("b")).await, Some(json!(2)));
}

#[tokio::test]
async fn invalidating_a_namespace_spares_namespaces_that_extend_it() {
    let (_, cache) = cache(8);
    cache.set("k", json!(1), None, Some("a")).await;
    cache.set("k", json!(2), None, Some("a:b")).await;

    assert_eq!(cache.invalidate_namespace("a").await, 1);
    assert_eq!(cache.get("k", Some("a")).await, None);
    assert_eq!(cache.get("k", Some("a:b")).await, Some(json!(2)));
}

#[tokio::test]
async fn fast_tier_eviction_still_serves_from_slow_tier() {
    let (_, cache) = cache(1);
    cache.set("a", json!(1), None, None).await;
    cache.set("b", json!(2), None, None).await;

    let stats = cache.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.fast_entries, 1);

    assert_eq!(cache.get("a", None).await, Some(json!(1)));
    assert_eq!(cache.stats().slow_hits, 1);
}

#[tokio::test]
async fn batch_operations() {
    let (_, cache) = cache(8);
    cache
        .set_many(
            vec![("a".into(), json!(1)), ("b".into(), json!(2))],
            None,
            Some("ns"),
        )
        .await;
    cache.clear_fast_tier();

    let values = cache.get_many(&["a", "missing", "b"], Some("ns")).await;
    assert_eq!(values, vec![Some(json!(1)), None, Some(json!(2))]);
    assert_eq!(cache.stats().misses, 1);
}

#[tokio::test]
async fn delete_and_clear() {
    let (backend, cache) = cache(8);
    cache.set("a", json!(1), None, None).await;
    cache.set("b", json!(2), None, Some("x")).await;

    assert!(cache.delete("a", None).await);
    assert!(!cache.delete("a", None).await);

    cache.clear().await;
    assert_eq!(cache.get("b", Some("x")).await, None);
    assert_eq!(backend.raw_len(), 0);
}

#[tokio::test]
async fn undecodable_slow_entry_is_a_miss() {
    let (backend, cache) = cache(8);
    let storage_key = KeySpace::new("test").cache(DEFAULT_NAMESPACE, &fingerprint("k"));
    backend.set(&storage_key, "garbage".into(), None).await.unwrap();

    assert_eq!(cache.get("k", None).await, None);
    assert_eq!(cache.stats().misses, 1);
}

#[tokio::test]
async fn unreachable_slow_tier_fails_open() {
    let cache = TieredCache::new(
        Arc::new(DownBackend),
        KeySpace::new("test"),
        8,
        None,
    );

    cache.set("k", json!(42), None, None).await;
    assert_eq!(cache.stats().slow_write_failures, 1);
    assert_eq!(cache.get("k", None).await, Some(json!(42)));

    cache.clear_fast_tier();
    assert_eq!(cache.get("k", None).await, None);
    assert_eq!(cache.get_many(&["k"], None).await, vec![None]);
    assert_eq!(cache.invalidate_namespace(DEFAULT_NAMESPACE).await, 0);
    cache.clear().await;
}

#[test]
fn hit_rate_counts_both_tiers() {
    let stats = CacheStats {
        fast_hits: 2,
        slow_hits: 1,
        misses: 1,
        ..Default::default()
    };
    assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    assert_eq!(CacheStats::default().hit_rate(), 0.0);
}
