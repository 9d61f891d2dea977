//! Shared-backend behavior against a live Redis.
//!
//! Run with `TOOLKEEP_TEST_REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored`.

mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use toolkeep_core::{
    DistributedLock, ExecutionRequest, ExecutionService, KeySpace, KvBackend, RedisBackend,
    TtlStatus,
};

use support::{config, registry};

async fn connect() -> Option<Arc<RedisBackend>> {
    let url = std::env::var("TOOLKEEP_TEST_REDIS_URL").ok()?;
    let backend = RedisBackend::connect(&url, Duration::from_secs(2))
        .await
        .expect("connect to test redis");
    Some(Arc::new(backend))
}

fn isolated_keys() -> KeySpace {
    KeySpace::new(format!("toolkeep-test-{}", uuid::Uuid::new_v4().simple()))
}

#[tokio::test]
#[ignore = "requires TOOLKEEP_TEST_REDIS_URL"]
async fn primitives_round_trip() {
    let Some(backend) = connect().await else {
        return;
    };
    let keys = isolated_keys();
    let key = keys.session("s1");

    backend.ping().await.unwrap();
    assert!(backend.set_if_absent(&key, "a".into(), Some(Duration::from_secs(5))).await.unwrap());
    assert!(!backend.set_if_absent(&key, "b".into(), None).await.unwrap());
    assert_eq!(backend.get(&key).await.unwrap().as_deref(), Some("a"));
    assert!(matches!(backend.ttl(&key).await.unwrap(), TtlStatus::Expires(_)));

    assert!(!backend.compare_and_delete(&key, "b").await.unwrap());
    assert!(backend.compare_and_delete(&key, "a").await.unwrap());
    assert_eq!(backend.ttl(&key).await.unwrap(), TtlStatus::Missing);

    let entries = (0..3)
        .map(|n| (keys.session(&format!("batch-{n}")), n.to_string()))
        .collect::<Vec<_>>();
    let names = entries.iter().map(|(key, _)| key.clone()).collect::<Vec<_>>();
    backend.set_many(entries, Some(Duration::from_secs(5))).await.unwrap();
    assert_eq!(
        backend.get_many(&names).await.unwrap(),
        vec![Some("0".into()), Some("1".into()), Some("2".into())]
    );
    assert_eq!(backend.scan_prefix(&keys.session_prefix()).await.unwrap().len(), 3);
    assert_eq!(backend.delete_prefix(&keys.session_prefix()).await.unwrap(), 3);
}

#[tokio::test]
#[ignore = "requires TOOLKEEP_TEST_REDIS_URL"]
async fn lock_is_exclusive_across_clients() {
    let Some(first) = connect().await else {
        return;
    };
    let Some(second) = connect().await else {
        return;
    };
    let keys = isolated_keys();
    let a = DistributedLock::new(first, keys.clone());
    let b = DistributedLock::new(second, keys);
    let ttl = Duration::from_millis(200);

    let token = a.acquire("s", ttl).await.unwrap().expect("first holder");
    assert!(b.acquire("s", ttl).await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let taken = b.acquire("s", ttl).await.unwrap().expect("lock expired");
    assert!(!a.release("s", &token).await.unwrap());
    assert!(b.release("s", &taken).await.unwrap());
}

#[tokio::test]
#[ignore = "requires TOOLKEEP_TEST_REDIS_URL"]
async fn sessions_are_shared_between_services() {
    let Some(backend) = connect().await else {
        return;
    };
    let mut config = config();
    config.backend.key_prefix = format!("toolkeep-test-{}", uuid::Uuid::new_v4().simple());
    config.lock.wait_ms = 2_000;
    config.lock.retry_interval_ms = 10;

    let shared: Arc<dyn KvBackend> = backend;
    let left = ExecutionService::new(Arc::clone(&shared), registry().1, &config);
    let right = ExecutionService::new(Arc::clone(&shared), registry().1, &config);

    let (a, b) = tokio::join!(
        left.execute_tool(ExecutionRequest::new("slow", json!({"n": 1})).in_session("shared")),
        right.execute_tool(ExecutionRequest::new("slow", json!({"n": 2})).in_session("shared")),
    );
    assert!(a.is_success() && b.is_success());

    let history = left.session_history("shared").await.unwrap().unwrap();
    assert_eq!(history.len(), 2);
    assert!(right.clear_session("shared").await.unwrap());
    shared.delete_prefix(&config.backend.key_prefix).await.unwrap();
}
