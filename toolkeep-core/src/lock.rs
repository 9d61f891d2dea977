//! Per-session mutual exclusion on top of a [`KvBackend`].
//!
//! A lock is a marker key `{prefix}:lock:{session}` holding a random token,
//! created with SET-if-absent and an expiry. Release deletes the marker only
//! if it still holds the caller's token, so a holder whose lock expired can
//! never release the lock of the next holder.
//!
//! There is no fencing token: a holder that outlives its expiry keeps
//! running unprotected while a new holder proceeds.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::backend::{BackendResult, KeySpace, KvBackend};

/// Proof of lock ownership returned by [`DistributedLock::acquire`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LockToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug)]
pub struct DistributedLock<B: KvBackend + ?Sized = dyn KvBackend> {
    backend: Arc<B>,
    keys: KeySpace,
}

impl<B: KvBackend + ?Sized> Clone for DistributedLock<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            keys: self.keys.clone(),
        }
    }
}

impl<B: KvBackend + ?Sized> DistributedLock<B> {
    pub fn new(backend: Arc<B>, keys: KeySpace) -> Self {
        Self { backend, keys }
    }

    /// Single attempt. Returns `None` immediately when another holder owns
    /// the lock; the marker expires after `ttl`.
    pub async fn acquire(&self, session_id: &str, ttl: Duration) -> BackendResult<Option<LockToken>> {
        let token = LockToken::generate();
        let acquired = self
            .backend
            .set_if_absent(&self.keys.lock(session_id), token.0.clone(), Some(ttl))
            .await?;
        if acquired {
            trace!(session_id, "lock acquired");
            Ok(Some(token))
        } else {
            debug!(session_id, "lock held by another caller");
            Ok(None)
        }
    }

    /// Retry [`DistributedLock::acquire`] every `retry_interval` until `wait`
    /// has elapsed. A zero `wait` makes exactly one attempt.
    pub async fn acquire_within(
        &self,
        session_id: &str,
        ttl: Duration,
        wait: Duration,
        retry_interval: Duration,
    ) -> BackendResult<Option<LockToken>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(token) = self.acquire(session_id, ttl).await? {
                return Ok(Some(token));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(retry_interval.min(deadline - now)).await;
        }
    }

    /// Release the lock if `token` still owns it. Returns false when the
    /// lock expired or belongs to someone else; the marker is left intact.
    pub async fn release(&self, session_id: &str, token: &LockToken) -> BackendResult<bool> {
        let released = self
            .backend
            .compare_and_delete(&self.keys.lock(session_id), token.as_str())
            .await?;
        trace!(session_id, released, "lock release");
        Ok(released)
    }

    /// Whether any holder currently owns the lock.
    pub async fn is_locked(&self, session_id: &str) -> BackendResult<bool> {
        Ok(self.backend.get(&self.keys.lock(session_id)).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn lock() -> DistributedLock<MemoryBackend> {
        DistributedLock::new(Arc::new(MemoryBackend::new()), KeySpace::new("test"))
    }

    #[tokio::test]
    async fn second_acquire_fails_until_expiry() {
        let lock = lock();
        let ttl = Duration::from_millis(50);

        let first = lock.acquire("s", ttl).await.unwrap();
        assert!(first.is_some());
        assert!(lock.acquire("s", ttl).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(lock.acquire("s", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn release_with_wrong_token_keeps_marker() {
        let lock = lock();
        let token = lock
            .acquire("s", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        let stranger = LockToken::from("not-the-token".to_string());
        assert!(!lock.release("s", &stranger).await.unwrap());
        assert!(lock.is_locked("s").await.unwrap());

        assert!(lock.release("s", &token).await.unwrap());
        assert!(!lock.is_locked("s").await.unwrap());
    }

    #[tokio::test]
    async fn expired_holder_cannot_release_new_holder() {
        let lock = lock();
        let stale = lock
            .acquire("s", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let current = lock
            .acquire("s", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert!(!lock.release("s", &stale).await.unwrap());
        assert!(lock.release("s", &current).await.unwrap());
    }

    #[tokio::test]
    async fn locks_are_per_session() {
        let lock = lock();
        let ttl = Duration::from_secs(5);
        assert!(lock.acquire("a", ttl).await.unwrap().is_some());
        assert!(lock.acquire("b", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn acquire_within_waits_for_release() {
        let lock = Arc::new(lock());
        let token = lock
            .acquire("s", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        let releaser = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                lock.release("s", &token).await.unwrap()
            })
        };

        let acquired = lock
            .acquire_within(
                "s",
                Duration::from_secs(5),
                Duration::from_secs(2),
                Duration::from_millis(5),
            )
            .await
            .unwrap();
        assert!(acquired.is_some());
        assert!(releaser.await.unwrap());
    }

    #[tokio::test]
    async fn acquire_within_zero_wait_is_single_attempt() {
        let lock = lock();
        let ttl = Duration::from_secs(5);
        lock.acquire("s", ttl).await.unwrap();

        let started = Instant::now();
        let second = lock
            .acquire_within("s", ttl, Duration::ZERO, Duration::from_millis(25))
            .await
            .unwrap();
        assert!(second.is_none());
        assert!(started.elapsed() < Duration::from_millis(25));
    }
}
