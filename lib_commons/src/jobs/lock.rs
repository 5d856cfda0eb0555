//! # Lock Manager
//!
//! A lock is a plain key (`lock_ns` + job name) holding the owner's token,
//! with a TTL set by the store. Per key the only transitions are
//! ABSENT -> LOCKED (acquire) and LOCKED -> ABSENT (unlock by the owner,
//! TTL expiry, or eviction). A held lock cannot change hands.

use std::time::Duration;

use tracing::{debug, instrument};

use super::{JobError, JobResult};
use crate::store::KvStore;

/// Builds the key that guards `job_name` inside `lock_ns`.
pub fn lock_key(lock_ns: &str, job_name: &str) -> String {
    format!("{}{}", lock_ns, job_name)
}

pub(crate) fn check_lease(owner: &str, ttl: Duration) -> JobResult<()> {
    if owner.is_empty() {
        return Err(JobError::Validation("owner token must not be empty".to_string()));
    }
    if ttl.is_zero() {
        return Err(JobError::Validation("lock ttl must be greater than zero".to_string()));
    }
    Ok(())
}

/// Acquire, renew and release owner-token leases.
#[derive(Clone)]
pub struct LockManager<S> {
    store: S,
}

impl<S: KvStore> LockManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Releases the lock on `job_name` if `owner` holds it.
    ///
    /// Returns `false`, without touching anything, when the lock is absent or
    /// held by another token.
    #[instrument(skip(self, owner))]
    pub async fn unlock(&self, lock_ns: &str, job_name: &str, owner: &str) -> JobResult<bool> {
        let released = self.store.cas_delete(&lock_key(lock_ns, job_name), owner).await?;
        debug!(released, "unlock attempted");
        Ok(released)
    }

    /// Takes the lock at the full `key` if nobody holds it.
    ///
    /// Acquire-only: when any lock already exists, including one held by
    /// `owner`, this returns `false` and leaves its TTL alone. Use
    /// [`LockManager::extend`] to renew a lease you hold.
    #[instrument(skip(self, owner))]
    pub async fn extend_or_acquire(&self, key: &str, owner: &str, ttl: Duration) -> JobResult<bool> {
        check_lease(owner, ttl)?;
        let acquired = self.store.set_if_absent(key, owner, ttl).await?;
        debug!(acquired, "lock acquire attempted");
        Ok(acquired)
    }

    /// Takes the lock on `job_name` if nobody holds it.
    pub async fn acquire(&self, lock_ns: &str, job_name: &str, owner: &str, ttl: Duration) -> JobResult<bool> {
        self.extend_or_acquire(&lock_key(lock_ns, job_name), owner, ttl).await
    }

    /// Renews the lease on `job_name` to a fresh `ttl`, only if `owner` holds it.
    ///
    /// Returns `false` when the lock expired or belongs to someone else; the
    /// caller has lost the job and should stop working on it.
    #[instrument(skip(self, owner))]
    pub async fn extend(&self, lock_ns: &str, job_name: &str, owner: &str, ttl: Duration) -> JobResult<bool> {
        check_lease(owner, ttl)?;
        let renewed = self
            .store
            .expire_if_equal(&lock_key(lock_ns, job_name), owner, ttl)
            .await?;
        debug!(renewed, "lease renewal attempted");
        Ok(renewed)
    }

    /// Token currently holding the lock on `job_name`, if any.
    pub async fn owner(&self, lock_ns: &str, job_name: &str) -> JobResult<Option<String>> {
        Ok(self.store.get(&lock_key(lock_ns, job_name)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const LOCK_NS: &str = "test:lock:";

    #[tokio::test]
    async fn unlock_requires_the_owner_token() {
        let locks = LockManager::new(MemoryStore::new());
        assert!(locks.acquire(LOCK_NS, "user=test", "test1", Duration::from_secs(5)).await.unwrap());

        assert!(!locks.unlock(LOCK_NS, "user=test", "test2").await.unwrap());
        assert_eq!(locks.owner(LOCK_NS, "user=test").await.unwrap().as_deref(), Some("test1"));

        assert!(locks.unlock(LOCK_NS, "user=test", "test1").await.unwrap());
        assert_eq!(locks.owner(LOCK_NS, "user=test").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unlock_of_absent_lock_is_false() {
        let locks = LockManager::new(MemoryStore::new());
        assert!(!locks.unlock(LOCK_NS, "nobody", "test1").await.unwrap());
    }

    #[tokio::test]
    async fn extend_or_acquire_never_refreshes_an_existing_lock() {
        let locks = LockManager::new(MemoryStore::new());
        let key = lock_key(LOCK_NS, "user=1");
        assert!(locks.extend_or_acquire(&key, "w1", Duration::from_millis(60)).await.unwrap());
        // Same owner: still acquire-only.
        assert!(!locks.extend_or_acquire(&key, "w1", Duration::from_secs(5)).await.unwrap());
        assert!(!locks.extend_or_acquire(&key, "w2", Duration::from_secs(5)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(locks.extend_or_acquire(&key, "w2", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn extend_renews_only_the_owners_lease() {
        let locks = LockManager::new(MemoryStore::new());
        locks.acquire(LOCK_NS, "user=1", "w1", Duration::from_millis(60)).await.unwrap();

        assert!(!locks.extend(LOCK_NS, "user=1", "w2", Duration::from_secs(5)).await.unwrap());
        assert!(locks.extend(LOCK_NS, "user=1", "w1", Duration::from_secs(5)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(locks.owner(LOCK_NS, "user=1").await.unwrap().as_deref(), Some("w1"));
        assert!(!locks.extend(LOCK_NS, "user=2", "w1", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn empty_owner_or_zero_ttl_is_rejected() {
        let locks = LockManager::new(MemoryStore::new());
        assert!(matches!(
            locks.acquire(LOCK_NS, "user=1", "", Duration::from_secs(1)).await,
            Err(JobError::Validation(_))
        ));
        assert!(matches!(
            locks.acquire(LOCK_NS, "user=1", "w1", Duration::ZERO).await,
            Err(JobError::Validation(_))
        ));
    }
}
