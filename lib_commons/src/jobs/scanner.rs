//! # Job Scanner
//!
//! Finds a pending job nobody holds and locks it in the same step. The walk
//! follows the store's scan order and stops at the first lock it wins, so
//! claims are "first free job", not strictly by due time.

use std::time::Duration;

use tracing::{debug, instrument};

use super::lock::check_lease;
use super::{Job, JobResult};
use crate::store::KvStore;

#[derive(Clone)]
pub struct JobScanner<S> {
    store: S,
}

impl<S: KvStore> JobScanner<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Claims the first unlocked job in `registry_ns`, locking it at
    /// `lock_ns` + name with `owner` for `ttl`.
    ///
    /// Returns `Ok(None)` after a full pass over the registry finds every job
    /// locked (or the registry empty). Any store failure aborts the pass and
    /// is returned as an error; no lock is left behind by a failed pass.
    #[instrument(skip(self, owner))]
    pub async fn find_and_lock(
        &self,
        registry_ns: &str,
        lock_ns: &str,
        owner: &str,
        ttl: Duration,
    ) -> JobResult<Option<Job>> {
        check_lease(owner, ttl)?;
        let claimed = self
            .store
            .scan_and_lock(registry_ns, lock_ns, owner, ttl)
            .await?
            .map(|(name, due_time)| Job::new(name, due_time));
        match &claimed {
            Some(job) => debug!(job = %job, "job claimed"),
            None => debug!("no free job"),
        }
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobError, JobRegistry, LockManager};
    use crate::store::MemoryStore;

    const JOB_NS: &str = "test:jobs";
    const LOCK_NS: &str = "test:lock:";

    #[tokio::test]
    async fn empty_registry_yields_none() {
        let scanner = JobScanner::new(MemoryStore::new());
        let found = scanner
            .find_and_lock(JOB_NS, LOCK_NS, "test", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn claims_each_job_once_then_runs_dry() {
        let store = MemoryStore::new().with_scan_page_size(2);
        let registry = JobRegistry::new(store.clone());
        for i in 0..5 {
            registry.add(JOB_NS, &Job::new(format!("user={}", i), i)).await.unwrap();
        }

        let scanner = JobScanner::new(store.clone());
        let mut claimed = Vec::new();
        while let Some(job) = scanner
            .find_and_lock(JOB_NS, LOCK_NS, "w1", Duration::from_secs(5))
            .await
            .unwrap()
        {
            claimed.push(job.name);
        }
        claimed.sort();
        assert_eq!(claimed, vec!["user=0", "user=1", "user=2", "user=3", "user=4"]);

        let locks = LockManager::new(store);
        assert_eq!(locks.owner(LOCK_NS, "user=3").await.unwrap().as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn returned_job_carries_the_registered_due_time() {
        let store = MemoryStore::new();
        JobRegistry::new(store.clone())
            .add(JOB_NS, &Job::new("user=test", 0))
            .await
            .unwrap();
        let found = JobScanner::new(store)
            .find_and_lock(JOB_NS, LOCK_NS, "test1", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(found, Some(Job::new("user=test", 0)));
    }

    #[tokio::test]
    async fn empty_owner_is_rejected() {
        let scanner = JobScanner::new(MemoryStore::new());
        let err = scanner
            .find_and_lock(JOB_NS, LOCK_NS, "", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
    }
}
