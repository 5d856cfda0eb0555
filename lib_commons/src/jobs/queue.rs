//! # Job Queue
//!
//! Binds one registry namespace and one lock namespace so producers and
//! workers do not have to pass them around:
//!
//! - producer: [`JobQueue::push`]
//! - worker: [`JobQueue::claim`], then either [`JobQueue::complete`] on
//!   success, [`JobQueue::release`] to hand the job back, or nothing and let
//!   the lease expire. Long jobs call [`JobQueue::heartbeat`] to keep it.

use std::time::Duration;

use tracing::{info, instrument, warn};

use super::{Job, JobRegistry, JobResult, JobScanner, LockManager};
use crate::store::KvStore;

#[derive(Clone)]
pub struct JobQueue<S> {
    registry_ns: String,
    lock_ns: String,
    registry: JobRegistry<S>,
    locks: LockManager<S>,
    scanner: JobScanner<S>,
}

impl<S: KvStore + Clone> JobQueue<S> {
    pub fn new(store: S, registry_ns: impl Into<String>, lock_ns: impl Into<String>) -> Self {
        Self {
            registry_ns: registry_ns.into(),
            lock_ns: lock_ns.into(),
            registry: JobRegistry::new(store.clone()),
            locks: LockManager::new(store.clone()),
            scanner: JobScanner::new(store),
        }
    }

    pub fn registry_ns(&self) -> &str {
        &self.registry_ns
    }

    pub fn lock_ns(&self) -> &str {
        &self.lock_ns
    }

    /// Registers (or reschedules) a job.
    pub async fn push<D>(&self, job: &Job<D>) -> JobResult<()> {
        self.registry.add(&self.registry_ns, job).await
    }

    /// Claims a free job for `owner`, leased for `ttl`.
    pub async fn claim(&self, owner: &str, ttl: Duration) -> JobResult<Option<Job>> {
        self.scanner
            .find_and_lock(&self.registry_ns, &self.lock_ns, owner, ttl)
            .await
    }

    /// Finishes a claimed job: drops it from the registry (unless it was
    /// rescheduled meanwhile) and releases the lease.
    ///
    /// Returns whether the registry entry was removed. A `false` means a
    /// producer re-added the job with a new due time and it stays pending.
    #[instrument(skip(self, job, owner), fields(job_name = %job.name))]
    pub async fn complete<D>(&self, job: &Job<D>, owner: &str) -> JobResult<bool> {
        let removed = self.registry.remove(&self.registry_ns, job).await?;
        if !removed {
            info!("job was rescheduled while processing, keeping it");
        }
        if !self.locks.unlock(&self.lock_ns, &job.name, owner).await? {
            warn!("lease was already gone when completing job");
        }
        Ok(removed)
    }

    /// Gives a claimed job back without removing it.
    pub async fn release<D>(&self, job: &Job<D>, owner: &str) -> JobResult<bool> {
        self.locks.unlock(&self.lock_ns, &job.name, owner).await
    }

    /// Renews the lease on a claimed job. `false` means the lease was lost.
    pub async fn heartbeat<D>(&self, job: &Job<D>, owner: &str, ttl: Duration) -> JobResult<bool> {
        self.locks.extend(&self.lock_ns, &job.name, owner, ttl).await
    }

    /// Token currently holding the lease on `job`, if any.
    pub async fn lease_owner<D>(&self, job: &Job<D>) -> JobResult<Option<String>> {
        self.locks.owner(&self.lock_ns, &job.name).await
    }

    pub async fn due_time(&self, name: &str) -> JobResult<Option<i64>> {
        self.registry.due_time(&self.registry_ns, name).await
    }
}
