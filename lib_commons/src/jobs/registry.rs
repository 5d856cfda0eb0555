//! # Job Registry
//!
//! Pending jobs live in one sorted set per registry namespace: member = job
//! name, score = due time. The registry is created by the first `add` and is
//! never deleted by this code.

use tracing::{debug, instrument};

use super::{Job, JobError, JobResult};
use crate::store::KvStore;

/// Add/remove access to job registries on a shared store.
#[derive(Clone)]
pub struct JobRegistry<S> {
    store: S,
}

impl<S: KvStore> JobRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Upserts `job` into the registry. Re-adding a name moves its due time.
    ///
    /// # Errors
    /// `JobError::Validation` for a job without a name (including the
    /// zero-value job), `JobError::Store` if the store call fails.
    #[instrument(skip(self, job), fields(job_name = %job.name, due_time = job.due_time))]
    pub async fn add<D>(&self, registry_ns: &str, job: &Job<D>) -> JobResult<()> {
        if job.name.is_empty() {
            return Err(JobError::Validation("cannot add empty job".to_string()));
        }
        self.store.zadd(registry_ns, &job.name, job.due_time).await?;
        debug!("job added");
        Ok(())
    }

    /// Removes `job` only if its stored due time still equals `job.due_time`.
    ///
    /// Returns `false` when the job is gone or was re-added with another due
    /// time in the meantime; that newer entry is left in place.
    #[instrument(skip(self, job), fields(job_name = %job.name, due_time = job.due_time))]
    pub async fn remove<D>(&self, registry_ns: &str, job: &Job<D>) -> JobResult<bool> {
        let removed = self
            .store
            .zrem_if_score(registry_ns, &job.name, job.due_time)
            .await?;
        debug!(removed, "job remove attempted");
        Ok(removed)
    }

    /// Current due time of `name`, if it is registered.
    pub async fn due_time(&self, registry_ns: &str, name: &str) -> JobResult<Option<i64>> {
        Ok(self.store.zscore(registry_ns, name).await?)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn empty_job_is_rejected() {
        let registry = JobRegistry::new(MemoryStore::new());
        let err = registry.add("jobs", &Job::new("", 0)).await.unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
        assert_eq!(err.to_string(), "cannot add empty job");
        assert!(matches!(
            registry.add("jobs", &Job::new("", 7)).await,
            Err(JobError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn re_adding_a_name_updates_its_due_time() {
        let registry = JobRegistry::new(MemoryStore::new());
        registry.add("jobs", &Job::new("user=42", 100)).await.unwrap();
        registry.add("jobs", &Job::new("user=42", 250)).await.unwrap();
        assert_eq!(registry.due_time("jobs", "user=42").await.unwrap(), Some(250));
    }

    #[tokio::test]
    async fn remove_checks_the_stored_due_time() {
        let registry = JobRegistry::new(MemoryStore::new());
        let original = Job::new("user=test", 0);
        registry.add("jobs", &original).await.unwrap();

        assert!(!registry.remove("jobs", &Job::new("user=testxxx", -1)).await.unwrap());
        assert!(!registry.remove("jobs", &Job::new("user=test", -1)).await.unwrap());
        assert!(registry.remove("jobs", &original).await.unwrap());
        assert_eq!(registry.due_time("jobs", "user=test").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_after_concurrent_re_add_keeps_the_new_entry() {
        let registry = JobRegistry::new(MemoryStore::new());
        let seen_by_worker = Job::new("user=9", 10);
        registry.add("jobs", &seen_by_worker).await.unwrap();

        // A producer reschedules the job while a worker still holds the old copy.
        registry.add("jobs", &Job::new("user=9", 20)).await.unwrap();

        assert!(!registry.remove("jobs", &seen_by_worker).await.unwrap());
        assert_eq!(registry.due_time("jobs", "user=9").await.unwrap(), Some(20));
    }
}
