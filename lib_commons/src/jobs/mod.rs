//! # Distributed Job Queue
//!
//! A registry of pending jobs kept in a sorted set, plus per-job leases that
//! workers take before processing. All coordination between workers is done
//! by the shared store's atomic primitives; nothing here holds state between
//! calls.
//!
//! ## Contained Modules:
//!
//! - **`job`**: the [`Job`] value (name, due time, in-process description).
//! - **`registry`**: [`JobRegistry`], add and score-checked remove.
//! - **`lock`**: [`LockManager`], owner-token leases with TTL expiry.
//! - **`scanner`**: [`JobScanner`], the atomic scan-and-claim walk.
//! - **`queue`**: [`JobQueue`], one registry plus one lock namespace bound
//!   together for the usual producer/worker lifecycle.
//!
//! A claimed job is processed at least once: if a worker dies, its lease
//! expires and another worker can claim the job again. Pick TTLs longer than
//! the worst-case processing time or make handlers idempotent.

use thiserror::Error;

use crate::store::StoreError;

/// The job value type.
pub mod job;
/// Owner-token leases.
pub mod lock;
/// Producer/worker facade.
pub mod queue;
/// Sorted-set registry of pending jobs.
pub mod registry;
/// Atomic scan-and-claim.
pub mod scanner;

pub use job::Job;
pub use lock::LockManager;
pub use queue::JobQueue;
pub use registry::JobRegistry;
pub use scanner::JobScanner;

/// Errors returned by job queue operations.
///
/// "Not found" outcomes (no free job, lock held by someone else, stale score
/// on remove) are `None`/`false` results, not errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// The caller passed something unusable; retrying will not help.
    #[error("{0}")]
    Validation(String),

    /// The shared store could not be reached or rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type JobResult<T> = Result<T, JobError>;
