//! # lib_commons
//!
//! Shared building blocks for backend services: a Redis-backed distributed
//! job queue with owner-token locks, a JSON state store, and the layered
//! configuration, connection and logging plumbing they run on.
//!
//! Each top-level module sits behind a cargo feature of the same name.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "connections")]
pub mod connections;
#[cfg(feature = "jobs")]
pub mod jobs;
#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "state")]
pub mod state;
#[cfg(feature = "store")]
pub mod store;

// Re-export the types most callers touch.
#[cfg(feature = "jobs")]
pub use jobs::{Job, JobError, JobQueue, JobRegistry, JobScanner, LockManager};
#[cfg(feature = "state")]
pub use state::{StateError, StateStore};
#[cfg(feature = "store")]
pub use store::{KvStore, MemoryStore, RedisStore, StoreError};
