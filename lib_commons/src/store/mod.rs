//! # Key-Value Store Adapter
//!
//! The job queue and the state store never talk to a driver directly. They go
//! through [`KvStore`], a small set of atomic primitives any shared store has
//! to provide: set-if-absent with a TTL, compare-and-delete, sorted-set
//! upsert/scan/conditional-remove, and plain and hash-field get/set.
//!
//! Two backends ship with the crate:
//!
//! - **`redis_store`**: [`RedisStore`], backed by a `redis` connection manager.
//!   Multi-step primitives run as server-side Lua scripts so they are atomic
//!   from the server's point of view.
//! - **`memory_store`**: [`MemoryStore`], a single-process map with lazy TTL
//!   expiry. Handy for tests and for embedding the queue in one process.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// In-process backend.
pub mod memory_store;
/// Redis backend.
pub mod redis_store;
mod scripts;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;

/// Errors raised while talking to the shared store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network, protocol or server-side failure reported by the Redis driver.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The operation did not complete within the configured bound.
    #[error("Store operation '{op}' timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// The key exists but holds a different kind of value.
    #[error("Key '{key}' holds a value of the wrong type")]
    WrongType { key: String },

    /// The store answered with something the adapter cannot interpret.
    #[error("Unexpected reply from store: {0}")]
    UnexpectedReply(String),
}

impl StoreError {
    /// Whether the failure was a timeout, either our own bound or the driver's.
    ///
    /// Callers that want to retry idempotent operations should branch on this
    /// instead of matching on error text.
    pub fn is_timeout(&self) -> bool {
        match self {
            StoreError::Timeout { .. } => true,
            StoreError::Redis(e) => e.is_timeout(),
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic primitives required from a shared key-value store.
///
/// Every method is a single round trip from the caller's perspective and must
/// be atomic on the store side. Missing keys are reported as `false`/`None`,
/// never as errors.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Sets `key` to `value` with a TTL only if the key does not exist.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Deletes `key` only if it currently holds `expected`.
    async fn cas_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Resets the TTL of `key` only if it currently holds `expected`.
    async fn expire_if_equal(&self, key: &str, expected: &str, ttl: Duration) -> StoreResult<bool>;

    /// Inserts `member` into the sorted set, or updates its score.
    async fn zadd(&self, set_key: &str, member: &str, score: i64) -> StoreResult<()>;

    /// Returns the score of `member`, if present.
    async fn zscore(&self, set_key: &str, member: &str) -> StoreResult<Option<i64>>;

    /// Pages through the sorted set. Cursor `0` starts a cycle and a returned
    /// cursor of `0` ends it.
    async fn zscan(&self, set_key: &str, cursor: u64) -> StoreResult<(u64, Vec<(String, i64)>)>;

    /// Removes `member` only if its current score equals `expected_score`.
    async fn zrem_if_score(&self, set_key: &str, member: &str, expected_score: i64) -> StoreResult<bool>;

    /// Walks the sorted set and locks the first member whose lock key
    /// (`lock_prefix` + member) is free, returning that member and its score.
    ///
    /// The default implementation runs the walk from the client: every lock
    /// attempt is an atomic set-if-absent, so two callers can never claim the
    /// same member, but the walk itself costs one round trip per page and per
    /// attempt. Backends with server-side scripting should override it.
    async fn scan_and_lock(
        &self,
        set_key: &str,
        lock_prefix: &str,
        owner: &str,
        ttl: Duration,
    ) -> StoreResult<Option<(String, i64)>> {
        let mut cursor = 0;
        loop {
            let (next, page) = self.zscan(set_key, cursor).await?;
            for (member, score) in page {
                let lock_key = format!("{}{}", lock_prefix, member);
                if self.set_if_absent(&lock_key, owner, ttl).await? {
                    return Ok(Some((member, score)));
                }
            }
            if next == 0 {
                return Ok(None);
            }
            cursor = next;
        }
    }

    /// Reads a plain string value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a plain string value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Deletes `key`, returning whether it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool>;
}

/// TTL in whole milliseconds, never below 1 (Redis rejects `PX 0`).
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
