//! # Redis Store
//!
//! [`KvStore`] on top of a multiplexed, auto-reconnecting
//! `redis::aio::ConnectionManager`. Conditional and multi-step primitives are
//! Lua scripts (see `scripts.rs`); everything else is a single command.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisResult, Script};
use tracing::debug;

use super::scripts;
use super::{ttl_millis, KvStore, StoreError, StoreResult};

/// Compiled scripts, shared by every clone of the store.
#[derive(Clone)]
struct Scripts {
    scan_and_lock: Script,
    cas_delete: Script,
    expire_if_equal: Script,
    zrem_if_score: Script,
}

impl Scripts {
    fn new() -> Self {
        Self {
            scan_and_lock: Script::new(scripts::SCAN_AND_LOCK),
            cas_delete: Script::new(scripts::CAS_DELETE),
            expire_if_equal: Script::new(scripts::EXPIRE_IF_EQUAL),
            zrem_if_score: Script::new(scripts::ZREM_IF_SCORE),
        }
    }
}

/// A Redis-backed store. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    op_timeout: Option<Duration>,
    scripts: Scripts,
}

impl RedisStore {
    /// Wraps an established connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            op_timeout: None,
            scripts: Scripts::new(),
        }
    }

    /// Bounds every store call. The script or command still runs to completion
    /// on the server; the caller just stops waiting for it.
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = Some(op_timeout);
        self
    }

    pub fn op_timeout(&self) -> Option<Duration> {
        self.op_timeout
    }

    /// Round-trips a `PING`.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let pong: String = self.bounded("PING", redis::cmd("PING").query_async(&mut conn)).await?;
        if pong.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(StoreError::UnexpectedReply(format!("PING answered '{}'", pong)))
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>> + Send,
        T: Send,
    {
        let result = match self.op_timeout {
            Some(after) => tokio::time::timeout(after, fut)
                .await
                .map_err(|_| StoreError::Timeout { op, after })?,
            None => fut.await,
        };
        result.map_err(StoreError::from)
    }
}

/// Redis prints integral scores without a fraction ("100") but large ones in
/// float notation ("1.5e+3"). A fractional score was not written by this
/// crate and would never match a conditional remove, so it is rejected.
fn parse_score(raw: &str) -> StoreResult<i64> {
    if let Ok(score) = raw.parse::<i64>() {
        return Ok(score);
    }
    match raw.parse::<f64>() {
        Ok(score) if score.is_finite() && score.fract() == 0.0 && score.abs() < i64::MAX as f64 => {
            Ok(score as i64)
        }
        Ok(_) => Err(StoreError::UnexpectedReply(format!("non-integral score '{}'", raw))),
        Err(_) => Err(StoreError::UnexpectedReply(format!("non-numeric score '{}'", raw))),
    }
}

fn member_score_pairs(flat: Vec<String>) -> StoreResult<Vec<(String, i64)>> {
    if flat.len() % 2 != 0 {
        return Err(StoreError::UnexpectedReply(format!(
            "ZSCAN returned an odd number of elements ({})",
            flat.len()
        )));
    }
    let mut pairs = Vec::with_capacity(flat.len() / 2);
    let mut items = flat.into_iter();
    while let (Some(member), Some(score)) = (items.next(), items.next()) {
        let score = parse_score(&score)?;
        pairs.push((member, score));
    }
    Ok(pairs)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = self
            .bounded(
                "SET NX",
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_millis(ttl))
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn cas_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .bounded(
                "CAS DELETE",
                self.scripts.cas_delete.key(key).arg(expected).invoke_async(&mut conn),
            )
            .await?;
        Ok(deleted == 1)
    }

    async fn expire_if_equal(&self, key: &str, expected: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let renewed: i64 = self
            .bounded(
                "EXPIRE IF EQUAL",
                self.scripts
                    .expire_if_equal
                    .key(key)
                    .arg(expected)
                    .arg(ttl_millis(ttl))
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(renewed == 1)
    }

    async fn zadd(&self, set_key: &str, member: &str, score: i64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .bounded(
                "ZADD",
                redis::cmd("ZADD").arg(set_key).arg(score).arg(member).query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn zscore(&self, set_key: &str, member: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = self
            .bounded(
                "ZSCORE",
                redis::cmd("ZSCORE").arg(set_key).arg(member).query_async(&mut conn),
            )
            .await?;
        raw.as_deref().map(parse_score).transpose()
    }

    async fn zscan(&self, set_key: &str, cursor: u64) -> StoreResult<(u64, Vec<(String, i64)>)> {
        let mut conn = self.conn.clone();
        let (next, flat): (String, Vec<String>) = self
            .bounded(
                "ZSCAN",
                redis::cmd("ZSCAN").arg(set_key).arg(cursor).query_async(&mut conn),
            )
            .await?;
        let next = next
            .parse::<u64>()
            .map_err(|_| StoreError::UnexpectedReply(format!("bad ZSCAN cursor '{}'", next)))?;
        Ok((next, member_score_pairs(flat)?))
    }

    async fn zrem_if_score(&self, set_key: &str, member: &str, expected_score: i64) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .bounded(
                "ZREM IF SCORE",
                self.scripts
                    .zrem_if_score
                    .key(set_key)
                    .arg(member)
                    .arg(expected_score)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(removed == 1)
    }

    async fn scan_and_lock(
        &self,
        set_key: &str,
        lock_prefix: &str,
        owner: &str,
        ttl: Duration,
    ) -> StoreResult<Option<(String, i64)>> {
        let mut conn = self.conn.clone();
        let claimed: Option<(String, String)> = self
            .bounded(
                "SCAN AND LOCK",
                self.scripts
                    .scan_and_lock
                    .key(set_key)
                    .arg(lock_prefix)
                    .arg(owner)
                    .arg(ttl_millis(ttl))
                    .invoke_async(&mut conn),
            )
            .await?;
        match claimed {
            Some((member, score)) => {
                debug!(set_key, member = %member, "claimed member in server-side scan");
                Ok(Some((member, parse_score(&score)?)))
            }
            None => Ok(None),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("GET", redis::cmd("GET").arg(key).query_async(&mut conn)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        self.bounded("SET", cmd.query_async::<()>(&mut conn)).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let count: i64 = self.bounded("EXISTS", redis::cmd("EXISTS").arg(key).query_async(&mut conn)).await?;
        Ok(count > 0)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let count: i64 = self.bounded("DEL", redis::cmd("DEL").arg(key).query_async(&mut conn)).await?;
        Ok(count > 0)
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("HGET", redis::cmd("HGET").arg(key).arg(field).query_async(&mut conn)).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .bounded(
                "HSET",
                redis::cmd("HSET").arg(key).arg(field).arg(value).query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let found: i64 = self
            .bounded("HEXISTS", redis::cmd("HEXISTS").arg(key).arg(field).query_async(&mut conn))
            .await?;
        Ok(found == 1)
    }
}
