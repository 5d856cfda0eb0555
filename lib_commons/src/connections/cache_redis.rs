//! # Redis Cache Connection
//!
//! Opens the shared Redis connection described by a [`RedisConfig`] and hands
//! out [`RedisStore`]s on top of it.

use std::path::Path;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use super::{ConnectionError, ConnectionResult};
use crate::configs::{ConfigSource, RedisConfig};
use crate::store::RedisStore;

/// A handler for the Redis connection.
#[derive(Clone)]
pub struct CacheHandler {
    /// The configuration this handler was opened with.
    pub config: RedisConfig,
    /// Multiplexed, auto-reconnecting connection shared by every store.
    conn: ConnectionManager,
}

impl CacheHandler {
    /// Connects and verifies the server answers `PING`.
    ///
    /// The configured op timeout, if any, also bounds the initial connect.
    #[instrument(skip(config), fields(url = %config.url, db = config.db))]
    pub async fn connect(config: &RedisConfig) -> ConnectionResult<Self> {
        let client = Client::open(config.connection_url())?;
        let conn = match config.op_timeout() {
            Some(after) => tokio::time::timeout(after, client.get_connection_manager())
                .await
                .map_err(|_| ConnectionError::ConnectTimeout(after))??,
            None => client.get_connection_manager().await?,
        };

        let handler = Self {
            config: config.clone(),
            conn,
        };
        handler.ping().await?;
        info!("connected to redis");
        Ok(handler)
    }

    /// Reads `RedisConfig` from `file` and the `prefix` environment, then
    /// connects.
    pub async fn load_and_connect(file: Option<&Path>, prefix: &str) -> ConnectionResult<Self> {
        let source = ConfigSource::load(file, prefix)?;
        let config = RedisConfig::from_source(&source)?;
        Self::connect(&config).await
    }

    /// A store on the shared connection, bounded by the configured op timeout.
    pub fn store(&self) -> RedisStore {
        let store = RedisStore::new(self.conn.clone());
        match self.config.op_timeout() {
            Some(after) => store.with_op_timeout(after),
            None => store,
        }
    }

    pub async fn ping(&self) -> ConnectionResult<()> {
        Ok(self.store().ping().await?)
    }
}
