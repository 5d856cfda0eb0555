//! # Connections Module
//!
//! This module handles persistent connections to external services.

use std::time::Duration;

use thiserror::Error;

use crate::configs::ConfigError;
use crate::store::StoreError;

/// Module for Redis connection handling.
pub mod cache_redis;

pub use cache_redis::CacheHandler;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The client could not be built or the connection could not be opened.
    #[error("Redis connection error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis connection not established within {0:?}")]
    ConnectTimeout(Duration),

    /// Connected, but the health check failed.
    #[error("Redis health check failed: {0}")]
    Store(#[from] StoreError),
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_url_is_a_redis_error() {
        let config = crate::configs::RedisConfig {
            url: "redis://[bad".to_string(),
            ..Default::default()
        };
        let err = CacheHandler::connect(&config).await.err().unwrap();
        assert!(matches!(err, ConnectionError::Redis(_)));
    }

    #[test]
    fn config_errors_convert() {
        let err: ConnectionError = ConfigError::FileNotFound("x.json".into()).into();
        assert!(err.to_string().contains("x.json"));
    }
}
