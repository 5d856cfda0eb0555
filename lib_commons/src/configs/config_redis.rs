//! # Redis Configuration
//!
//! Keys (after the optional prefix): `REDIS_URL`, `REDIS_DB`, `REDIS_PWD`,
//! `REDIS_AUTH_ENABLED`, `REDIS_OP_TIMEOUT_MS`.

use std::time::Duration;

use super::{ConfigError, ConfigResult, ConfigSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// `host:port`, or a full `redis://` / `rediss://` URL used verbatim.
    pub url: String,
    /// Logical database index.
    pub db: i64,
    /// Password, sent only when `auth_enabled` is set.
    pub password: String,
    pub auth_enabled: bool,
    /// Upper bound for a single store call. Zero leaves calls unbounded.
    pub op_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis:6379".to_string(),
            db: 0,
            password: String::new(),
            auth_enabled: true,
            op_timeout_ms: 0,
        }
    }
}

impl RedisConfig {
    pub fn from_source(source: &ConfigSource) -> ConfigResult<Self> {
        let defaults = Self::default();
        let config = Self {
            url: source.get_or("REDIS_URL", &defaults.url),
            db: source.parse_or("REDIS_DB", defaults.db)?,
            password: source.get_or("REDIS_PWD", &defaults.password),
            auth_enabled: source.bool_or("REDIS_AUTH_ENABLED", defaults.auth_enabled)?,
            op_timeout_ms: source.parse_or("REDIS_OP_TIMEOUT_MS", defaults.op_timeout_ms)?,
        };
        if config.url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "REDIS_URL".to_string(),
                value: config.url,
                reason: "must not be empty".to_string(),
            });
        }
        if config.db < 0 {
            return Err(ConfigError::Invalid {
                key: "REDIS_DB".to_string(),
                value: config.db.to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        Ok(config)
    }

    /// Connection URL for `redis::Client::open`.
    pub fn connection_url(&self) -> String {
        let url = self.url.trim();
        if url.starts_with("redis://") || url.starts_with("rediss://") {
            return url.to_string();
        }
        if self.auth_enabled && !self.password.is_empty() {
            format!("redis://:{}@{}/{}", self.password, url, self.db)
        } else {
            format!("redis://{}/{}", url, self.db)
        }
    }

    pub fn op_timeout(&self) -> Option<Duration> {
        (self.op_timeout_ms > 0).then(|| Duration::from_millis(self.op_timeout_ms))
    }
}
