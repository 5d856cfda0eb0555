//! # Configuration Modules
//!
//! Layered key/value configuration shared by the connection and logger
//! setup. Sources, lowest precedence first:
//!
//! 1. a `.env` file in the working directory (loaded into the process
//!    environment through `dotenvy`, missing file ignored);
//! 2. an optional JSON file read through `more-config`, nested objects
//!    flattened (`{"redis": {"url": ..}}` -> `REDIS_URL`);
//! 3. process environment variables named `{PREFIX}_{KEY}`, or `{KEY}` when
//!    no prefix is given.
//!
//! All keys are normalised to upper snake case.
//!
//! ## Contained Modules:
//! - `config_redis`: Redis connection settings.
//! - `config_logger`: log level, format and destinations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{ext::*, *};
use thiserror::Error;

pub mod config_logger;
pub mod config_redis;

pub use config_logger::{LogFormat, LogOutput, LoggerConfig};
pub use config_redis::RedisConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file given explicitly does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("cannot read configuration file {path}: {reason}")]
    File { path: PathBuf, reason: String },

    /// The `.env` file exists but is malformed.
    #[error("cannot load .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    /// A key holds a value that does not fit its type or allowed set.
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid { key: String, value: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Turns `redis:url`, `redis.url` or `redis-url` into `REDIS_URL`.
pub fn normalize_key(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| match c {
            ':' | '.' | '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// Resolved configuration values, keyed by normalised name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSource {
    values: BTreeMap<String, String>,
}

impl ConfigSource {
    /// Loads `.env`, then `file` (if any), then the environment overlay for
    /// `prefix`.
    pub fn load(file: Option<&Path>, prefix: &str) -> ConfigResult<Self> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ConfigError::Dotenv(e)),
        }

        let mut source = match file {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        source.overlay_env(prefix, std::env::vars());
        Ok(source)
    }

    /// Reads one JSON file through `more-config`, flattening nested keys.
    pub fn from_json_file(path: &Path) -> ConfigResult<Self> {
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let path_string = path.to_string_lossy().to_string();
        let data: Box<dyn ConfigurationRoot> = DefaultConfigurationBuilder::new()
            .add_json_file(&path_string.is().optional())
            .build()
            .map_err(|e| ConfigError::File {
                path: path.to_path_buf(),
                reason: format!("{:?}", e),
            })?;

        let mut values = BTreeMap::new();
        for (key, value) in data.iter(None) {
            values.insert(normalize_key(&key), value.to_string());
        }
        Ok(Self { values })
    }

    /// Builds a source from literal pairs, normalising each key.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (normalize_key(k.as_ref()), v.into()))
            .collect();
        Self { values }
    }

    /// Copies `vars` over the current values. With a non-empty `prefix` only
    /// variables named `{PREFIX}_{KEY}` are taken, stored under `KEY`.
    pub fn overlay_env<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let head = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}_", normalize_key(prefix))
        };
        for (name, value) in vars {
            let name = normalize_key(&name);
            if let Some(key) = name.strip_prefix(head.as_str()) {
                if !key.is_empty() {
                    self.values.insert(key.to_string(), value);
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&normalize_key(key)).map(String::as_str)
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Parses `key` as `T`, falling back to `default` when it is unset.
    pub fn parse_or<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: normalize_key(key),
                value: raw.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Boolean with the usual spellings (`true/false`, `1/0`, `yes/no`, `on/off`).
    pub fn bool_or(&self, key: &str, default: bool) -> ConfigResult<bool> {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key: normalize_key(key),
                value: raw.to_string(),
                reason: "expected a boolean".to_string(),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn keys_are_upper_snake_case() {
        assert_eq!(normalize_key("redis:url"), "REDIS_URL");
        assert_eq!(normalize_key("log.level"), "LOG_LEVEL");
        assert_eq!(normalize_key("op-timeout-ms"), "OP_TIMEOUT_MS");
    }

    #[test]
    fn json_file_is_flattened() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"redis": {{"url": "cache:6380", "db": 3}}, "level": "debug"}}"#).unwrap();

        let source = ConfigSource::from_json_file(file.path()).unwrap();
        assert_eq!(source.get("REDIS_URL"), Some("cache:6380"));
        assert_eq!(source.get("redis:db"), Some("3"));
        assert_eq!(source.get("LEVEL"), Some("debug"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigSource::from_json_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn prefixed_environment_wins_over_file_values() {
        let mut source = ConfigSource::from_pairs([("REDIS_URL", "file:6379"), ("REDIS_DB", "1")]);
        source.overlay_env(
            "app",
            vars(&[("APP_REDIS_URL", "env:6379"), ("REDIS_DB", "9"), ("OTHER_REDIS_DB", "7")]),
        );
        assert_eq!(source.get("REDIS_URL"), Some("env:6379"));
        assert_eq!(source.get("REDIS_DB"), Some("1"));
    }

    #[test]
    fn empty_prefix_takes_variables_as_is() {
        let mut source = ConfigSource::default();
        source.overlay_env("", vars(&[("LEVEL", "warn")]));
        assert_eq!(source.get("level"), Some("warn"));
    }

    #[test]
    fn typed_getters_report_bad_values() {
        let source = ConfigSource::from_pairs([("REDIS_DB", "two"), ("FLAG", "maybe"), ("ON", "yes")]);
        assert!(matches!(
            source.parse_or::<i64>("REDIS_DB", 0),
            Err(ConfigError::Invalid { ref key, .. }) if key == "REDIS_DB"
        ));
        assert!(source.bool_or("FLAG", false).is_err());
        assert!(source.bool_or("ON", false).unwrap());
        assert_eq!(source.parse_or::<u64>("UNSET", 5).unwrap(), 5);
    }
}
