//! # Logger Configuration
//!
//! Keys (after the optional prefix): `LEVEL`, `FORMATTER`, `OUTPUT`,
//! `LOG_DIR`, `APP_NAME`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigError, ConfigResult, ConfigSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown formatter '{}', expected text or json", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// No console output. A file layer still runs when `LOG_DIR` is set.
    Discard,
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" | "" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            "discard" => Ok(Self::Discard),
            other => Err(format!("unknown output '{}', expected stdout, stderr or discard", other)),
        }
    }
}

impl fmt::Display for LogOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Level or filter directive (`info`, `warning`, `lib_commons=debug`).
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Directory for a daily-rolling JSON log file. `None` disables it.
    pub log_dir: Option<PathBuf>,
    /// File name prefix for the rolling log.
    pub app_name: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            output: LogOutput::Stdout,
            log_dir: None,
            app_name: "app".to_string(),
        }
    }
}

fn parse_choice<T: FromStr<Err = String>>(source: &ConfigSource, key: &str, default: T) -> ConfigResult<T> {
    match source.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
            key: key.to_string(),
            value: raw.to_string(),
            reason,
        }),
    }
}

impl LoggerConfig {
    pub fn from_source(source: &ConfigSource) -> ConfigResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            level: source.get_or("LEVEL", &defaults.level),
            format: parse_choice(source, "FORMATTER", defaults.format)?,
            output: parse_choice(source, "OUTPUT", defaults.output)?,
            log_dir: source
                .get("LOG_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            app_name: source.get_or("APP_NAME", &defaults.app_name),
        })
    }

    /// Level in `EnvFilter` syntax. `warning` is accepted as `warn`.
    pub fn filter_directive(&self) -> String {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "warning" => "warn".to_string(),
            "" => "info".to_string(),
            _ => self.level.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_info_text_stdout() {
        let config = LoggerConfig::from_source(&ConfigSource::default()).unwrap();
        assert_eq!(config, LoggerConfig::default());
    }

    #[test]
    fn reads_every_key() {
        let source = ConfigSource::from_pairs([
            ("LEVEL", "warning"),
            ("FORMATTER", "JSON"),
            ("OUTPUT", "discard"),
            ("LOG_DIR", "/var/log/jobs"),
            ("APP_NAME", "worker"),
        ]);
        let config = LoggerConfig::from_source(&source).unwrap();
        assert_eq!(config.filter_directive(), "warn");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Discard);
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/jobs")));
        assert_eq!(config.app_name, "worker");
    }

    #[test]
    fn unknown_formatter_is_invalid() {
        let source = ConfigSource::from_pairs([("FORMATTER", "sd")]);
        let err = LoggerConfig::from_source(&source).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "FORMATTER"));
    }

    #[test]
    fn unknown_output_is_invalid() {
        let source = ConfigSource::from_pairs([("OUTPUT", "syslog")]);
        assert!(LoggerConfig::from_source(&source).is_err());
    }
}
