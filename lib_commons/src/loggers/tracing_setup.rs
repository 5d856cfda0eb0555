use std::io;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, prelude::*, EnvFilter, Layer, Registry};

use crate::configs::{LogFormat, LogOutput, LoggerConfig};

#[derive(Debug, Error)]
pub enum LoggerError {
    /// The level is not a valid filter directive.
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("cannot create log directory: {0}")]
    Io(#[from] io::Error),

    /// A global subscriber was installed before.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// `RUST_LOG` when set and valid, the configured level otherwise.
pub fn build_filter(config: &LoggerConfig) -> Result<EnvFilter, LoggerError> {
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(config.filter_directive()))?)
}

fn console_layer(config: &LoggerConfig) -> Option<BoxedLayer> {
    let layer = match (config.format, config.output) {
        (_, LogOutput::Discard) => return None,
        (LogFormat::Text, LogOutput::Stdout) => fmt::layer().with_target(true).with_writer(io::stdout).boxed(),
        (LogFormat::Text, LogOutput::Stderr) => fmt::layer().with_target(true).with_writer(io::stderr).boxed(),
        (LogFormat::Json, LogOutput::Stdout) => fmt::layer().json().with_writer(io::stdout).boxed(),
        (LogFormat::Json, LogOutput::Stderr) => fmt::layer().json().with_writer(io::stderr).boxed(),
    };
    Some(layer)
}

/// Installs the global subscriber.
///
/// When `log_dir` is set a JSON file rotating daily (`{app_name}.YYYY-MM-DD`)
/// is written through a background worker. The returned guard flushes it on
/// drop, so keep it alive until the process exits.
pub fn init_logging(config: &LoggerConfig) -> Result<Option<WorkerGuard>, LoggerError> {
    let filter = build_filter(config)?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.extend(console_layer(config));

    let mut guard = None;
    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = rolling::daily(log_dir, &config.app_name);
        let (writer, worker_guard) = non_blocking(file_appender);
        layers.push(fmt::layer().with_ansi(false).with_writer(writer).json().boxed());
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))?;

    info!(
        level = %config.filter_directive(),
        output = %config.output,
        file = config.log_dir.is_some(),
        "logging initialized"
    );
    Ok(guard)
}
