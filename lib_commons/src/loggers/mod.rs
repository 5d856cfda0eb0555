//! # Loggers
//!
//! Process-wide `tracing` setup driven by [`LoggerConfig`](crate::configs::LoggerConfig).
//! Library code only emits spans and events; binaries call
//! [`init_logging`] once at startup.

/// Subscriber assembly: filter, console layer, rolling file layer.
pub mod tracing_setup;

pub use tracing_setup::{build_filter, init_logging, LoggerError};
