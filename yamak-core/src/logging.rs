//! Logging infrastructure for yamak
//!
//! The library only emits `tracing` events; installing a subscriber is up to
//! the embedding program. The `yamak` CLI calls [`init`], which writes one
//! file per UTC day, `~/.local/state/yamak/yamak.YYYY-MM-DD.log`, following
//! XDG standards.

use crate::config::{Config, LoggingConfig};
use crate::error::Error;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_FILE_PREFIX: &str = "yamak";
const LOG_FILE_SUFFIX: &str = "log";

/// Initialize the logging system
///
/// Sets up tracing with:
/// - File output to XDG state directory
/// - Daily rotation, keeping `max_files` files
/// - Configurable log level via config or RUST_LOG env var
pub fn init(config: &LoggingConfig) -> crate::error::Result<LoggingGuard> {
    let log_dir = log_dir();

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| Error::Config(format!("failed to open log file: {}", e)))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {}", e)))?;

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests (logs to stdout)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Directory holding the rotated log files
pub fn log_dir() -> PathBuf {
    Config::state_dir()
}

/// The file [`init`] writes to today
pub fn log_file_path() -> PathBuf {
    log_file_path_at(Utc::now())
}

/// The file [`init`] writes to on the UTC day of `now`
pub fn log_file_path_at(now: DateTime<Utc>) -> PathBuf {
    log_dir().join(format!(
        "{}.{}.{}",
        LOG_FILE_PREFIX,
        now.format("%Y-%m-%d"),
        LOG_FILE_SUFFIX
    ))
}
