//! Logging for voxwatch.
//!
//! Two sinks share one filter:
//!
//! - compact text on stderr for the operator
//! - JSON lines under the log directory, rolled daily and kept for
//!   [`LOG_RETENTION_DAYS`] files
//!
//! Alert and speech events carry `entity_id`, `status` and `session` fields.
//! The JSON sink flattens them to top-level keys, so one entity's history is
//! a `jq 'select(.entity_id == "antenna_1")'` away.
//!
//! The filter comes from, in order: `--log-filter`, `RUST_LOG`, then the
//! verbosity count applied to every voxwatch crate (third-party crates stay
//! at `warn`).

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Result, VoxError};

/// Log file name prefix; the appender adds the date.
pub const LOG_FILE_PREFIX: &str = "voxwatch";

/// Number of daily log files kept.
pub const LOG_RETENTION_DAYS: usize = 7;

/// Crates whose level follows the verbosity count.
const CRATES: &[&str] = &[
    "voxwatch",
    "voxwatch_core",
    "voxwatch_ingest",
    "voxwatch_speech",
    "voxwatch_alert",
];

/// How the binary wants logging set up.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Log directory; `~/.voxwatch/logs/` when unset
    pub dir: Option<PathBuf>,
    /// `-v` count: 0 info, 1 debug, 2+ trace
    pub verbosity: u8,
    /// Explicit filter directives, overriding `RUST_LOG`
    pub filter: Option<String>,
}

impl LogOptions {
    pub fn level(&self) -> Level {
        match self.verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// Resolve the filter, rejecting malformed `--log-filter` directives.
    pub fn env_filter(&self) -> Result<EnvFilter> {
        if let Some(directives) = &self.filter {
            return EnvFilter::try_new(directives).map_err(|e| VoxError::ConfigValidation {
                message: format!("invalid log filter '{directives}': {e}"),
            });
        }
        Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directives(self.level()))))
    }
}

/// `warn` globally, `level` for every voxwatch crate.
pub fn default_directives(level: Level) -> String {
    let level = level.to_string().to_ascii_lowercase();
    std::iter::once("warn".to_string())
        .chain(CRATES.iter().map(|krate| format!("{krate}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Flushes the file sink when dropped. Hold it for the life of the process.
pub struct LogGuard {
    _file_guard: WorkerGuard,
}

/// Install the global subscriber.
pub fn init_logging(options: &LogOptions) -> Result<LogGuard> {
    let filter = options.env_filter()?;

    let dir = match &options.dir {
        Some(dir) => dir.clone(),
        None => default_log_dir()?,
    };
    std::fs::create_dir_all(&dir).map_err(|e| VoxError::DirectoryCreation {
        path: dir.clone(),
        source: e,
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(LOG_RETENTION_DAYS)
        .build(&dir)
        .map_err(|e| VoxError::internal(format!("log appender in {}: {e}", dir.display())))?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false);

    let detailed = options.level() == Level::TRACE;
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(options.verbosity > 0)
        .with_file(detailed)
        .with_line_number(detailed)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(log_dir = %dir.display(), level = %options.level(), "logging initialized");

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

/// Console-only logging for tests; safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(default_directives(Level::DEBUG)))
        .with_test_writer()
        .try_init();
}

/// `~/.voxwatch/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(crate::config::home_dir()?.join("logs"))
}
