//! Tracing setup
//!
//! Logs go to a daily-rotated file in `$XDG_STATE_HOME/sheetdrive/`
//! (~/.local/state/sheetdrive/). A verbose run also echoes retries, repairs
//! and migrations to stderr.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

const LOG_PREFIX: &str = "sheetdrive.log";

/// What a verbose run shows on stderr.
const CONSOLE_DIRECTIVES: &str = "warn,sheetdrive_core=info,sheetdrive=info";

/// Keeps the background log writer alive; pending lines are flushed on drop.
pub struct LoggingGuard {
    _file: WorkerGuard,
}

/// Install the global subscriber.
///
/// The file level comes from `RUST_LOG` when set, otherwise from the
/// config. `verbose` adds a compact stderr layer.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| Error::Config(format!("failed to open log file: {}", e)))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_level(&config.level)?,
    };
    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(file_filter);

    let console_layer = if verbose {
        Some(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_target(false)
                .with_filter(parse_level(CONSOLE_DIRECTIVES)?),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {}", e)))?;

    tracing::debug!(log_dir = %log_dir.display(), level = %config.level, verbose, "Logging initialized");
    Ok(LoggingGuard { _file: guard })
}

/// Parse a level or directive list such as `info,sheetdrive_core=debug`.
fn parse_level(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| Error::Config(format!("invalid logging.level {:?}: {}", directives, e)))
}

/// Test subscriber writing through the test harness; safe to call repeatedly.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}
