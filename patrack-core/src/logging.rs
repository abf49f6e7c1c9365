//! Logging infrastructure for patrack
//!
//! Logs go to a daily-rotated file in the XDG state directory
//! (`~/.local/state/patrack/patrack.log.YYYY-MM-DD`). Debug-mode output
//! (outgoing envelopes, delivery failures) uses [`DEBUG_TARGET`] and is kept at
//! `info` whatever the configured level, so `--debug` output is never filtered
//! away by a quiet `level`.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target used for debug-mode envelope logging.
pub const DEBUG_TARGET: &str = "patrack::debug";

/// Filter directives for a configured level: the level itself plus the
/// debug target at `info`.
fn directives(level: &str) -> String {
    format!("{},{}=info", level, DEBUG_TARGET)
}

/// Initialize file logging
///
/// `RUST_LOG` overrides the configured level. Fails if a global subscriber
/// is already installed.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_path = Config::log_path();
    let (Some(log_dir), Some(prefix)) = (log_path.parent(), log_path.file_name()) else {
        return Err(Error::Config(format!("invalid log path {:?}", log_path)));
    };

    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix.to_string_lossy())
        .max_log_files(config.max_files.max(1))
        .build(log_dir)
        .map_err(|e| Error::Config(format!("failed to create log appender: {}", e)))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(&config.level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {}", e)))?;

    tracing::info!(log_dir = %log_dir.display(), level = %config.level, "Logging initialized");

    Ok(LoggingGuard { _guard: guard })
}

/// Route logs to the test harness; repeated calls are ignored.
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives("warn")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Flushes buffered log lines when dropped; hold it until exit.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_keep_debug_target() {
        assert_eq!(directives("warn"), "warn,patrack::debug=info");
        assert!(EnvFilter::try_new(directives("error")).is_ok());
    }

    #[test]
    fn test_init_test_is_repeatable() {
        init_test();
        init_test();
        tracing::info!(target: DEBUG_TARGET, "still logging");
    }
}
