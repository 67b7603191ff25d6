//! Tracing setup for Tidesim
//!
//! Console output follows the user's level. Every run also leaves a log file
//! named after it, so `scenario c` and `flow` runs do not overwrite each other.
//! The file keeps everything except the per-event scheduler trace, which is
//! only written when the user asks for `trace`.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::TidesimError;

/// Module path of the event loop, which traces every executed event.
pub const SCHEDULER_TARGET: &str = "tidesim_core::scheduler";

/// Installs the console layer and the per-run file layer.
///
/// `run_name` picks the file, `<logs_dir>/tidesim-<run_name>.log` (logs dir
/// defaults to `./logs`); the previous log of the same run is overwritten.
/// Returns the path of the log file.
///
/// # Errors
///
/// - `TidesimError::Logging` - If the logs directory or file cannot be created, or a global subscriber is already installed
pub fn init_tracing(
    console_level: CliLogLevel,
    logs_dir: Option<&Path>,
    run_name: &str,
) -> Result<PathBuf, TidesimError> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path).map_err(|e| TidesimError::Logging {
        reason: format!("cannot create {}: {e}", logs_path.display()),
    })?;

    let log_file_path = logs_path.join(log_file_name(run_name));
    let log_file = File::create(&log_file_path).map_err(|e| TidesimError::Logging {
        reason: format!("cannot create {}: {e}", log_file_path.display()),
    })?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.as_tracing_level().to_string()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new(file_directives(console_level)));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| TidesimError::Logging {
            reason: e.to_string(),
        })?;

    tracing::info!(
        run = run_name,
        console = %console_level.as_tracing_level(),
        trace_file = %log_file_path.display(),
        "Tracing initialized"
    );

    Ok(log_file_path)
}

/// File name of the log for a run, with anything but `[A-Za-z0-9_-]` replaced.
pub fn log_file_name(run_name: &str) -> String {
    let slug: String = run_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if slug.is_empty() {
        "tidesim-run.log".to_string()
    } else {
        format!("tidesim-{slug}.log")
    }
}

/// Filter directives of the file layer.
pub fn file_directives(console_level: CliLogLevel) -> String {
    match console_level {
        CliLogLevel::Trace => "trace".to_string(),
        _ => format!("trace,{SCHEDULER_TARGET}=debug"),
    }
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    #[default]
    Warn,
    /// Informational, warning, and error messages
    Info,
    /// Transport state changes, losses and retransmissions
    Debug,
    /// All messages including per-event scheduler traces
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use tidesim_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(CliLogLevel::from_str("INFO", true), Ok(CliLogLevel::Info));
        assert_eq!(CliLogLevel::from_str("trace", false), Ok(CliLogLevel::Trace));
        assert!(CliLogLevel::from_str("loud", true).is_err());
    }

    #[test]
    fn test_log_file_named_after_run() {
        assert_eq!(log_file_name("scenario-c"), "tidesim-scenario-c.log");
        assert_eq!(log_file_name("Flow cubic/2"), "tidesim-flow-cubic-2.log");
        assert_eq!(log_file_name("  "), "tidesim-run.log");
    }

    #[test]
    fn test_scheduler_events_only_traced_on_request() {
        assert_eq!(file_directives(CliLogLevel::Trace), "trace");
        assert_eq!(
            file_directives(CliLogLevel::Warn),
            "trace,tidesim_core::scheduler=debug"
        );
        assert_eq!(
            file_directives(CliLogLevel::Debug),
            file_directives(CliLogLevel::Error)
        );
    }

    #[test]
    fn test_init_tracing_writes_run_log() {
        let dir = tempfile::tempdir().unwrap();

        // Another test in this binary may already own the global subscriber
        let result = init_tracing(CliLogLevel::Warn, Some(dir.path()), "scenario-a");

        assert!(dir.path().join("tidesim-scenario-a.log").exists());
        if let Ok(path) = result {
            assert_eq!(path, dir.path().join("tidesim-scenario-a.log"));
        } else {
            assert!(matches!(result, Err(TidesimError::Logging { .. })));
        }
    }
}
