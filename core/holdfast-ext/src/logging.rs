//! Log setup for extension processes.
//!
//! Extensions have no terminal, so logs go to a daily file under
//! `<root>/logs/`. Stdout is reserved for notification requests; if the log
//! directory can't be created we fall back to stderr.
//!
//! `HOLDFAST_DEBUG_LOG=1` forces debug level. Otherwise `RUST_LOG` applies,
//! defaulting to `info`.

use fs_err as fs;
use holdfast_core::StorageConfig;
use std::env;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

const DEBUG_ENV_VAR: &str = "HOLDFAST_DEBUG_LOG";
const LOG_PREFIX: &str = "holdfast-ext";

/// Installs the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init(storage: &StorageConfig) -> Option<WorkerGuard> {
    let filter = env_filter(env::var(DEBUG_ENV_VAR).ok().as_deref());

    match file_writer(storage) {
        Ok((writer, guard)) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init();
            Some(guard)
        }
        Err(reason) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            tracing::debug!(reason = %reason, "File logging unavailable; using stderr");
            None
        }
    }
}

fn file_writer(storage: &StorageConfig) -> Result<(NonBlocking, WorkerGuard), String> {
    file_appender(storage).map(tracing_appender::non_blocking)
}

fn file_appender(storage: &StorageConfig) -> Result<RollingFileAppender, String> {
    let logs_dir = storage.logs_dir();
    fs::create_dir_all(&logs_dir).map_err(|e| e.to_string())?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .max_log_files(7)
        .build(&logs_dir)
        .map_err(|e| e.to_string())
}

fn debug_enabled(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "TRUE" | "yes" | "YES"))
}

fn env_filter(debug_value: Option<&str>) -> EnvFilter {
    if debug_enabled(debug_value) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_values() {
        assert!(debug_enabled(Some("1")));
        assert!(debug_enabled(Some("yes")));
        assert!(!debug_enabled(Some("0")));
        assert!(!debug_enabled(None));
    }

    #[test]
    fn test_file_appender_creates_logs_dir() {
        let temp = tempfile::tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        assert!(file_appender(&storage).is_ok());
        assert!(storage.logs_dir().is_dir());
    }

    #[test]
    fn test_error_line_reaches_log_file_once_guard_drops() {
        let temp = tempfile::tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        let (writer, guard) = file_writer(&storage).unwrap();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("info"))
            .with_writer(writer)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(command = "drain", "holdfast-ext failed");
        });
        drop(guard);

        let contents: String = std::fs::read_dir(storage.logs_dir())
            .unwrap()
            .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect();
        assert!(contents.contains("holdfast-ext failed"));
        assert!(contents.contains("ERROR"));
    }
}
