//! Tracing setup for the gateway.
//!
//! Every event goes to stdout. A second, ANSI-free copy is appended to `DOCQUERY_LOG_FILE`
//! (default `logs/docquery.log`) through a non-blocking writer.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_VAR: &str = "DOCQUERY_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/docquery.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (from `LOG_LEVEL`) selects the filter.
/// An unusable log file only disables the file copy.
pub fn init_tracing(default_level: &str) {
    let file_layer = open_log_writer(&log_file_path(std::env::var(LOG_FILE_VAR).ok())).map(
        |writer| {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .compact()
        },
    );

    tracing_subscriber::registry()
        .with(level_filter(default_level))
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .init();
}

fn level_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn log_file_path(configured: Option<String>) -> PathBuf {
    configured
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

fn open_log_writer(path: &Path) -> Option<NonBlocking> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("Cannot create log directory {}: {err}", parent.display());
            return None;
        }
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| eprintln!("Cannot open log file {}: {err}", path.display()))
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = FILE_GUARD.set(guard);
    Some(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_defaults_when_unset_or_blank() {
        assert_eq!(log_file_path(None), PathBuf::from("logs/docquery.log"));
        assert_eq!(
            log_file_path(Some("  ".into())),
            PathBuf::from("logs/docquery.log")
        );
        assert_eq!(
            log_file_path(Some("/var/log/gateway.log".into())),
            PathBuf::from("/var/log/gateway.log")
        );
    }

    #[test]
    fn log_writer_creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("gateway.log");
        assert!(open_log_writer(&path).is_some());
        assert!(path.exists());
    }
}
