// src/logging.rs
//
// tracing subscriber setup. The TUI logs to a timestamped file so log lines
// never land on the terminal it draws; headless commands log to stderr.
// Both honour RUST_LOG and default to `info`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

use crate::error::{MonitorError, Result};

/// Symlink pointing at the newest log file (Unix only)
const LATEST_LOG_NAME: &str = "serialmon.log";

/// `HH:MM:SS.mmm` local time on every line
fn timer() -> ChronoLocal {
    ChronoLocal::new("%H:%M:%S%.3f".to_string())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Create a timestamped log file in `log_dir` and point the
/// `serialmon.log` symlink at it.
pub fn create_log_file(log_dir: &Path) -> Result<(File, PathBuf)> {
    std::fs::create_dir_all(log_dir)?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-serialmon.log")
        .to_string();
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Windows symlinks require elevated privileges
    #[cfg(unix)]
    {
        let symlink_path = log_dir.join(LATEST_LOG_NAME);
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            eprintln!("[logging] Failed to create {} symlink: {}", LATEST_LOG_NAME, e);
        }
    }

    Ok((file, log_path))
}

/// Install a subscriber writing to a new log file in `log_dir`.
/// Returns the path of the file.
pub fn init_file_logging(log_dir: &Path) -> Result<PathBuf> {
    let (file, log_path) = create_log_file(log_dir)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_timer(timer())
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| MonitorError::Io(std::io::Error::other(e.to_string())))?;

    tracing::info!("[logging] File logging started: {}", log_path.display());
    Ok(log_path)
}

/// Install a subscriber writing to stderr. A no-op if one is already set.
pub fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_timer(timer())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_log_file_in_new_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let (_file, path) = create_log_file(&log_dir).unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("-serialmon.log")));
    }

    #[cfg(unix)]
    #[test]
    fn test_latest_symlink_points_at_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let (_file, path) = create_log_file(dir.path()).unwrap();

        let target = std::fs::read_link(dir.path().join(LATEST_LOG_NAME)).unwrap();
        assert_eq!(Some(target.as_os_str()), path.file_name());
    }
}
