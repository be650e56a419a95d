//! Logging setup
//!
//! Logs go to stderr and to a daily-rolling file under the configured log
//! directory. `RUST_LOG` takes precedence over the configured level.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log files older than this are removed at startup
const MAX_LOG_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 3);

/// Keeps the file writer flushing until dropped
#[allow(dead_code)]
pub struct LoggerGuard(Option<WorkerGuard>);

/// Parses a level name, defaulting to `info`
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(std::env::var("RUST_LOG").unwrap_or_default())
}

/// Installs the global subscriber
///
/// Falls back to stderr only when the log directory cannot be used.
pub fn init_logging(log_dir: &Path, prefix: &str, level: &str) -> LoggerGuard {
    let level = parse_level(level);

    let file_appender = fs::create_dir_all(log_dir).ok().and_then(|_| {
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .build(log_dir)
            .ok()
    });

    match file_appender {
        Some(appender) => {
            let (non_blocking, guard) = NonBlocking::new(appender);
            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter(level));

            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter(level));

            tracing_subscriber::registry()
                .with(file_layer)
                .with(stderr_layer)
                .init();

            if let Err(e) = cleanup_old_logs(log_dir, prefix, MAX_LOG_AGE) {
                tracing::warn!("Failed to delete old log file: {}", e);
            }
            LoggerGuard(Some(guard))
        }
        None => {
            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter(level));

            tracing_subscriber::registry().with(stderr_layer).init();
            tracing::warn!(
                "Could not open log directory {}, logging to stderr only",
                log_dir.display()
            );
            LoggerGuard(None)
        }
    }
}

/// Removes `<prefix>*.log` files whose modification time is older than `max_age`
pub fn cleanup_old_logs(log_dir: &Path, prefix: &str, max_age: Duration) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !(file_name.starts_with(prefix) && file_name.ends_with(".log")) {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        if now.duration_since(modified).unwrap_or_default() > max_age {
            fs::remove_file(&path)?;
            tracing::info!("Old log file deleted: {}", file_name);
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::DEBUG);
        assert_eq!(parse_level(" WARN "), LevelFilter::WARN);
        assert_eq!(parse_level("verbose"), LevelFilter::INFO);
    }

    #[test]
    fn test_cleanup_only_removes_old_matching_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let old = temp_dir.path().join("matchstats.2024-01-01.log");
        let fresh = temp_dir.path().join("matchstats.2024-01-05.log");
        let other = temp_dir.path().join("notes.log");
        for path in [&old, &fresh, &other] {
            fs::write(path, "line").unwrap();
        }
        let week_ago = SystemTime::now() - Duration::from_secs(7 * 24 * 60 * 60);
        for path in [&old, &other] {
            fs::File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(week_ago)
                .unwrap();
        }

        let removed = cleanup_old_logs(temp_dir.path(), "matchstats", MAX_LOG_AGE)
            .expect("Cleanup should succeed");

        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(other.exists());
    }
}
