//! Logging setup for the `proofpack` binary.
//!
//! Console output is always on. When [`LoggingSettings::log_dir`] is set,
//! two daily-rotating files are written there as well:
//!
//! - `proofpack.<date>.log`: everything the filter lets through
//! - `error.<date>.log`: warnings and errors only
//!
//! `RUST_LOG` overrides the default `info` filter.
//!
//! ```no_run
//! use proofpack::config::LoggingSettings;
//!
//! proofpack::logging::init(&LoggingSettings::default()).expect("logging");
//! tracing::info!("service started");
//! ```

use crate::config::LoggingSettings;
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const MAX_LOG_FILES: usize = 10;

/// Create `dir` if needed and return it.
///
/// # Errors
///
/// Returns error if the directory cannot be created.
pub fn ensure_log_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    }
    Ok(dir.to_path_buf())
}

fn appender(dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("Failed to create {prefix} log appender"))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns error if the log directory or file appenders cannot be created,
/// or a subscriber is already installed.
pub fn init(settings: &LoggingSettings) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")?;

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .pretty();

    let file_layers = match &settings.log_dir {
        Some(dir) => {
            let dir = ensure_log_dir(dir)?;
            let all_logs = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(appender(&dir, "proofpack")?);
            let error_logs = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(appender(&dir, "error")?)
                .with_filter(EnvFilter::new("warn"));
            Some(all_logs.and_then(error_logs))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    match &settings.log_dir {
        Some(dir) => tracing::info!(log_dir = %dir.display(), "logging initialized"),
        None => tracing::info!("logging initialized, console only"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_log_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a").join("logs");
        let created = ensure_log_dir(&dir).unwrap();
        assert!(created.is_dir());
        // Idempotent.
        ensure_log_dir(&dir).unwrap();
    }

    #[test]
    fn test_appender_writes_into_dir() {
        let tmp = tempfile::tempdir().unwrap();
        appender(tmp.path(), "proofpack").unwrap();
    }
}
