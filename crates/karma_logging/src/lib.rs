//! Shared logging setup for the karma bot.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "karma=info,karma_workflow=info,karma_session=info";

/// Logging configuration for karma binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file log on stderr instead of only warnings
    pub verbose: bool,
}

/// Initialize tracing with a daily log file and stderr output.
///
/// Keep the returned guard alive for as long as the process logs; dropping it
/// flushes the file writer. A missing log directory is not fatal: logging
/// falls back to stderr only.
pub fn init_logging(config: LogConfig<'_>) -> Option<WorkerGuard> {
    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    let mut guard = None;
    let mut fallback = None;
    let file_layer = match ensure_logs_dir() {
        Ok(log_dir) => {
            let appender = tracing_appender::rolling::daily(log_dir, log_file_name(config.app_name));
            let (writer, worker) = tracing_appender::non_blocking(appender);
            guard = Some(worker);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(file_filter),
            )
        }
        Err(err) => {
            fallback = Some(err);
            None
        }
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    if let Some(err) = fallback {
        tracing::warn!("Failed to create logs directory, logging to stderr only: {:#}", err);
    }

    guard
}

/// Get the karma home directory: `$KARMA_HOME`, or `~/.karma_bot`
pub fn karma_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("KARMA_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".karma_bot"))
        .ok_or_else(|| anyhow!("Could not determine home directory; set KARMA_HOME"))
}

/// Get the logs directory: `<karma home>/logs`
pub fn logs_dir() -> Result<PathBuf> {
    Ok(karma_home()?.join("logs"))
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    create_dir(&logs)?;
    Ok(logs)
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))
}

fn log_file_name(app_name: &str) -> String {
    let base: String = app_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    format!("{}.log", base)
}
