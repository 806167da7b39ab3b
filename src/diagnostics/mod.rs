//! Diagnostic logging for opslog itself
//!
//! Watcher lifecycle and flush failures are reported through `tracing`. This
//! module installs the subscriber for them: stderr by default, or timestamped
//! files with retention when a log directory is configured. Stdout is left
//! to the record sink.

mod retention;

pub use retention::{cleanup_old_logs, cleanup_old_logs_with_retention, DEFAULT_RETENTION_DAYS};

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::DiagnosticsConfig;

/// File name prefix shared by log creation and retention
pub(crate) const LOG_FILE_PREFIX: &str = "opslog-";

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "opslog=info";

/// Where diagnostics are being written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticsTarget {
    Stderr,
    File(PathBuf),
}

/// Generate a timestamped diagnostics file path
pub fn create_log_file_path(logs_dir: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    logs_dir.join(format!("{}{}.log", LOG_FILE_PREFIX, timestamp))
}

/// Install the global diagnostics subscriber
///
/// Fails if a global subscriber is already set.
pub fn init(config: &DiagnosticsConfig) -> Result<DiagnosticsTarget> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let (target, removed, file_layer, stderr_layer) = match &config.log_dir {
        Some(logs_dir) => {
            fs::create_dir_all(logs_dir).context("Failed to create diagnostics directory")?;
            let removed = cleanup_old_logs_with_retention(logs_dir, config.retention_days)?;

            let log_path = create_log_file_path(logs_dir);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .context("Failed to open diagnostics file")?;

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true);

            (DiagnosticsTarget::File(log_path), removed, Some(layer), None)
        }
        None => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true);
            (DiagnosticsTarget::Stderr, 0, None, Some(layer))
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Failed to install diagnostics subscriber")?;

    if removed > 0 {
        tracing::info!("Cleaned up {} old diagnostics files", removed);
    }
    Ok(target)
}
