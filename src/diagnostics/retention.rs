//! Diagnostics file retention
//!
//! Only files named `opslog-*.log` are considered; record sinks and anything
//! else sharing the directory are left alone.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};

use super::LOG_FILE_PREFIX;

/// Default retention period in days
pub const DEFAULT_RETENTION_DAYS: u64 = 7;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Remove diagnostics files older than [`DEFAULT_RETENTION_DAYS`]
pub fn cleanup_old_logs(logs_dir: &Path) -> Result<usize> {
    cleanup_old_logs_with_retention(logs_dir, DEFAULT_RETENTION_DAYS)
}

/// Remove diagnostics files last modified before `retention_days` ago
///
/// Returns how many files were deleted. A missing directory is not an error.
pub fn cleanup_old_logs_with_retention(logs_dir: &Path, retention_days: u64) -> Result<usize> {
    if !logs_dir.exists() {
        return Ok(0);
    }

    let cutoff = retention_cutoff(SystemTime::now(), retention_days);
    let entries = fs::read_dir(logs_dir)
        .with_context(|| format!("Failed to read {}", logs_dir.display()))?;

    let removed = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| is_diagnostics_file(&entry.path()))
        .filter(|entry| {
            entry
                .metadata()
                .and_then(|meta| meta.modified())
                .is_ok_and(|modified| modified < cutoff)
        })
        .filter(|entry| fs::remove_file(entry.path()).is_ok())
        .count();

    Ok(removed)
}

/// Oldest modification time that survives cleanup
///
/// Saturates at the epoch, so an oversized retention keeps everything.
fn retention_cutoff(now: SystemTime, retention_days: u64) -> SystemTime {
    retention_days
        .checked_mul(SECS_PER_DAY)
        .and_then(|secs| now.checked_sub(Duration::from_secs(secs)))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn is_diagnostics_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log"))
}
