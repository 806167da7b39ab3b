//! Error types for opslog

use thiserror::Error;

/// Errors surfaced by scope operations and flushes
///
/// Every variant is local to one scope: a failed flush drops that scope's
/// record and leaves every other buffer and watcher untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// A structured value or the composed record could not be encoded as JSON
    #[error("failed to serialize log payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The output sink rejected the write (closed stdout, full disk, ...)
    #[error("failed to write log record: {0}")]
    Sink(#[from] std::io::Error),

    /// Configuration was readable but semantically invalid
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;
