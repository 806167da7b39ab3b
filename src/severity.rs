//! Severity levels and highest-wins aggregation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ordinal log severity
///
/// Variants are declared lowest first so the derived `Ord` is the ranking
/// used for aggregation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Get the wire name for this severity
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Fold one more severity into a running aggregate
    ///
    /// Equal severities keep the current aggregate.
    pub fn raise(current: Option<Severity>, next: Severity) -> Severity {
        match current {
            Some(current) if current >= next => current,
            _ => next,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARNING" | "WARN" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::WARN => Severity::Warning,
            tracing::Level::ERROR => Severity::Error,
        }
    }
}

/// Aggregate a sequence of severities, highest wins
///
/// Returns `None` for an empty sequence.
pub fn aggregate<I>(severities: I) -> Option<Severity>
where
    I: IntoIterator<Item = Severity>,
{
    severities
        .into_iter()
        .fold(None, |acc, next| Some(Severity::raise(acc, next)))
}
