//! The structured record emitted once per scope

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::severity::Severity;

/// Monitored resource descriptor attached to every record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource type (e.g. "global", "k8s_container")
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Resource {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Builder-style label insertion
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

impl Default for Resource {
    fn default() -> Self {
        Self::new("global")
    }
}

/// One aggregated log record
///
/// Field names follow the structured-logging entry layout consumed by
/// common log ingestion agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub insert_id: String,
    pub severity: Severity,
    pub labels: BTreeMap<String, String>,
    pub log_name: String,
    /// When the scope was created
    pub timestamp: DateTime<Utc>,
    /// When the scope was flushed
    pub receive_timestamp: DateTime<Utc>,
    pub resource: Resource,
    pub json_payload: serde_json::Value,
}

impl LogRecord {
    /// Encode as a single newline-terminated JSON line
    pub fn to_line(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}
