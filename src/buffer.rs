//! Per-scope log buffer
//!
//! Accumulates messages, structured values and metadata for one scope until
//! it is flushed. The buffer itself is not synchronized; the registry wraps
//! each one in a mutex.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::record::{LogRecord, Resource};
use crate::severity::Severity;

/// Metadata every new buffer starts from
#[derive(Debug, Clone, Default)]
pub struct BufferDefaults {
    /// Severity for plain appends and for records with no appends at all
    pub default_severity: Severity,
    pub log_name: String,
    pub resource: Resource,
    pub labels: BTreeMap<String, String>,
}

/// Messages and metadata collected for one scope
#[derive(Debug)]
pub struct LogBuffer {
    created_at: DateTime<Utc>,
    insert_id: String,
    log_name: String,
    resource: Resource,
    labels: BTreeMap<String, String>,
    default_severity: Severity,
    severity: Option<Severity>,
    messages: Vec<String>,
    payload: Vec<Value>,
    /// Set once the buffer has been taken by a flush
    sealed: bool,
}

impl LogBuffer {
    pub fn new(defaults: &BufferDefaults) -> Self {
        Self {
            created_at: Utc::now(),
            insert_id: Uuid::new_v4().to_string(),
            log_name: defaults.log_name.clone(),
            resource: defaults.resource.clone(),
            labels: defaults.labels.clone(),
            default_severity: defaults.default_severity,
            severity: None,
            messages: Vec::new(),
            payload: Vec::new(),
            sealed: false,
        }
    }

    /// Append a message and raise the aggregate severity
    ///
    /// Line breaks are removed so the record stays on one line.
    pub fn append(&mut self, message: &str, severity: Severity) {
        self.messages.push(message.replace(['\n', '\r'], ""));
        self.severity = Some(Severity::raise(self.severity, severity));
    }

    /// Append a message at the buffer's default severity
    pub fn append_default(&mut self, message: &str) {
        self.append(message, self.default_severity);
    }

    /// Append a structured value to the payload
    ///
    /// Does not touch the severity. A value that cannot be represented as
    /// JSON is rejected and the buffer is left unchanged.
    pub fn append_structured<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        self.payload.push(value);
        Ok(())
    }

    /// Set the log name; last write before flush wins
    pub fn set_category(&mut self, name: impl Into<String>) {
        self.log_name = name.into();
    }

    pub fn set_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    /// Current aggregate, or the default when nothing was appended yet
    pub fn severity(&self) -> Severity {
        self.severity.unwrap_or(self.default_severity)
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn payload(&self) -> &[Value] {
        &self.payload
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    pub fn insert_id(&self) -> &str {
        &self.insert_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Seal the buffer without producing a record
    pub fn discard(&mut self) {
        self.sealed = true;
        self.messages.clear();
        self.payload.clear();
    }

    /// Seal the buffer and compose its record
    ///
    /// Returns `None` if the buffer was already sealed, so a buffer yields at
    /// most one record.
    pub fn seal(&mut self, received_at: DateTime<Utc>) -> Option<LogRecord> {
        if self.sealed {
            return None;
        }
        self.sealed = true;

        let messages = std::mem::take(&mut self.messages);
        let payload = std::mem::take(&mut self.payload);

        Some(LogRecord {
            insert_id: self.insert_id.clone(),
            severity: self.severity(),
            labels: self.labels.clone(),
            log_name: self.log_name.clone(),
            timestamp: self.created_at,
            receive_timestamp: received_at,
            resource: self.resource.clone(),
            json_payload: compose_payload(messages, payload),
        })
    }
}

/// Build the record's main content field
fn compose_payload(messages: Vec<String>, mut payload: Vec<Value>) -> Value {
    match (messages.is_empty(), payload.len()) {
        (_, 0) => Value::from(messages),
        (true, 1) => payload.remove(0),
        (true, _) => Value::Array(payload),
        (false, _) => serde_json::json!({
            "messages": messages,
            "payload": payload,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn defaults() -> BufferDefaults {
        BufferDefaults {
            default_severity: Severity::Info,
            log_name: "opslog".to_string(),
            resource: Resource::default(),
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn test_append_preserves_order() {
        let mut buffer = LogBuffer::new(&defaults());
        for i in 0..5 {
            buffer.append(&format!("msg {}", i), Severity::Info);
        }

        let record = buffer.seal(Utc::now()).unwrap();
        assert_eq!(
            record.json_payload,
            json!(["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"])
        );
    }

    #[test]
    fn test_append_strips_newlines() {
        let mut buffer = LogBuffer::new(&defaults());
        buffer.append("line one\nline two\r\n", Severity::Info);
        assert_eq!(buffer.messages(), ["line oneline two"]);
    }

    #[test]
    fn test_severity_aggregates_highest() {
        let mut buffer = LogBuffer::new(&defaults());
        buffer.append("hello", Severity::Info);
        buffer.append("oops", Severity::Error);
        buffer.append("fine again", Severity::Debug);

        assert_eq!(buffer.severity(), Severity::Error);
    }

    #[test]
    fn test_default_severity_applies() {
        let mut custom = defaults();
        custom.default_severity = Severity::Warning;

        let empty = LogBuffer::new(&custom);
        assert_eq!(empty.severity(), Severity::Warning);

        let mut buffer = LogBuffer::new(&custom);
        buffer.append_default("plain");
        buffer.append("detail", Severity::Debug);
        assert_eq!(buffer.severity(), Severity::Warning);
    }

    #[test]
    fn test_structured_payload_only() {
        let mut buffer = LogBuffer::new(&defaults());
        buffer
            .append_structured(&json!({"user": "alice", "status": 200}))
            .unwrap();

        let record = buffer.seal(Utc::now()).unwrap();
        assert_eq!(record.json_payload, json!({"user": "alice", "status": 200}));
        assert_eq!(record.severity, Severity::Info);
    }

    #[test]
    fn test_multiple_structured_values() {
        let mut buffer = LogBuffer::new(&defaults());
        buffer.append_structured(&("step", 1)).unwrap();
        buffer.append_structured(&("step", 2)).unwrap();

        let record = buffer.seal(Utc::now()).unwrap();
        assert_eq!(record.json_payload, json!([["step", 1], ["step", 2]]));
    }

    #[test]
    fn test_messages_and_payload_combined() {
        let mut buffer = LogBuffer::new(&defaults());
        buffer.append("started", Severity::Info);
        buffer.append_structured(&json!({"rows": 3})).unwrap();

        let record = buffer.seal(Utc::now()).unwrap();
        assert_eq!(
            record.json_payload,
            json!({"messages": ["started"], "payload": [{"rows": 3}]})
        );
    }

    #[test]
    fn test_non_representable_value_is_rejected() {
        let mut buffer = LogBuffer::new(&defaults());
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], "non-string key");

        assert!(buffer.append_structured(&bad).is_err());
        assert!(buffer.payload().is_empty());

        buffer.append("still usable", Severity::Info);
        assert_eq!(buffer.messages().len(), 1);
    }

    #[test]
    fn test_set_category_last_write_wins() {
        let mut buffer = LogBuffer::new(&defaults());
        buffer.set_category("requests");
        buffer.set_category("jobs");
        buffer.set_label("worker", "7");

        let record = buffer.seal(Utc::now()).unwrap();
        assert_eq!(record.log_name, "jobs");
        assert_eq!(record.labels.get("worker").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_seal_yields_one_record() {
        let mut buffer = LogBuffer::new(&defaults());
        buffer.append("once", Severity::Info);

        let received = Utc::now();
        let record = buffer.seal(received).unwrap();
        assert_eq!(record.insert_id, buffer.insert_id());
        assert_eq!(record.timestamp, buffer.created_at());
        assert_eq!(record.receive_timestamp, received);
        assert!(buffer.is_sealed());
        assert!(buffer.seal(Utc::now()).is_none());
    }

    #[test]
    fn test_discarded_buffer_yields_nothing() {
        let mut buffer = LogBuffer::new(&defaults());
        buffer.append("dropped", Severity::Error);
        buffer.discard();

        assert!(buffer.is_sealed());
        assert!(buffer.messages().is_empty());
        assert!(buffer.seal(Utc::now()).is_none());
    }

    #[test]
    fn test_empty_buffer_records_empty_array() {
        let mut buffer = LogBuffer::new(&defaults());
        let record = buffer.seal(Utc::now()).unwrap();
        assert_eq!(record.json_payload, json!([]));
    }
}
