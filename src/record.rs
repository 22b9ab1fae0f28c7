//! Error records produced by the tracer.
//!
//! An [`ErrorRecord`] is the enriched, serializable form of one captured error. Its
//! JSON shape is what the remote reporter sends to the collection endpoint.

use crate::event::HostEvent;
use crate::source::SourceLine;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Snapshot of a key/value storage area
pub type StorageSnapshot = BTreeMap<String, String>;

/// Information about the client the error happened on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigator {
    pub user_agent: String,
    pub platform: String,
    pub language: String,
    pub on_line: bool,
}

/// Environment captured alongside an error
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub navigator: Navigator,
    pub local_storage: StorageSnapshot,
    pub session_storage: StorageSnapshot,
    pub cookie: String,
}

/// One captured error occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Deterministic id derived from the error content and the client id
    pub error_id: Uuid,
    pub client_id: Uuid,
    /// URI of the document the error happened in
    pub location: String,
    /// The triggering event
    pub error: HostEvent,
    pub environment: Environment,
    /// Capture instant in milliseconds since the Unix epoch
    #[serde(rename = "timeStamp")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Vec<SourceLine>>,
    #[serde(rename = "errorLineNo", default, skip_serializing_if = "Option::is_none")]
    pub error_line_number: Option<u32>,
}

impl ErrorRecord {
    /// Get a formatted one-line summary of the record
    pub fn printable_summary(&self) -> String {
        let time_str = DateTime::from_timestamp_millis(self.timestamp)
            .map(|dt| dt.with_timezone(&Local).format("%H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| self.timestamp.to_string());

        let what = self
            .error
            .message
            .as_deref()
            .or_else(|| self.error.reason.as_ref().map(|r| r.message.as_str()))
            .unwrap_or("<no message>");

        let mut summary = format!("[{}] {} {}: {}", time_str, self.error_id, self.error.kind, what);

        if let (Some(filename), Some(line)) = (self.error.filename.as_deref(), self.error_line_number) {
            summary.push_str(&format!(" ({}:{})", filename, line));
        }

        summary
    }
}
