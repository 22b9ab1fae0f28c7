//! Host events delivered to the tracer.
//!
//! A [`HostEvent`] is the Rust shape of what a host runtime hands to its error
//! listeners: an uncaught error with an optional script location, or a promise-like
//! rejection carrying a reason. Events are tagged with the [`Trigger`] they were
//! dispatched under.

use crate::error::{ErrorTraceError, ERRORTRACE_CODE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A host runtime event kind a tracer can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Uncaught error
    Error,
    /// Rejection with no handler attached
    UnhandledRejection,
    /// Rejection that got a handler attached late
    RejectionHandled,
}

impl Trigger {
    /// All triggers, in the order they are registered by default
    pub const ALL: [Trigger; 3] = [
        Trigger::Error,
        Trigger::UnhandledRejection,
        Trigger::RejectionHandled,
    ];

    /// The host event name for this trigger
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Error => "error",
            Trigger::UnhandledRejection => "unhandledrejection",
            Trigger::RejectionHandled => "rejectionhandled",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = ErrorTraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "error" => Ok(Trigger::Error),
            "unhandledrejection" => Ok(Trigger::UnhandledRejection),
            "rejectionhandled" => Ok(Trigger::RejectionHandled),
            other => Err(ErrorTraceError::ConfigError(format!("unknown trigger: {}", other))),
        }
    }
}

/// Reason attached to a rejection event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionReason {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl RejectionReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Whether the reason was produced by the tracer's own transport layer
    pub fn is_internal(&self) -> bool {
        self.code.as_deref() == Some(ERRORTRACE_CODE)
    }
}

impl From<&ErrorTraceError> for RejectionReason {
    fn from(err: &ErrorTraceError) -> Self {
        Self {
            code: err.code().map(String::from),
            message: err.to_string(),
            detail: None,
        }
    }
}

/// An error or rejection event as dispatched by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEvent {
    #[serde(rename = "type")]
    pub kind: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colno: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
}

impl HostEvent {
    fn empty(kind: Trigger) -> Self {
        Self {
            kind,
            message: None,
            filename: None,
            lineno: None,
            colno: None,
            error: None,
            reason: None,
        }
    }

    /// An uncaught error event
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::empty(Trigger::Error)
        }
    }

    /// A rejection that nobody handled
    pub fn unhandled_rejection(reason: RejectionReason) -> Self {
        Self {
            reason: Some(reason),
            ..Self::empty(Trigger::UnhandledRejection)
        }
    }

    /// A rejection whose handler was attached after it was reported unhandled
    pub fn rejection_handled(reason: RejectionReason) -> Self {
        Self {
            reason: Some(reason),
            ..Self::empty(Trigger::RejectionHandled)
        }
    }

    /// Attach the script location the error was raised from
    pub fn with_location(mut self, filename: impl Into<String>, lineno: u32, colno: u32) -> Self {
        self.filename = Some(filename.into());
        self.lineno = Some(lineno);
        self.colno = Some(colno);
        self
    }

    /// Attach the raw error payload
    pub fn with_error(mut self, error: Value) -> Self {
        self.error = Some(error);
        self
    }

    /// The script filename and line number, when both are usable for a source lookup
    pub fn source_location(&self) -> Option<(&str, u32)> {
        match (self.filename.as_deref(), self.lineno) {
            (Some(filename), Some(lineno)) if !filename.is_empty() && lineno > 0 => {
                Some((filename, lineno))
            }
            _ => None,
        }
    }

    /// Whether this event is the tracer's own transport failure coming back around
    pub fn is_internal(&self) -> bool {
        self.reason.as_ref().is_some_and(RejectionReason::is_internal)
    }
}

/// What a listener asks the dispatcher to do with the event's default handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    PreventDefault,
}
