//! Error types and result aliases for the errortrace library.
//!
//! This module defines the core error type [`ErrorTraceError`] and the [`Result`] type alias
//! used throughout the library. Errors raised by the source fetcher and the remote reporter
//! carry the [`ERRORTRACE_CODE`] tag so the tracer can recognise its own failures when the
//! host surfaces them again as events.

use thiserror::Error;

/// Tag carried by every failure produced by the tracer's own network and text handling.
pub const ERRORTRACE_CODE: &str = "ERRORTRACE";

#[derive(Error, Debug)]
pub enum ErrorTraceError {
    #[error("Source fetch failed for {url}: HTTP {status}")]
    FetchError { url: String, status: u16 },

    #[error("Report rejected by {url}: HTTP {status}")]
    ReportError { url: String, status: u16 },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Local source read not permitted: {0}")]
    SourceDenied(String),

    #[error("Source slicing failed: {0}")]
    SliceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Handler failure: {0}")]
    HandlerError(String),
}

impl ErrorTraceError {
    /// The stable tag of this error, if it originates from the tracer's transport layer.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::FetchError { .. }
            | Self::ReportError { .. }
            | Self::HttpError(_)
            | Self::IoError(_)
            | Self::SourceDenied(_)
            | Self::SliceError(_)
            | Self::SerializationError(_) => Some(ERRORTRACE_CODE),
            Self::ConfigError(_) | Self::HandlerError(_) => None,
        }
    }

    /// Whether this error carries the [`ERRORTRACE_CODE`] tag.
    pub fn is_transport(&self) -> bool {
        self.code().is_some()
    }
}

pub type Result<T> = std::result::Result<T, ErrorTraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = ErrorTraceError::FetchError {
            url: "http://localhost/app.js".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "Source fetch failed for http://localhost/app.js: HTTP 404");
    }

    #[test]
    fn test_report_error_display() {
        let err = ErrorTraceError::ReportError {
            url: "http://localhost/collect".to_string(),
            status: 500,
        };
        assert_eq!(err.to_string(), "Report rejected by http://localhost/collect: HTTP 500");
    }

    #[test]
    fn test_transport_errors_are_tagged() {
        let errors = vec![
            ErrorTraceError::FetchError {
                url: "a".to_string(),
                status: 404,
            },
            ErrorTraceError::ReportError {
                url: "b".to_string(),
                status: 503,
            },
            ErrorTraceError::SliceError("bad utf-8".to_string()),
            ErrorTraceError::SourceDenied("/etc/shadow".to_string()),
            ErrorTraceError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
        ];

        for err in errors {
            assert_eq!(err.code(), Some(ERRORTRACE_CODE));
            assert!(err.is_transport());
        }
    }

    #[test]
    fn test_internal_errors_are_untagged() {
        let err = ErrorTraceError::HandlerError("callback panicked".to_string());
        assert_eq!(err.code(), None);
        assert!(!err.is_transport());

        let err = ErrorTraceError::ConfigError("bad range".to_string());
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: ErrorTraceError = json_err.into();

        match err {
            ErrorTraceError::SerializationError(_) => {}
            _ => panic!("Expected SerializationError"),
        }
        assert!(err.is_transport());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ErrorTraceError = io_err.into();

        match err {
            ErrorTraceError::IoError(_) => {}
            _ => panic!("Expected IoError"),
        }
    }

    #[test]
    fn test_result_type() {
        let ok_result: Result<i32> = Ok(42);
        assert!(ok_result.is_ok());

        let err_result: Result<i32> = Err(ErrorTraceError::HandlerError("test".to_string()));
        assert!(err_result.is_err());
    }
}
