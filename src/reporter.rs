//! Remote reporter.
//!
//! Sends error records to a collection endpoint. Delivery is best-effort: one POST
//! per record, no retry. Every failure is tagged so the tracer can tell its own
//! transport errors apart from the errors it is tracing.

use crate::error::{ErrorTraceError, Result};
use crate::record::ErrorRecord;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

/// Posts serialized records to an endpoint
#[derive(Debug, Clone)]
pub struct RemoteReporter {
    client: Client,
}

impl RemoteReporter {
    /// Create a reporter with a default HTTP client
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a reporter sharing an existing HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Send one record to `api_url`
    ///
    /// The body is the JSON-serialized record, sent as `text/plain` with caching
    /// disabled. Redirects are followed.
    pub async fn report(&self, api_url: &str, record: &ErrorRecord) -> Result<StatusCode> {
        let body = serde_json::to_string(record)?;
        debug!("Reporting error {} to {} ({} bytes)", record.error_id, api_url, body.len());

        let response = self
            .client
            .post(api_url)
            .header(CONTENT_TYPE, "text/plain")
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ErrorTraceError::ReportError {
                url: api_url.to_string(),
                status: status.as_u16(),
            });
        }

        info!("Reported error {} to {}", record.error_id, api_url);
        Ok(status)
    }
}

impl Default for RemoteReporter {
    fn default() -> Self {
        Self::new()
    }
}
