//! Functional health probe.
//!
//! Asks the emulator itself whether it serves requests, via
//! `GET {endpoint}/_localstack/health`:
//!
//! ```json
//! {"services": {"sqs": "running", "s3": "available", "kinesis": "disabled"}}
//! ```
//!
//! The emulator counts as functional when the request succeeds and at least
//! one service is `running` or `available`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::FixtureError;

/// Health endpoint path relative to the base URL.
pub const HEALTH_PATH: &str = "/_localstack/health";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    services: BTreeMap<String, String>,
}

/// Returns true if any service reports `running` or `available`.
pub fn any_service_up(services: &BTreeMap<String, String>) -> bool {
    services
        .values()
        .any(|status| matches!(status.as_str(), "running" | "available"))
}

/// HTTP client for the emulator's health endpoint.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    base_url: String,
    http_client: reqwest::Client,
}

impl HealthProbe {
    /// Creates a probe for `base_url` (`http://host:port`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http_client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn health_url(&self) -> String {
        format!("{}{HEALTH_PATH}", self.base_url)
    }

    /// Fetches the per-service status map.
    ///
    /// # Errors
    ///
    /// `FixtureError::Health` on transport failure, non-success status or an
    /// unparsable body.
    pub async fn services(&self) -> Result<BTreeMap<String, String>, FixtureError> {
        let response = self
            .http_client
            .get(self.health_url())
            .send()
            .await
            .map_err(|e| FixtureError::Health(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FixtureError::Health(format!("health endpoint returned {status}")));
        }

        let body = response
            .json::<HealthResponse>()
            .await
            .map_err(|e| FixtureError::Health(format!("unexpected health response: {e}")))?;
        Ok(body.services)
    }

    /// True if the emulator answers and at least one service is up.
    pub async fn is_functional(&self) -> bool {
        match self.services().await {
            Ok(services) => any_service_up(&services),
            Err(e) => {
                debug!(url = %self.base_url, error = %e, "functional probe failed");
                false
            }
        }
    }
}
