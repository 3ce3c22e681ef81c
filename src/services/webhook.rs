//! Best-effort delivery to the automation webhook.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info};

/// One-shot JSON POST dispatcher. No queueing, no retries.
pub struct WebhookDispatcher {
    http: Client,
    endpoint: Option<String>,
}

impl WebhookDispatcher {
    /// `endpoint` empty disables dispatch entirely.
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create HTTP client");
        let endpoint = Some(endpoint.trim().to_string()).filter(|e| !e.is_empty());
        Self { http, endpoint }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Deliver one payload. Only an HTTP 200 counts as success; any
    /// other status, network error or timeout is logged and reported
    /// as `false`. Never fatal to the caller.
    pub async fn send<T: Serialize>(&self, payload: &T) -> bool {
        let endpoint = match &self.endpoint {
            Some(url) => url,
            None => {
                debug!("webhook not configured, skipping dispatch");
                return false;
            }
        };

        let response = match self.http.post(endpoint).json(payload).send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = %e, "webhook delivery failed");
                return false;
            }
        };

        let status = response.status();
        if status.as_u16() == 200 {
            info!("webhook delivered");
            return true;
        }

        // Capture the error body for diagnostics; never parse it.
        let body = response.text().await.unwrap_or_default();
        error!(
            status = status.as_u16(),
            body = %super::truncate_body(&body, 500),
            "webhook rejected delivery"
        );
        false
    }
}
