//! Credential extraction and the account-status (player_api.php) client.

use std::time::Duration;

use chrono::{Local, TimeZone};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::models::{AccountInfo, AccountStatusResponse, Credentials, UserInfo};

/// Account-status lookup failures.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("invalid response: {0}")]
    Parse(String),
    #[error("response has no user_info")]
    MissingUserInfo,
}

/// Parse a playlist URL into connection credentials.
///
/// Both `username` and `password` must be present in the query string;
/// a missing parameter or an unparseable URL yields `None` (the caller
/// skips the link either way). Explicit ports win; otherwise 443 for
/// https and 80 for everything else. Scheme-less input is read as http.
pub fn extract_credentials(link: &str) -> Option<Credentials> {
    let normalized = if link.contains("://") {
        link.to_string()
    } else {
        format!("http://{link}")
    };

    let parsed = match Url::parse(&normalized) {
        Ok(url) => url,
        Err(e) => {
            debug!(error = %e, "failed to parse playlist URL");
            return None;
        }
    };

    let mut username = None;
    let mut password = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "username" => username = Some(value.into_owned()),
            "password" => password = Some(value.into_owned()),
            _ => {}
        }
    }

    let username = username.filter(|u| !u.is_empty())?;
    let password = password.filter(|p| !p.is_empty())?;

    let server = parsed.host_str()?.to_string();
    let scheme = parsed.scheme().to_string();
    let port = parsed
        .port()
        .unwrap_or(if scheme == "https" { 443 } else { 80 });

    Some(Credentials {
        server,
        port,
        username,
        password,
        scheme,
    })
}

/// Client for the remote account-status endpoint.
pub struct AccountStatusClient {
    http: Client,
}

impl AccountStatusClient {
    /// Build a client with the configured request timeout. Many IPTV
    /// servers run on self-signed certificates, so those are accepted.
    pub fn new(timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .expect("failed to create HTTP client");
        Self { http }
    }

    /// Query subscription metadata for a credential pair.
    ///
    /// A response without a `user_info` object counts as a failure even
    /// when the HTTP request itself succeeded.
    pub async fn get_account_info(&self, creds: &Credentials) -> Result<AccountInfo, AccountError> {
        debug!(url = %creds.redacted_api_url(), "querying account status");

        let response = self
            .http
            .get(creds.api_url())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AccountError::Network("timeout waiting for status endpoint".to_string())
                } else if e.is_connect() {
                    AccountError::Network("status endpoint unreachable".to_string())
                } else {
                    AccountError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AccountError::Http(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AccountError::Network(e.to_string()))?;

        let parsed: AccountStatusResponse = serde_json::from_str(&text).map_err(|e| {
            error!(error = %e, "failed to parse account-status response");
            debug!("response text: {}", super::truncate_body(&text, 500));
            AccountError::Parse(e.to_string())
        })?;

        let user_info = match parsed.user_info {
            Some(info) => info,
            None => {
                warn!(server = %creds.server, "account-status response has no user_info");
                return Err(AccountError::MissingUserInfo);
            }
        };

        let created_raw = UserInfo::scalar_to_string(&user_info.created_at);
        let expires_raw = UserInfo::scalar_to_string(&user_info.exp_date);

        let status = UserInfo::scalar_to_string(&user_info.status);
        let is_trial = UserInfo::scalar_to_string(&user_info.is_trial);

        Ok(AccountInfo {
            status: if status.is_empty() {
                "Unknown".to_string()
            } else {
                status
            },
            is_trial: if is_trial.is_empty() {
                "0".to_string()
            } else {
                is_trial
            },
            active_connections: UserInfo::scalar_to_string(&user_info.active_cons),
            max_connections: UserInfo::scalar_to_string(&user_info.max_connections),
            created_at: format_epoch(&created_raw),
            created_at_raw: created_raw,
            expires_at: format_epoch(&expires_raw),
            expires_at_raw: expires_raw,
        })
    }
}

/// Render an epoch-seconds string as a local date-time, or `"N/A"` for
/// anything empty, zero, negative or non-numeric.
pub fn format_epoch(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "0" {
        return "N/A".to_string();
    }
    match trimmed.parse::<i64>() {
        Ok(secs) if secs > 0 => match Local.timestamp_opt(secs, 0) {
            chrono::LocalResult::Single(dt) => dt.format("%d/%m/%Y %H:%M").to_string(),
            _ => "N/A".to_string(),
        },
        _ => "N/A".to_string(),
    }
}
