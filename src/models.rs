//! Core data types flowing through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message event handed over by the chat transport.
///
/// Immutable; scoped to a single pipeline run.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub channel_title: String,
    pub channel_id: String,
    pub message_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    /// Opaque reference resolvable via `Transport::download_attachment`.
    #[serde(default)]
    pub attachment_ref: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Connection credentials extracted from a playlist URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub scheme: String,
}

impl Credentials {
    /// Build the player_api.php status-query URL.
    pub fn api_url(&self) -> String {
        format!(
            "{}://{}:{}/player_api.php?username={}&password={}",
            self.scheme,
            self.server,
            self.port,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
        )
    }

    /// Same URL with the password masked, safe for logging.
    pub fn redacted_api_url(&self) -> String {
        format!(
            "{}://{}:{}/player_api.php?username={}&password=***",
            self.scheme,
            self.server,
            self.port,
            urlencoding::encode(&self.username),
        )
    }
}

/// Outcome of probing one playlist URL. Set once, never mutated.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub accessible: bool,
    pub valid_format: bool,
    pub channel_count: u32,
    pub errors: Vec<String>,
}

/// Subscription metadata returned by the account-status endpoint.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub status: String,
    pub is_trial: String,
    pub active_connections: String,
    pub max_connections: String,
    pub created_at_raw: String,
    pub created_at: String,
    pub expires_at_raw: String,
    pub expires_at: String,
}

/// Raw shape of the player_api.php response.
#[derive(Debug, Deserialize)]
pub struct AccountStatusResponse {
    /// Absent user_info means the lookup failed even on HTTP 200.
    #[serde(default)]
    pub user_info: Option<UserInfo>,
}

// Servers disagree on number vs string for these fields, so every
// scalar goes through `scalar_to_string`.
#[derive(Debug, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    #[serde(default)]
    pub is_trial: Option<serde_json::Value>,
    #[serde(default)]
    pub active_cons: Option<serde_json::Value>,
    #[serde(default)]
    pub max_connections: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<serde_json::Value>,
    #[serde(default)]
    pub exp_date: Option<serde_json::Value>,
}

/// One persisted row of the record store. Field order is the CSV
/// column order and must not change.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub link_m3u: String,
    pub servidor: String,
    pub porta: u16,
    pub username: String,
    pub password: String,
    pub data_criacao: String,
    pub data_vencimento: String,
    pub total_canais: u32,
    pub status: String,
    pub data_teste: String,
    pub observacoes: String,
    pub canal_origem: String,
    pub mensagem_id: i64,
}

/// Source-channel descriptor nested into webhook payloads.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelRef {
    pub titulo: String,
    pub id: String,
}

/// Originating-message descriptor nested into webhook payloads.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRef {
    pub id: i64,
    pub data: DateTime<Utc>,
}

/// Account detail nested into validated-entry payloads.
#[derive(Debug, Clone, Serialize)]
pub struct AccountDetail {
    pub is_trial: String,
    pub active_cons: String,
    pub max_connections: String,
}

/// Envelope for a fully validated playlist delivered to the webhook.
/// Exists only for the duration of one delivery attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedEntryPayload {
    /// Discriminator, always `"lista_validada"`.
    pub tipo: &'static str,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub registro: Record,
    pub conta: AccountDetail,
    pub canal: ChannelRef,
    pub mensagem: MessageRef,
}

/// Envelope for a raw playlist body forwarded without validation.
#[derive(Debug, Clone, Serialize)]
pub struct RawContentPayload {
    /// Discriminator, always `"conteudo_bruto"`.
    pub tipo: &'static str,
    pub timestamp: DateTime<Utc>,
    pub arquivo: String,
    pub conteudo: String,
    pub canal: ChannelRef,
    pub mensagem: MessageRef,
}

impl UserInfo {
    /// Stringify a JSON scalar that servers send as either number or string.
    pub fn scalar_to_string(value: &Option<serde_json::Value>) -> String {
        match value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }
}
