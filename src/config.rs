use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal configuration problems. Anything here aborts startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is mandatory and was not set")]
    Missing(&'static str),
    #[error("{0} must be numeric, got '{1}'")]
    NotNumeric(&'static str, String),
    #[error("CANAL_ORIGEM must list at least one source channel")]
    NoSourceChannel,
}

/// A single `original:replacement` substitution rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub from: String,
    pub to: String,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Transport credentials (opaque to the pipeline)
    pub api_id: i64,
    pub api_hash: String,

    // Source channels to watch
    pub source_channels: Vec<String>,

    // Webhook
    pub webhook_url: String,
    pub webhook_timeout_secs: u64,

    // Playlist / account-status requests
    pub iptv_timeout_secs: u64,

    // false selects the plain save-and-forward mode (no link testing)
    pub auto_test: bool,

    // Message filtering
    pub keywords: Vec<String>,
    pub blocked_words: Vec<String>,
    pub substitutions: Vec<Substitution>,

    // Duplicate-link policy for the record store (audit trail when true)
    pub record_duplicates: bool,

    // Base data directory; lists/ and the CSV live under it
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    ///
    /// `API_ID`, `API_HASH` and `CANAL_ORIGEM` are mandatory; a missing
    /// value is a fatal error reported to the caller.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_id_raw = env::var("API_ID").map_err(|_| ConfigError::Missing("API_ID"))?;
        let api_id = api_id_raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::NotNumeric("API_ID", api_id_raw.clone()))?;

        let api_hash = env::var("API_HASH").map_err(|_| ConfigError::Missing("API_HASH"))?;
        if api_hash.trim().is_empty() {
            return Err(ConfigError::Missing("API_HASH"));
        }

        let source_channels = split_list(
            &env::var("CANAL_ORIGEM").map_err(|_| ConfigError::Missing("CANAL_ORIGEM"))?,
        );
        if source_channels.is_empty() {
            return Err(ConfigError::NoSourceChannel);
        }

        Ok(Self {
            api_id,
            api_hash,
            source_channels,

            webhook_url: env::var("WEBHOOK_URL").unwrap_or_default(),
            webhook_timeout_secs: env::var("WEBHOOK_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),

            iptv_timeout_secs: env::var("IPTV_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            auto_test: env::var("TESTAR_AUTOMATICO")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),

            keywords: split_list(&env::var("PALAVRAS_CHAVE").unwrap_or_default()),
            blocked_words: split_list(&env::var("PALAVRAS_BLOQUEADAS").unwrap_or_default()),
            substitutions: parse_substitutions(&env::var("SUBSTITUICOES").unwrap_or_default()),

            record_duplicates: env::var("REGISTRAR_DUPLICADOS")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),

            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string())),
        })
    }

    /// Directory where raw playlist bodies are saved.
    pub fn lists_dir(&self) -> PathBuf {
        self.data_dir.join("lists")
    }

    /// Path of the append-only record store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("listas_testadas.csv")
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "sim"
    )
}

/// Split a comma-separated list, trimming entries and dropping empties.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse comma-separated `original:replacement` pairs, keeping order.
/// Entries without a `:` are ignored.
fn parse_substitutions(value: &str) -> Vec<Substitution> {
    value
        .split(',')
        .filter_map(|pair| {
            let (from, to) = pair.split_once(':')?;
            let from = from.trim();
            if from.is_empty() {
                return None;
            }
            Some(Substitution {
                from: from.to_string(),
                to: to.trim().to_string(),
            })
        })
        .collect()
}
