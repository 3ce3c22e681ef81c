//! Playlist reachability and format checks.

use std::io;
use std::time::Duration;

use reqwest::Client;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::models::ValidationResult;

/// Leading marker every valid playlist body must carry.
const PLAYLIST_MARKER: &str = "#EXTM3U";
/// Per-channel entry prefix used for counting.
const ENTRY_MARKER: &str = "#EXTINF:";

/// Probes playlist URLs with a bounded, single-attempt GET.
pub struct PlaylistValidator {
    http: Client,
}

impl PlaylistValidator {
    pub fn new(timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .expect("failed to create HTTP client");
        Self { http }
    }

    /// Fetch a playlist URL and classify it.
    ///
    /// The body streams through a line reader rather than buffering
    /// whole playlists in memory. Short-circuits per step: network
    /// failure stops at `accessible=false`; a body whose first
    /// non-blank line is not `#EXTM3U` stops at `valid_format=false`;
    /// otherwise `channel_count` is the number of `#EXTINF:` lines.
    pub async fn test_playlist(&self, url: &str) -> ValidationResult {
        let mut result = ValidationResult::default();

        let response = match self.http.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                result.errors.push(format!("request failed: {e}"));
                return result;
            }
        };

        if !response.status().is_success() {
            result.errors.push(format!("HTTP {}", response.status().as_u16()));
            return result;
        }

        result.accessible = true;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
        let mut lines = BufReader::new(StreamReader::new(stream)).lines();

        let mut saw_marker = false;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    result.errors.push(format!("read failed: {e}"));
                    break;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if !saw_marker {
                if !trimmed.starts_with(PLAYLIST_MARKER) {
                    debug!(url, "body does not start with {PLAYLIST_MARKER}");
                    result
                        .errors
                        .push(format!("body does not start with {PLAYLIST_MARKER}"));
                    return result;
                }
                saw_marker = true;
                result.valid_format = true;
                continue;
            }

            if trimmed.starts_with(ENTRY_MARKER) {
                result.channel_count += 1;
            }
        }

        if !saw_marker {
            result.errors.push("empty playlist body".to_string());
        }

        result
    }
}
