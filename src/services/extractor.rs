//! Playlist link detection in raw message text.
//!
//! Pure string processing; no network access.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

lazy_static! {
    /// Generic URL candidate pattern; the per-rule checks below decide
    /// whether a candidate looks like a playlist link.
    static ref URL_RE: Regex =
        Regex::new(r#"(?i)https?://[^\s<>"'`\[\]{}]+"#).unwrap();
}

/// Extract playlist URLs from free-form text.
///
/// A candidate URL is kept when it matches at least one of:
/// - a playlist-generation endpoint (`get.php`) carrying a `type=` marker,
/// - a path ending in a playlist extension (`.m3u` / `.m3u8`),
/// - a query string with both `username` and `password` parameters.
///
/// Results keep first-occurrence order and are deduplicated within the
/// message, so a URL matching several rules appears exactly once.
pub fn extract(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for m in URL_RE.find_iter(text) {
        let candidate = m.as_str().trim_end_matches(&[',', '.', ';', ')'][..]).trim();
        if candidate.is_empty() {
            continue;
        }
        if !is_playlist_link(candidate) {
            continue;
        }
        if seen.insert(candidate.to_ascii_lowercase()) {
            links.push(candidate.to_string());
        }
    }

    links
}

fn is_playlist_link(candidate: &str) -> bool {
    let lower = candidate.to_ascii_lowercase();

    let (path, query) = match Url::parse(&lower) {
        Ok(url) => (
            url.path().to_string(),
            url.query().unwrap_or_default().to_string(),
        ),
        // Unparseable candidates fall back to substring checks; the
        // credential parser re-validates later anyway.
        Err(_) => match lower.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (lower.clone(), String::new()),
        },
    };

    // (a) generation endpoint with a type marker
    if path.contains("get.php") && has_param(&query, "type") {
        return true;
    }

    // (b) playlist file extension
    if path.ends_with(".m3u") || path.ends_with(".m3u8") {
        return true;
    }

    // (c) embedded credentials
    if has_param(&query, "username") && has_param(&query, "password") {
        return true;
    }

    false
}

/// True when `query` carries `key=` as a parameter name.
fn has_param(query: &str, key: &str) -> bool {
    query
        .split('&')
        .any(|pair| pair.split('=').next() == Some(key))
}
