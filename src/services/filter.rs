//! Keyword filtering and text substitution applied before extraction.

use regex::RegexBuilder;
use tracing::debug;

use crate::config::Substitution;

/// Allow-list / block-list / substitution rules for raw message text.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    keywords: Vec<String>,
    blocked: Vec<String>,
    substitutions: Vec<Substitution>,
}

impl MessageFilter {
    pub fn new(
        keywords: Vec<String>,
        blocked: Vec<String>,
        substitutions: Vec<Substitution>,
    ) -> Self {
        Self {
            keywords,
            blocked,
            substitutions,
        }
    }

    /// Decide whether a message passes the configured filters.
    ///
    /// With an allow-list configured, at least one keyword must appear
    /// (case-insensitive substring). Independently, any blocked term
    /// rejects the message.
    pub fn should_process(&self, text: &str) -> bool {
        let lower = text.to_lowercase();

        if !self.keywords.is_empty()
            && !self
                .keywords
                .iter()
                .any(|k| lower.contains(&k.to_lowercase()))
        {
            debug!("message rejected: no allow-list keyword present");
            return false;
        }

        if let Some(term) = self
            .blocked
            .iter()
            .find(|b| lower.contains(&b.to_lowercase()))
        {
            debug!(term = term.as_str(), "message rejected: blocked term");
            return false;
        }

        true
    }

    /// Apply the configured substitutions in order; each rule is a
    /// case-insensitive literal match, and later rules see the output
    /// of earlier ones. Replacement keeps the configured casing.
    pub fn apply_substitutions(&self, text: &str) -> String {
        let mut result = text.to_string();
        for rule in &self.substitutions {
            let re = match RegexBuilder::new(&regex::escape(&rule.from))
                .case_insensitive(true)
                .build()
            {
                Ok(re) => re,
                Err(_) => continue,
            };
            result = re
                .replace_all(&result, regex::NoExpand(&rule.to))
                .into_owned();
        }
        result
    }
}
