//! Seam between the pipeline and the chat-transport layer.
//!
//! The transport proper (session handling, channel subscription,
//! message download) lives outside this process. It hands structured
//! message events to the pipeline and resolves attachment references
//! on demand.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, warn};

use crate::models::IncomingMessage;

/// Message source plus attachment-download capability.
#[async_trait]
pub trait Transport: Send {
    /// Next message from the subscribed channels, or `None` when the
    /// feed is exhausted.
    async fn next_message(&mut self) -> Option<IncomingMessage>;

    /// Fetch the raw bytes behind an attachment reference.
    async fn download_attachment(&self, attachment_ref: &str) -> Result<Vec<u8>>;
}

/// Transport fed by newline-delimited JSON events on stdin.
///
/// The upstream chat bridge serializes each delivered message as one
/// `IncomingMessage` object per line, with `attachment_ref` pointing
/// at a file it already materialized on local disk.
pub struct StdinTransport {
    lines: Lines<BufReader<Stdin>>,
    channels: HashSet<String>,
}

impl StdinTransport {
    /// Subscribe to the given source channels; events from any other
    /// channel are dropped.
    pub fn subscribe(channels: &[String]) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            channels: channels.iter().cloned().collect(),
        }
    }

    fn accepts(&self, message: &IncomingMessage) -> bool {
        self.channels.contains(&message.channel_id)
            || self.channels.contains(&message.channel_title)
    }
}

#[async_trait]
impl Transport for StdinTransport {
    async fn next_message(&mut self) -> Option<IncomingMessage> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "failed to read transport event");
                    return None;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<IncomingMessage>(&line) {
                Ok(message) if self.accepts(&message) => return Some(message),
                Ok(message) => {
                    debug!(
                        channel = %message.channel_id,
                        "dropping message from unsubscribed channel"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "malformed transport event, skipping");
                }
            }
        }
    }

    async fn download_attachment(&self, attachment_ref: &str) -> Result<Vec<u8>> {
        tokio::fs::read(attachment_ref)
            .await
            .with_context(|| format!("reading attachment {attachment_ref}"))
    }
}
