//! The chat transport contract (spec.md §6): chat-agnostic inbound events
//! and outbound sends with long-message chunking. The real transport
//! (Discord, Telegram, ...) is an external collaborator out of scope for
//! this core; [`LoggingTransport`] is a test double grounded on
//! `crates/interfaces/telegram`'s `chunk_message`/`send_message` shape,
//! generalized away from one specific bot API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An inbound message event, as delivered by whatever transport is wired
/// up (Discord, Telegram, a CLI REPL, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub user_id: i64,
    pub channel_id: i64,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport send failed: {0}")]
    Send(String),
}

/// The contract the orchestrator and the scheduler's action executor send
/// outbound messages through.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends `content` to `channel_id`, chunking it if it exceeds the
    /// transport's max bytes per message.
    async fn send(&self, channel_id: i64, content: &str) -> Result<(), TransportError>;

    /// Purely cosmetic; transports with no typing indicator concept are
    /// free to no-op.
    async fn start_typing(&self, _channel_id: i64) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Splits `text` into chunks of at most `max_bytes`, breaking on the last
/// newline before the limit when one exists so a chunk doesn't cut a line
/// in half, and otherwise on the last space. Never splits mid-codepoint:
/// the search for a break point walks backward only over byte offsets
/// that land on a UTF-8 character boundary.
pub fn chunk_message(text: &str, max_bytes: usize) -> Vec<String> {
    if text.len() <= max_bytes || max_bytes == 0 {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;
    while remaining.len() > max_bytes {
        let mut split_at = max_bytes;
        while !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        let window = &remaining[..split_at];
        let break_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(split_at);

        chunks.push(remaining[..break_at].trim_end().to_string());
        remaining = remaining[break_at..].trim_start();
    }
    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

/// Default max bytes per outbound chunk (spec.md §6: "a configuration
/// constant"), sized conservatively under Discord's 2000-character limit.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 1800;

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel_id: i64,
    pub content: String,
}

/// Records every send instead of delivering it anywhere. Stands in for
/// the real Discord/Telegram adapter in tests and in a headless
/// deployment with no transport configured.
#[derive(Default)]
pub struct LoggingTransport {
    sent: tokio::sync::Mutex<Vec<SentMessage>>,
    max_chunk_bytes: usize,
}

impl LoggingTransport {
    pub fn new() -> Self {
        Self {
            sent: tokio::sync::Mutex::new(Vec::new()),
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
        }
    }

    pub fn with_max_chunk_bytes(mut self, max_chunk_bytes: usize) -> Self {
        self.max_chunk_bytes = max_chunk_bytes;
        self
    }

    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl ChatTransport for LoggingTransport {
    async fn send(&self, channel_id: i64, content: &str) -> Result<(), TransportError> {
        for chunk in chunk_message(content, self.max_chunk_bytes) {
            tracing::info!(channel_id, bytes = chunk.len(), "transport_send");
            self.sent.lock().await.push(SentMessage {
                channel_id,
                content: chunk,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_message("hello", 100);
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn long_text_splits_on_newline_boundary() {
        let text = format!("{}\n{}", "a".repeat(50), "b".repeat(50));
        let chunks = chunk_message(&text, 55);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with('a'));
        assert!(chunks[1].starts_with('b'));
    }

    #[test]
    fn splitting_never_breaks_a_utf8_codepoint() {
        let text = "é".repeat(40);
        let chunks = chunk_message(&text, 10);
        for chunk in &chunks {
            assert!(std::str::from_utf8(chunk.as_bytes()).is_ok());
        }
    }

    #[tokio::test]
    async fn logging_transport_chunks_and_records_sends() {
        let transport = LoggingTransport::new().with_max_chunk_bytes(10);
        transport.send(7, "this is a longer message than ten bytes").await.unwrap();
        let sent = transport.sent_messages().await;
        assert!(sent.len() > 1);
        assert!(sent.iter().all(|m| m.channel_id == 7));
    }
}
