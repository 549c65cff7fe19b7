//! Sources of older chat history.
//!
//! Message history is not kept server-side; [`SimulatedHistory`] stands in
//! for a paged backend by synthesizing placeholder pages after a delay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::ChatError;
use super::model::{ChatMessage, Chatroom, MessageChunk, Sender, now_millis};

/// Messages per page of history.
pub const PAGE_SIZE: usize = 10;

/// Spacing between synthesized messages.
const PLACEHOLDER_SPACING_MS: i64 = 60_000;

/// Fetches the page of history older than what a room already holds.
#[async_trait]
pub trait HistorySource: Send + Sync + std::fmt::Debug {
    async fn fetch_page(&self, room: &Chatroom) -> Result<MessageChunk, ChatError>;
}

/// Synthesizes placeholder history pages.
#[derive(Debug)]
pub struct SimulatedHistory {
    latency: Duration,
    seq: AtomicU64,
}

impl SimulatedHistory {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            seq: AtomicU64::new(0),
        }
    }
}

impl Default for SimulatedHistory {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl HistorySource for SimulatedHistory {
    async fn fetch_page(&self, room: &Chatroom) -> Result<MessageChunk, ChatError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let now = now_millis();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let chunk_id = format!("chunk-{now}-h{seq}");
        let offset = room.message_chunks.len() * PAGE_SIZE;

        let messages = (0..PAGE_SIZE)
            .map(|i| {
                let n = offset + i + 1;
                let sender = if n % 2 == 0 { Sender::Ai } else { Sender::User };
                ChatMessage {
                    id: format!("msg-{chunk_id}-{i}"),
                    content: format!("Older message #{n}"),
                    sender,
                    timestamp: now - i64::try_from(n).unwrap_or_default() * PLACEHOLDER_SPACING_MS,
                    is_image: false,
                    image_url: None,
                }
            })
            .collect();

        Ok(MessageChunk {
            id: chunk_id,
            messages,
            created_at: now,
        })
    }
}
