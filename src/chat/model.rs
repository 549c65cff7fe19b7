//! Chat rooms, message chunks and messages.

use serde::{Deserialize, Serialize};

/// Current time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

/// A single chat message. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_image: bool,
    /// Image payload as a data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ChatMessage {
    /// A text message stamped with the current time.
    pub fn text(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            sender,
            timestamp: now_millis(),
            is_image: false,
            image_url: None,
        }
    }

    /// A user image message. The content is prefixed with `[Image]`.
    pub fn image(content: &str, image_url: Option<String>) -> Self {
        Self {
            is_image: true,
            image_url,
            ..Self::text(Sender::User, format!("[Image] {content}"))
        }
    }
}

/// A stored batch of messages; the unit of pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageChunk {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: i64,
}

/// A conversation.
///
/// `message_chunks` holds chunks created by sending newest-first; pages of
/// older history are appended at the end. Readers must not rely on chunk
/// order and go through [`Chatroom::messages`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chatroom {
    pub id: String,
    pub title: String,
    pub message_chunks: Vec<MessageChunk>,
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Chatroom {
    /// A new room with a single empty chunk.
    pub fn new(title: impl Into<String>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();
        Self {
            message_chunks: vec![MessageChunk {
                id: format!("chunk-{id}-0"),
                messages: Vec::new(),
                created_at: now,
            }],
            id,
            title: title.into(),
            has_more: true,
            next_page_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// All messages across all chunks, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = self
            .message_chunks
            .iter()
            .rev()
            .flat_map(|chunk| chunk.messages.iter().cloned())
            .collect();
        // Sent chunks are newest-first; walking them in reverse lets the
        // stable sort keep send order for equal timestamps.
        messages.sort_by_key(|m| m.timestamp);
        messages
    }
}
