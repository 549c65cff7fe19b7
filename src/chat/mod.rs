//! Chat state management.
//!
//! The [`ChatStore`] is the single source of truth for a user's chat rooms
//! and messages. It orders writes, keeps a snapshot in durable storage and
//! asks a [`Responder`] for AI replies.
//!
//! # Architecture
//!
//! - [`model`]: rooms, chunks and messages
//! - [`store`]: the store and its operations
//! - [`history`]: pages of older messages for `load_more_messages`
//! - [`notify`]: user-visible notifications
//! - [`snapshot`]: what survives a reload
//!
//! # Example
//!
//! ```rust,ignore
//! let store = ChatStore::open(responder, history, storage, "gemini-chat-storage");
//! let id = store.create_chatroom("Trip Planning")?;
//! store.send_message("Hello", false, None).await?;
//! let messages = store.get_messages(&id);
//! ```

pub mod history;
pub mod model;
pub mod notify;
pub mod snapshot;
pub mod store;

pub use history::{HistorySource, SimulatedHistory};
pub use model::{ChatMessage, Chatroom, MessageChunk, Sender};
pub use notify::{BroadcastNotifier, Notification, NotificationKind, Notifier};
pub use store::{ChatState, ChatStore, SendOutcome};

use crate::llm::Turn;

/// Maximum title length, in characters.
pub const MAX_TITLE_CHARS: usize = 100;

/// Maximum message length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 5000;

/// Errors raised by chat operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The room title failed validation.
    #[error("{0}")]
    InvalidTitle(&'static str),

    /// The message failed validation.
    #[error("{0}")]
    InvalidMessage(&'static str),

    /// A message was sent while no room is open.
    #[error("No active chatroom")]
    NoActiveChatroom,

    /// The room does not exist.
    #[error("Chatroom not found: {0}")]
    ChatroomNotFound(String),

    /// The AI reply could not be produced.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Older history could not be fetched.
    #[error("History unavailable: {0}")]
    History(String),
}

/// Produces the AI reply for a conversation.
#[async_trait::async_trait]
pub trait Responder: Send + Sync + std::fmt::Debug {
    async fn respond(&self, turns: Vec<Turn>) -> Result<String, ChatError>;
}

/// Validate a room title, returning it trimmed.
pub fn validate_title(title: &str) -> Result<&str, ChatError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ChatError::InvalidTitle("Title is required"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ChatError::InvalidTitle(
            "Title is too long (max 100 characters)",
        ));
    }
    Ok(title)
}

/// Validate message content.
pub fn validate_message(content: &str) -> Result<(), ChatError> {
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ChatError::InvalidMessage(
            "Message is too long (max 5000 characters)",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title("  Trip Planning ").unwrap(), "Trip Planning");
        assert!(matches!(
            validate_title("   \t"),
            Err(ChatError::InvalidTitle("Title is required"))
        ));
        assert!(validate_title(&"x".repeat(101)).is_err());
        assert!(validate_title(&"é".repeat(100)).is_ok());
    }

    #[test]
    fn test_validate_message() {
        assert!(validate_message("").is_ok());
        assert!(validate_message(&"a".repeat(5000)).is_ok());
        assert!(validate_message(&"a".repeat(5001)).is_err());
    }
}
