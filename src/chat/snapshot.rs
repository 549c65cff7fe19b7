//! The persisted subset of chat state.
//!
//! Only the two most recent chunks of each room are kept, and pagination
//! state is reset, so older pages and in-flight fetches do not survive a
//! reload.

use serde::{Deserialize, Serialize};

use super::model::Chatroom;
use super::store::ChatState;
use crate::storage::MigrationRegistry;

/// Schema version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Chunks kept per room.
pub const RETAINED_CHUNKS: usize = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub chatrooms: Vec<Chatroom>,
    #[serde(default)]
    pub current_chatroom_id: Option<String>,
}

impl ChatSnapshot {
    /// Reduce live state to what gets persisted.
    pub fn capture(state: &ChatState) -> Self {
        let chatrooms = state
            .chatrooms
            .iter()
            .map(|room| Chatroom {
                message_chunks: room
                    .message_chunks
                    .iter()
                    .take(RETAINED_CHUNKS)
                    .cloned()
                    .collect(),
                has_more: false,
                next_page_token: None,
                ..room.clone()
            })
            .collect();

        Self {
            chatrooms,
            current_chatroom_id: state.current_chatroom_id.clone(),
        }
    }

    /// Rebuild live state. Transient flags start cleared and a dangling
    /// current-room pointer is dropped.
    pub fn into_state(self) -> ChatState {
        let current_chatroom_id = self
            .current_chatroom_id
            .filter(|id| self.chatrooms.iter().any(|room| &room.id == id));
        ChatState {
            chatrooms: self.chatrooms,
            current_chatroom_id,
            is_typing: false,
            is_fetching_more: false,
        }
    }
}

/// Upgrades for snapshots written by earlier releases.
pub fn migrations() -> MigrationRegistry {
    // Version 0 had the same shape; only the envelope version changed.
    MigrationRegistry::new(SNAPSHOT_VERSION).with_step(0, |state| state)
}
