//! The chat state store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use super::history::HistorySource;
use super::model::{ChatMessage, Chatroom, MessageChunk, Sender, now_millis};
use super::notify::{Notification, Notifier};
use super::snapshot::{self, ChatSnapshot, SNAPSHOT_VERSION};
use super::{ChatError, Responder, validate_message, validate_title};
use crate::llm::Turn;
use crate::storage::{self, KeyValueStorage};

/// Rooms stop offering older history once this many chunks existed
/// before a page was appended.
pub const MAX_HISTORY_CHUNKS: usize = 4;

/// Messages of context sent along with a new message.
const CONTEXT_MESSAGES: usize = 5;

const PERSONA_PROMPT: &str =
    "You are a helpful AI assistant. Keep your responses concise and helpful.";
const PERSONA_REPLY: &str = "I am a helpful AI assistant. How can I help you today?";

/// Stored in place of a reply when generation fails.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, I encountered an error while generating a response. Please try again.";

/// Live chat state.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    pub chatrooms: Vec<Chatroom>,
    pub current_chatroom_id: Option<String>,
    pub is_typing: bool,
    pub is_fetching_more: bool,
}

impl ChatState {
    fn room(&self, id: &str) -> Option<&Chatroom> {
        self.chatrooms.iter().find(|room| room.id == id)
    }

    fn room_mut(&mut self, id: &str) -> Option<&mut Chatroom> {
        self.chatrooms.iter_mut().find(|room| room.id == id)
    }
}

/// What happened to a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// An image message was stored; no reply is requested for images.
    Stored,
    /// The AI reply was stored.
    Replied(String),
    /// Generation failed and an apology was stored instead.
    Failed(String),
}

/// Single source of truth for one user's chat rooms and messages.
///
/// Cheap to clone; clones share the same state.
#[derive(Debug, Clone)]
pub struct ChatStore {
    inner: Arc<ChatStoreInner>,
}

#[derive(Debug)]
struct ChatStoreInner {
    state: RwLock<ChatState>,
    responder: Arc<dyn Responder>,
    history: Arc<dyn HistorySource>,
    storage: Arc<dyn KeyValueStorage>,
    storage_key: String,
    notifier: RwLock<Option<Arc<dyn Notifier>>>,
    chunk_seq: AtomicU64,
}

impl ChatStore {
    /// Open the store persisted under `storage_key`, starting empty if
    /// nothing usable is stored.
    pub fn open(
        responder: Arc<dyn Responder>,
        history: Arc<dyn HistorySource>,
        storage: Arc<dyn KeyValueStorage>,
        storage_key: impl Into<String>,
    ) -> Self {
        let storage_key = storage_key.into();
        let state = storage::load_snapshot::<ChatSnapshot>(
            storage.as_ref(),
            &storage_key,
            &snapshot::migrations(),
        )
        .map(ChatSnapshot::into_state)
        .unwrap_or_default();

        tracing::debug!(
            name: "chat.store.opened",
            key = %storage_key,
            rooms = state.chatrooms.len(),
            "Chat store opened"
        );

        Self {
            inner: Arc::new(ChatStoreInner {
                state: RwLock::new(state),
                responder,
                history,
                storage,
                storage_key,
                notifier: RwLock::new(None),
                chunk_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Route user-visible notifications to `notifier`.
    pub fn set_notifier(&self, notifier: Arc<dyn Notifier>) {
        *self
            .inner
            .notifier
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(notifier);
    }

    /// Stop delivering notifications.
    pub fn clear_notifier(&self) {
        *self
            .inner
            .notifier
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rooms
    // ─────────────────────────────────────────────────────────────────────

    /// Create a room, make it current and return its id.
    pub fn create_chatroom(&self, title: &str) -> Result<String, ChatError> {
        let title = validate_title(title)?;
        let room = Chatroom::new(title);
        let id = room.id.clone();

        self.mutate(|state| {
            // New rooms go last so older rooms stay on top.
            state.chatrooms.push(room);
            state.current_chatroom_id = Some(id.clone());
        });

        tracing::info!(name: "chat.room.created", room_id = %id, "Chatroom created");
        self.notify(
            Notification::success("Chat created").with_description(format!("Created new chat: {title}")),
        );
        Ok(id)
    }

    /// Delete a room. Unknown ids are ignored.
    pub fn delete_chatroom(&self, id: &str) {
        let removed = self.mutate(|state| {
            let before = state.chatrooms.len();
            state.chatrooms.retain(|room| room.id != id);
            if state.current_chatroom_id.as_deref() == Some(id) {
                state.current_chatroom_id = None;
            }
            state.chatrooms.len() != before
        });

        if removed {
            tracing::info!(name: "chat.room.deleted", room_id = %id, "Chatroom deleted");
            self.notify(Notification::success("Chat deleted").with_description("The chat has been deleted"));
        }
    }

    /// Rename a room. Returns `false` if the room does not exist.
    pub fn update_chatroom_title(&self, id: &str, title: &str) -> Result<bool, ChatError> {
        let title = validate_title(title)?;
        Ok(self.mutate(|state| match state.room_mut(id) {
            Some(room) => {
                room.title = title.to_string();
                room.updated_at = now_millis();
                true
            }
            None => false,
        }))
    }

    /// Point the store at another room, or at none.
    ///
    /// Returns `false` and leaves the pointer alone if the room does not
    /// exist.
    pub fn set_current_chatroom(&self, id: Option<&str>) -> bool {
        self.mutate(|state| match id {
            Some(id) if state.room(id).is_none() => false,
            _ => {
                state.current_chatroom_id = id.map(ToString::to_string);
                true
            }
        })
    }

    /// The currently open room.
    pub fn current_chatroom(&self) -> Option<Chatroom> {
        let state = self.read();
        state
            .current_chatroom_id
            .as_deref()
            .and_then(|id| state.room(id))
            .cloned()
    }

    pub fn current_chatroom_id(&self) -> Option<String> {
        self.read().current_chatroom_id.clone()
    }

    /// A room by id.
    pub fn chatroom(&self, id: &str) -> Option<Chatroom> {
        self.read().room(id).cloned()
    }

    /// All rooms, oldest first.
    pub fn chatrooms(&self) -> Vec<Chatroom> {
        self.read().chatrooms.clone()
    }

    /// Copy of the whole state.
    pub fn state(&self) -> ChatState {
        self.read().clone()
    }

    /// Drop every room and reset the flags.
    pub fn clear_all_chat_data(&self) {
        self.mutate(|state| *state = ChatState::default());
        tracing::info!(name: "chat.cleared", "All chat data cleared");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────

    /// All messages of a room, oldest first.
    pub fn get_messages(&self, room_id: &str) -> Vec<ChatMessage> {
        self.read()
            .room(room_id)
            .map(Chatroom::messages)
            .unwrap_or_default()
    }

    pub fn is_typing(&self) -> bool {
        self.read().is_typing
    }

    pub fn set_is_typing(&self, is_typing: bool) {
        self.mutate(|state| state.is_typing = is_typing);
    }

    /// Send a message to the current room and, unless it is an image,
    /// store the AI reply.
    pub async fn send_message(
        &self,
        content: &str,
        is_image: bool,
        image_url: Option<String>,
    ) -> Result<SendOutcome, ChatError> {
        validate_message(content)?;

        let Some(room_id) = self.current_chatroom_id() else {
            tracing::error!(name: "chat.send.no_room", "No active chatroom");
            return Err(ChatError::NoActiveChatroom);
        };

        let message = if is_image {
            ChatMessage::image(content, image_url)
        } else {
            ChatMessage::text(Sender::User, content)
        };

        let chunk = self.single_message_chunk(message);
        let context = self.mutate(|state| {
            let room = state.room_mut(&room_id)?;
            let context = recent_context(room);
            room.message_chunks.insert(0, chunk);
            room.updated_at = now_millis();
            state.is_typing = !is_image;
            Some(context)
        });
        let Some(context) = context else {
            return Err(ChatError::ChatroomNotFound(room_id));
        };

        if is_image {
            return Ok(SendOutcome::Stored);
        }

        let mut turns = Vec::with_capacity(context.len() + 3);
        turns.push(Turn::user(PERSONA_PROMPT));
        turns.push(Turn::model(PERSONA_REPLY));
        turns.extend(context);
        turns.push(Turn::user(content));

        // The reply runs on its own task so a dropped request still
        // stores it and clears the typing flag.
        let store = self.clone();
        let task = tokio::spawn(async move { store.generate_reply(room_id, turns).await });
        match task.await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(name: "chat.reply.aborted", error = %e, "Reply task did not finish");
                self.set_is_typing(false);
                Err(ChatError::Generation(e.to_string()))
            }
        }
    }

    async fn generate_reply(&self, room_id: String, turns: Vec<Turn>) -> SendOutcome {
        match self.inner.responder.respond(turns).await {
            Ok(reply) => {
                self.append_reply(&room_id, ChatMessage::text(Sender::Ai, reply.clone()));
                SendOutcome::Replied(reply)
            }
            Err(e) => {
                tracing::error!(name: "chat.reply.failed", room_id = %room_id, error = %e, "Error generating AI response");
                self.append_reply(&room_id, ChatMessage::text(Sender::Ai, APOLOGY_MESSAGE));
                self.notify(
                    Notification::error("Failed to send message")
                        .with_description("An error occurred while sending your message"),
                );
                SendOutcome::Failed(e.to_string())
            }
        }
    }

    fn append_reply(&self, room_id: &str, message: ChatMessage) {
        let chunk = self.single_message_chunk(message);
        let stored = self.mutate(|state| {
            state.is_typing = false;
            let Some(room) = state.room_mut(room_id) else {
                return false;
            };
            room.message_chunks.insert(0, chunk);
            room.updated_at = now_millis();
            true
        });
        if !stored {
            tracing::warn!(name: "chat.reply.dropped", room_id, "Chatroom deleted before reply arrived");
        }
    }

    fn single_message_chunk(&self, message: ChatMessage) -> MessageChunk {
        let now = now_millis();
        let seq = self.inner.chunk_seq.fetch_add(1, Ordering::Relaxed);
        MessageChunk {
            id: format!("chunk-{now}-{seq}"),
            messages: vec![message],
            created_at: now,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pagination
    // ─────────────────────────────────────────────────────────────────────

    /// Whether a room can page in older history.
    pub fn can_load_more(&self, room_id: &str) -> bool {
        self.read().room(room_id).is_some_and(|room| room.has_more)
    }

    pub fn is_fetching_more(&self) -> bool {
        self.read().is_fetching_more
    }

    /// Page in one chunk of older history.
    ///
    /// Returns `Ok(false)` without touching state when the room is
    /// missing, a fetch is already running, or the room has no more
    /// history.
    pub async fn load_more_messages(&self, room_id: &str) -> Result<bool, ChatError> {
        let room = {
            let mut state = self.write();
            if state.is_fetching_more {
                return Ok(false);
            }
            let Some(room) = state.room(room_id).filter(|room| room.has_more).cloned() else {
                return Ok(false);
            };
            state.is_fetching_more = true;
            room
        };

        // The fetch owns the flag until it lands, even if the caller goes away.
        let store = self.clone();
        let task = tokio::spawn(async move { store.append_history_page(room).await });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(name: "chat.history.aborted", room_id, error = %e, "History task did not finish");
                self.write().is_fetching_more = false;
                Err(ChatError::History(e.to_string()))
            }
        }
    }

    async fn append_history_page(&self, room: Chatroom) -> Result<bool, ChatError> {
        let room_id = room.id.as_str();
        match self.inner.history.fetch_page(&room).await {
            Ok(chunk) => {
                self.mutate(|state| {
                    state.is_fetching_more = false;
                    if let Some(room) = state.room_mut(room_id) {
                        let before = room.message_chunks.len();
                        room.message_chunks.push(chunk);
                        room.has_more = before < MAX_HISTORY_CHUNKS;
                        room.next_page_token = room.has_more.then(|| format!("page-{}", before + 1));
                    }
                });
                Ok(true)
            }
            Err(e) => {
                tracing::error!(name: "chat.history.failed", room_id, error = %e, "Failed to load more messages");
                self.write().is_fetching_more = false;
                Err(e)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn read(&self) -> RwLockReadGuard<'_, ChatState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChatState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` and persist the result while still holding the lock, so
    /// snapshots land in mutation order.
    fn mutate<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut state = self.write();
        let result = f(&mut state);
        storage::save_snapshot(
            self.inner.storage.as_ref(),
            &self.inner.storage_key,
            SNAPSHOT_VERSION,
            &ChatSnapshot::capture(&state),
        );
        result
    }

    fn notify(&self, notification: Notification) {
        let notifier = self
            .inner
            .notifier
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(notifier) = notifier {
            notifier.notify(notification);
        }
    }
}

/// The latest messages of a room as conversation turns.
fn recent_context(room: &Chatroom) -> Vec<Turn> {
    let messages = room.messages();
    let skip = messages.len().saturating_sub(CONTEXT_MESSAGES);
    messages
        .into_iter()
        .skip(skip)
        .map(|m| match m.sender {
            Sender::User => Turn::user(m.content),
            Sender::Ai => Turn::model(m.content),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::history::SimulatedHistory;
    use crate::chat::notify::NotificationKind;
    use crate::chat::notify::testing::RecordingNotifier;
    use crate::llm::TurnRole;
    use crate::storage::MemoryStorage;
    use std::sync::Mutex;
    use std::time::Duration;

    const KEY: &str = "gemini-chat-storage";

    /// Replies with a canned answer, or fails, and records the turns.
    #[derive(Debug, Default)]
    struct FakeResponder {
        fail: bool,
        delay: Duration,
        seen: Mutex<Vec<Vec<Turn>>>,
    }

    #[async_trait::async_trait]
    impl Responder for FakeResponder {
        async fn respond(&self, turns: Vec<Turn>) -> Result<String, ChatError> {
            self.seen.lock().unwrap().push(turns);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                Err(ChatError::Generation("provider down".into()))
            } else {
                Ok("Hello! How can I help?".into())
            }
        }
    }

    struct Fixture {
        store: ChatStore,
        responder: Arc<FakeResponder>,
        storage: Arc<MemoryStorage>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture_with(fail: bool) -> Fixture {
        build_fixture(
            FakeResponder {
                fail,
                ..FakeResponder::default()
            },
            Duration::ZERO,
        )
    }

    /// Replies after `reply_delay`; history pages arrive after `history_latency`.
    fn slow_fixture(reply_delay: Duration, history_latency: Duration) -> Fixture {
        build_fixture(
            FakeResponder {
                delay: reply_delay,
                ..FakeResponder::default()
            },
            history_latency,
        )
    }

    fn build_fixture(responder: FakeResponder, history_latency: Duration) -> Fixture {
        let responder = Arc::new(responder);
        let storage = Arc::new(MemoryStorage::new());
        let store = ChatStore::open(
            Arc::clone(&responder) as Arc<dyn Responder>,
            Arc::new(SimulatedHistory::new(history_latency)),
            Arc::clone(&storage) as Arc<dyn KeyValueStorage>,
            KEY,
        );
        let notifier = Arc::new(RecordingNotifier::default());
        store.set_notifier(Arc::clone(&notifier) as Arc<dyn Notifier>);
        Fixture {
            store,
            responder,
            storage,
            notifier,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(false)
    }

    fn reopen(f: &Fixture) -> ChatStore {
        ChatStore::open(
            Arc::clone(&f.responder) as Arc<dyn Responder>,
            Arc::new(SimulatedHistory::new(Duration::ZERO)),
            Arc::clone(&f.storage) as Arc<dyn KeyValueStorage>,
            KEY,
        )
    }

    #[test]
    fn test_create_chatroom_appends_and_selects() {
        let f = fixture();
        let first = f.store.create_chatroom("First").unwrap();
        let second = f.store.create_chatroom("  Second  ").unwrap();

        let rooms = f.store.chatrooms();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].id, first);
        assert_eq!(rooms[1].title, "Second");
        assert_eq!(f.store.current_chatroom_id().as_deref(), Some(second.as_str()));

        let seen = f.notifier.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].kind, NotificationKind::Success);
        assert_eq!(seen[0].description.as_deref(), Some("Created new chat: First"));
    }

    #[test]
    fn test_blank_title_is_rejected_without_changes() {
        let f = fixture();
        let existing = f.store.create_chatroom("Keep").unwrap();

        assert!(matches!(
            f.store.create_chatroom("   "),
            Err(ChatError::InvalidTitle(_))
        ));
        assert_eq!(f.store.chatrooms().len(), 1);
        assert_eq!(f.store.current_chatroom_id(), Some(existing));
    }

    #[test]
    fn test_delete_current_room_clears_pointer() {
        let f = fixture();
        let a = f.store.create_chatroom("A").unwrap();
        let b = f.store.create_chatroom("B").unwrap();

        f.store.delete_chatroom(&a);
        assert_eq!(f.store.current_chatroom_id(), Some(b.clone()));

        f.store.delete_chatroom(&b);
        assert!(f.store.current_chatroom_id().is_none());
        assert!(f.store.chatrooms().is_empty());
    }

    #[test]
    fn test_delete_unknown_room_is_silent() {
        let f = fixture();
        f.store.create_chatroom("A").unwrap();
        let before = f.notifier.seen().len();

        f.store.delete_chatroom("missing");
        assert_eq!(f.store.chatrooms().len(), 1);
        assert_eq!(f.notifier.seen().len(), before);
    }

    #[tokio::test]
    async fn test_send_message_stores_user_and_ai_chunks() {
        let f = fixture();
        let room = f.store.create_chatroom("Trip Planning").unwrap();

        let outcome = f.store.send_message("Hello", false, None).await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied("Hello! How can I help?".into()));
        assert!(!f.store.is_typing());

        let chunks = f.store.chatroom(&room).unwrap().message_chunks;
        // AI chunk, user chunk, initial empty chunk.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].messages[0].sender, Sender::Ai);
        assert_eq!(chunks[1].messages[0].content, "Hello");
        assert_eq!(chunks[1].messages[0].sender, Sender::User);

        let messages = f.store.get_messages(&room);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hello");
    }

    #[tokio::test]
    async fn test_send_message_frames_recent_context() {
        let f = fixture();
        f.store.create_chatroom("Context").unwrap();
        for n in 0..4 {
            f.store.send_message(&format!("q{n}"), false, None).await.unwrap();
        }

        let seen = f.responder.seen.lock().unwrap().clone();
        let last = seen.last().unwrap();
        // Persona pair + five context messages + the new message.
        assert_eq!(last.len(), 8);
        assert_eq!(last[0].text, PERSONA_PROMPT);
        assert_eq!(last[1].role, TurnRole::Model);
        assert_eq!(last[7], Turn::user("q3"));
        // Context ends with the previous reply.
        assert_eq!(last[6].role, TurnRole::Model);
        assert_eq!(last[5], Turn::user("q2"));
    }

    #[tokio::test]
    async fn test_image_message_skips_ai() {
        let f = fixture();
        let room = f.store.create_chatroom("Pics").unwrap();

        let outcome = f
            .store
            .send_message("sunset", true, Some("data:image/png;base64,AAAA".into()))
            .await
            .unwrap();

        assert_eq!(outcome, SendOutcome::Stored);
        assert!(f.responder.seen.lock().unwrap().is_empty());
        let messages = f.store.get_messages(&room);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "[Image] sunset");
        assert!(messages[0].is_image);
    }

    #[tokio::test]
    async fn test_send_without_room_fails_quietly() {
        let f = fixture();
        let result = f.store.send_message("Hello", false, None).await;
        assert!(matches!(result, Err(ChatError::NoActiveChatroom)));
        assert!(f.notifier.seen().is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_stores_apology_and_notifies() {
        let f = fixture_with(true);
        let room = f.store.create_chatroom("Broken").unwrap();

        let outcome = f.store.send_message("Hello", false, None).await.unwrap();
        assert!(matches!(outcome, SendOutcome::Failed(_)));
        assert!(!f.store.is_typing());

        let messages = f.store.get_messages(&room);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].sender, Sender::Ai);
        assert_eq!(messages[1].content, APOLOGY_MESSAGE);

        let last = f.notifier.seen().pop().unwrap();
        assert_eq!(last.kind, NotificationKind::Error);
        assert_eq!(last.title, "Failed to send message");
    }

    #[tokio::test]
    async fn test_messages_stay_chronological() {
        let f = fixture();
        let room = f.store.create_chatroom("Order").unwrap();
        for n in 0..5 {
            f.store.send_message(&format!("m{n}"), n % 2 == 0, None).await.unwrap();
        }
        f.store.load_more_messages(&room).await.unwrap();

        let messages = f.store.get_messages(&room);
        assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_four_pages_then_no_more() {
        let f = fixture();
        let room = f.store.create_chatroom("History").unwrap();
        assert!(f.store.can_load_more(&room));

        for page in 1..=4 {
            assert!(f.store.load_more_messages(&room).await.unwrap(), "page {page}");
        }
        let loaded = f.store.chatroom(&room).unwrap();
        assert!(!loaded.has_more);
        assert!(loaded.next_page_token.is_none());
        assert_eq!(loaded.message_chunks.len(), 5);

        assert!(!f.store.load_more_messages(&room).await.unwrap());
        assert_eq!(f.store.chatroom(&room).unwrap().message_chunks.len(), 5);
    }

    #[tokio::test]
    async fn test_load_more_sets_page_token() {
        let f = fixture();
        let room = f.store.create_chatroom("Tokens").unwrap();
        f.store.load_more_messages(&room).await.unwrap();

        let loaded = f.store.chatroom(&room).unwrap();
        assert!(loaded.has_more);
        assert_eq!(loaded.next_page_token.as_deref(), Some("page-2"));
        assert_eq!(f.store.get_messages(&room).len(), 10);
    }

    #[tokio::test]
    async fn test_load_more_is_noop_while_fetching() {
        let f = fixture();
        let room = f.store.create_chatroom("Busy").unwrap();
        f.store.write().is_fetching_more = true;

        assert!(!f.store.load_more_messages(&room).await.unwrap());
        assert_eq!(f.store.chatroom(&room).unwrap().message_chunks.len(), 1);
        assert!(f.store.is_fetching_more());
    }

    #[tokio::test]
    async fn test_load_more_on_missing_room_is_noop() {
        let f = fixture();
        assert!(!f.store.load_more_messages("missing").await.unwrap());
        assert!(!f.store.is_fetching_more());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_load_more_still_lands_page() {
        let f = slow_fixture(Duration::ZERO, Duration::from_secs(1));
        let room = f.store.create_chatroom("Impatient").unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(100), f.store.load_more_messages(&room)).await;
        assert!(abandoned.is_err());
        assert!(f.store.is_fetching_more());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!f.store.is_fetching_more());
        assert_eq!(f.store.chatroom(&room).unwrap().message_chunks.len(), 2);

        // The flag was released, so paging keeps working.
        assert!(f.store.load_more_messages(&room).await.unwrap());
        assert_eq!(f.store.chatroom(&room).unwrap().message_chunks.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_send_still_stores_reply() {
        let f = slow_fixture(Duration::from_secs(5), Duration::ZERO);
        let room = f.store.create_chatroom("Impatient").unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(100),
            f.store.send_message("Still there?", false, None),
        )
        .await;
        assert!(abandoned.is_err());
        // User message is stored and the reply is pending.
        assert!(f.store.is_typing());
        assert_eq!(f.store.get_messages(&room).len(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!f.store.is_typing());
        let messages = f.store.get_messages(&room);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].sender, Sender::Ai);
        assert_eq!(messages[1].content, "Hello! How can I help?");
    }

    #[tokio::test]
    async fn test_reload_keeps_two_chunks_and_resets_has_more() {
        let f = fixture();
        let room = f.store.create_chatroom("Persist").unwrap();
        f.store.send_message("one", false, None).await.unwrap();
        f.store.send_message("two", false, None).await.unwrap();
        assert!(f.store.can_load_more(&room));

        let reopened = reopen(&f);
        let restored = reopened.chatroom(&room).unwrap();
        assert_eq!(restored.message_chunks.len(), 2);
        assert!(!restored.has_more);
        assert_eq!(reopened.current_chatroom_id(), Some(room.clone()));

        let contents: Vec<String> = reopened
            .get_messages(&room)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["two".to_string(), "Hello! How can I help?".to_string()]);
        assert!(!reopened.can_load_more(&room));
    }

    #[test]
    fn test_update_title_and_set_current() {
        let f = fixture();
        let a = f.store.create_chatroom("A").unwrap();
        let b = f.store.create_chatroom("B").unwrap();

        assert!(f.store.update_chatroom_title(&a, "Renamed").unwrap());
        assert!(!f.store.update_chatroom_title("missing", "X").unwrap());
        assert!(f.store.update_chatroom_title(&a, " ").is_err());
        assert_eq!(f.store.chatroom(&a).unwrap().title, "Renamed");

        assert!(f.store.set_current_chatroom(Some(&a)));
        assert_eq!(f.store.current_chatroom().unwrap().id, a);
        assert!(!f.store.set_current_chatroom(Some("missing")));
        assert_eq!(f.store.current_chatroom_id(), Some(a));
        assert!(f.store.set_current_chatroom(None));
        assert!(f.store.current_chatroom().is_none());
        assert!(f.store.chatroom(&b).is_some());
    }

    #[test]
    fn test_clear_notifier_drops_events() {
        let f = fixture();
        f.store.clear_notifier();
        f.store.create_chatroom("Quiet").unwrap();
        assert!(f.notifier.seen().is_empty());
    }

    #[test]
    fn test_clear_all_chat_data() {
        let f = fixture();
        f.store.create_chatroom("A").unwrap();
        f.store.set_is_typing(true);
        f.store.clear_all_chat_data();

        let state = f.store.state();
        assert!(state.chatrooms.is_empty());
        assert!(state.current_chatroom_id.is_none());
        assert!(!state.is_typing);
        assert!(reopen(&f).chatrooms().is_empty());
    }
}
