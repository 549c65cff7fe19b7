//! Per-user state held by the server.
//!
//! Each signed-in user gets a [`UserSession`]: their chat store, their
//! local auth mirror, a notification channel for their open tabs and the
//! synchronizer that keeps the mirror aligned with the signed session.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = SessionRegistry::new(responder, history, storage);
//! let session = registry.get_or_open("user-1");
//! session.chat.create_chatroom("Trip Planning")?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use crate::auth::store::AuthSessionStore;
use crate::auth::sync::{self, ObservedSession};
use crate::chat::{BroadcastNotifier, ChatStore, HistorySource, Notifier, Responder};
use crate::storage::KeyValueStorage;

/// Storage key prefix of a user's chat snapshot.
pub const CHAT_STORAGE_KEY: &str = "gemini-chat-storage";
/// Storage key prefix of a user's auth mirror.
pub const AUTH_STORAGE_KEY: &str = "auth-storage";

/// Everything the server keeps for one user.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub user_id: String,
    pub chat: ChatStore,
    pub auth: AuthSessionStore,
    pub notifications: BroadcastNotifier,
    observed: Arc<watch::Sender<ObservedSession>>,
}

impl UserSession {
    /// Publish the latest view of the signed session to the synchronizer.
    pub fn observe(&self, session: ObservedSession) {
        self.observed.send_if_modified(|current| {
            if *current == session {
                false
            } else {
                *current = session;
                true
            }
        });
    }
}

/// Thread-safe registry of [`UserSession`]s keyed by user id.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    sessions: RwLock<HashMap<String, UserSession>>,
    responder: Arc<dyn Responder>,
    history: Arc<dyn HistorySource>,
    storage: Arc<dyn KeyValueStorage>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(
        responder: Arc<dyn Responder>,
        history: Arc<dyn HistorySource>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                responder,
                history,
                storage,
            }),
        }
    }

    /// The session of `user_id`, if already open.
    pub fn get(&self, user_id: &str) -> Option<UserSession> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    /// The session of `user_id`, restoring it from storage on first use.
    ///
    /// Must be called from within a tokio runtime.
    pub fn get_or_open(&self, user_id: &str) -> UserSession {
        if let Some(session) = self.get(user_id) {
            return session;
        }

        let mut sessions = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| self.open(user_id))
            .clone()
    }

    /// Close the session of `user_id`. Its snapshots stay in storage.
    pub fn remove(&self, user_id: &str) -> Option<UserSession> {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id)
    }

    pub fn len(&self) -> usize {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn open(&self, user_id: &str) -> UserSession {
        let chat = ChatStore::open(
            Arc::clone(&self.inner.responder),
            Arc::clone(&self.inner.history),
            Arc::clone(&self.inner.storage),
            format!("{CHAT_STORAGE_KEY}.{user_id}"),
        );
        let notifications = BroadcastNotifier::default();
        chat.set_notifier(Arc::new(notifications.clone()) as Arc<dyn Notifier>);

        let auth = AuthSessionStore::open(
            Arc::clone(&self.inner.storage),
            format!("{AUTH_STORAGE_KEY}.{user_id}"),
        );
        let (observed, rx) = watch::channel(ObservedSession::loading());
        // Ends once the session is dropped and the sender with it.
        sync::spawn(rx, auth.clone());

        tracing::debug!(name: "session.opened", user_id, "User session opened");
        UserSession {
            user_id: user_id.to_string(),
            chat,
            auth,
            notifications,
            observed: Arc::new(observed),
        }
    }
}
