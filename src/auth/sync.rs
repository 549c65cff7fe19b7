//! One-way mirror from the signed session into [`AuthSessionStore`].

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::SessionUser;
use super::store::AuthSessionStore;

/// Status of the authoritative session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Loading,
    Authenticated,
    Unauthenticated,
}

/// What the synchronizer observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedSession {
    pub status: SessionStatus,
    pub user: Option<SessionUser>,
}

impl ObservedSession {
    pub fn loading() -> Self {
        Self {
            status: SessionStatus::Loading,
            user: None,
        }
    }

    pub fn authenticated(user: SessionUser) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            user: Some(user),
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            user: None,
        }
    }
}

/// Mirror one observation into the store.
pub fn apply(session: &ObservedSession, store: &AuthSessionStore) {
    match (session.status, &session.user) {
        (SessionStatus::Authenticated, Some(user)) => store.set_user(Some(user.clone())),
        (SessionStatus::Unauthenticated, _) if store.is_authenticated() => {
            tracing::debug!(name: "auth.sync.logout", "Session ended, clearing local auth state");
            store.logout();
        }
        _ => {}
    }
}

/// Mirror every change published on `sessions` until the sender is gone.
pub fn spawn(mut sessions: watch::Receiver<ObservedSession>, store: AuthSessionStore) -> JoinHandle<()> {
    tokio::spawn(async move {
        apply(&sessions.borrow_and_update(), &store);
        while sessions.changed().await.is_ok() {
            let session = sessions.borrow_and_update().clone();
            apply(&session, &store);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    fn user() -> SessionUser {
        SessionUser {
            id: "u1".into(),
            email: "e@example.com".into(),
            name: "User-1".into(),
            phone_number: "+15551234567".into(),
        }
    }

    fn store() -> AuthSessionStore {
        AuthSessionStore::open(Arc::new(MemoryStorage::new()), "auth-storage")
    }

    #[test]
    fn test_authenticated_copies_user() {
        let store = store();
        apply(&ObservedSession::authenticated(user()), &store);
        assert_eq!(store.user(), Some(user()));
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_loading_has_no_effect() {
        let store = store();
        store.set_otp_sent(true);
        apply(&ObservedSession::loading(), &store);
        assert!(store.state().otp_sent);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_unauthenticated_logs_out_only_when_needed() {
        let store = store();
        store.set_otp_sent(true);
        // Not authenticated locally: flags are left alone.
        apply(&ObservedSession::unauthenticated(), &store);
        assert!(store.state().otp_sent);

        store.set_user(Some(user()));
        apply(&ObservedSession::unauthenticated(), &store);
        assert!(!store.is_authenticated());
        assert!(!store.state().otp_sent);
    }

    #[tokio::test]
    async fn test_spawned_sync_follows_channel() {
        let store = store();
        let (tx, rx) = watch::channel(ObservedSession::loading());
        let handle = spawn(rx, store.clone());

        tx.send_replace(ObservedSession::authenticated(user()));
        tokio::task::yield_now().await;
        tx.send_replace(ObservedSession::unauthenticated());
        drop(tx);
        handle.await.unwrap();

        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_spawned_sync_applies_latest_value() {
        let store = store();
        let (tx, rx) = watch::channel(ObservedSession::authenticated(user()));
        let handle = spawn(rx, store.clone());
        drop(tx);
        handle.await.unwrap();

        assert_eq!(store.user(), Some(user()));
    }
}
