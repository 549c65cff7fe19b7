//! Locally known session user and OTP-flow progress.
//!
//! A derived cache of the signed session, kept current by
//! [`super::sync`]. Persisted on every change.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::SessionUser;
use crate::storage::{self, KeyValueStorage, MigrationRegistry};

const SNAPSHOT_VERSION: u32 = 0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub user: Option<SessionUser>,
    pub is_authenticated: bool,
    pub otp_sent: bool,
    pub otp_verified: bool,
}

#[derive(Debug, Clone)]
pub struct AuthSessionStore {
    state: Arc<RwLock<AuthState>>,
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl AuthSessionStore {
    pub fn open(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let state = storage::load_snapshot(
            storage.as_ref(),
            &key,
            &MigrationRegistry::new(SNAPSHOT_VERSION),
        )
        .unwrap_or_default();
        Self {
            state: Arc::new(RwLock::new(state)),
            storage,
            key,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.state().user
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated
    }

    /// Set or clear the user; `is_authenticated` follows.
    pub fn set_user(&self, user: Option<SessionUser>) {
        self.update(|s| {
            s.is_authenticated = user.is_some();
            s.user = user;
        });
    }

    pub fn set_otp_sent(&self, sent: bool) {
        self.update(|s| s.otp_sent = sent);
    }

    pub fn set_otp_verified(&self, verified: bool) {
        self.update(|s| s.otp_verified = verified);
    }

    /// Forget the user and reset the OTP flags.
    pub fn logout(&self) {
        self.update(|s| *s = AuthState::default());
    }

    fn update(&self, f: impl FnOnce(&mut AuthState)) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
        storage::save_snapshot(self.storage.as_ref(), &self.key, SNAPSHOT_VERSION, &*state);
    }
}
