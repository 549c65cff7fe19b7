//! Registered users and email verification tokens.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{self, KeyValueStorage, MigrationRegistry};

const STORAGE_KEY: &str = "user-directory";
const SNAPSHOT_VERSION: u32 = 1;

/// Lifetime of an email verification token.
pub const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub role: String,
    pub is_verified: bool,
    #[serde(default)]
    pub email_verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    verification_token: Option<String>,
    #[serde(default)]
    verification_token_expires: Option<DateTime<Utc>>,
}

impl User {
    /// A fresh verified user signing in with `phone`.
    pub fn for_phone(phone: &str) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        Self {
            name: format!("User-{}", &id[..8]),
            email: format!("{digits}@example.com"),
            phone_number: phone.to_string(),
            role: "user".to_string(),
            is_verified: true,
            email_verified_at: None,
            verification_token: None,
            verification_token_expires: None,
            id,
        }
    }
}

/// Why an email verification link was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EmailVerificationError {
    #[error("InvalidToken")]
    InvalidToken,
    #[error("InvalidOrExpiredToken")]
    InvalidOrExpiredToken,
}

/// Users keyed by id, persisted to key/value storage.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    users: Arc<RwLock<HashMap<String, User>>>,
    storage: Arc<dyn KeyValueStorage>,
}

impl UserDirectory {
    pub fn open(storage: Arc<dyn KeyValueStorage>) -> Self {
        let users: Vec<User> = storage::load_snapshot(
            storage.as_ref(),
            STORAGE_KEY,
            &MigrationRegistry::new(SNAPSHOT_VERSION),
        )
        .unwrap_or_default();
        let users = users.into_iter().map(|u| (u.id.clone(), u)).collect();
        Self {
            users: Arc::new(RwLock::new(users)),
            storage,
        }
    }

    pub fn get(&self, id: &str) -> Option<User> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn find_by_email(&self, email: &str) -> Option<User> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    /// The user owning `phone`, created on first sign-in.
    pub fn find_or_create_by_phone(&self, phone: &str) -> User {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(user) = users.values().find(|u| u.phone_number == phone) {
            return user.clone();
        }

        let user = User::for_phone(phone);
        tracing::info!(name: "auth.user.created", user_id = %user.id, "User created");
        users.insert(user.id.clone(), user.clone());
        self.persist(&users);
        user
    }

    /// Issue a fresh verification token for `email`. `None` if no user has
    /// that address.
    pub fn issue_verification_token(&self, email: &str) -> Option<String> {
        self.issue_verification_token_at(email, Utc::now())
    }

    fn issue_verification_token_at(&self, email: &str, now: DateTime<Utc>) -> Option<String> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let user = users
            .values_mut()
            .find(|u| u.email.eq_ignore_ascii_case(email))?;

        let token = uuid::Uuid::new_v4().simple().to_string();
        user.verification_token = Some(token.clone());
        user.verification_token_expires = Some(now + Duration::hours(VERIFICATION_TOKEN_TTL_HOURS));
        self.persist(&users);
        Some(token)
    }

    /// Consume a verification token and mark the owner's email verified.
    pub fn verify_email(&self, token: &str) -> Result<User, EmailVerificationError> {
        self.verify_email_at(token, Utc::now())
    }

    fn verify_email_at(&self, token: &str, now: DateTime<Utc>) -> Result<User, EmailVerificationError> {
        if token.is_empty() {
            return Err(EmailVerificationError::InvalidToken);
        }

        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let user = users
            .values_mut()
            .find(|u| {
                u.verification_token.as_deref() == Some(token)
                    && u.verification_token_expires.is_some_and(|exp| exp > now)
            })
            .ok_or(EmailVerificationError::InvalidOrExpiredToken)?;

        user.email_verified_at = Some(now);
        user.verification_token = None;
        user.verification_token_expires = None;
        let verified = user.clone();
        self.persist(&users);
        Ok(verified)
    }

    fn persist(&self, users: &HashMap<String, User>) {
        let list: Vec<&User> = users.values().collect();
        storage::save_snapshot(self.storage.as_ref(), STORAGE_KEY, SNAPSHOT_VERSION, &list);
    }
}
