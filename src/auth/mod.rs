//! Phone-number sign-in and session handling.
//!
//! # Architecture
//!
//! - [`validation`]: phone and code rules, E.164 formatting
//! - [`otp`]: SMS verification provider (send / check)
//! - [`credentials`]: the "credentials" sign-in provider
//! - [`users`]: user directory and email verification tokens
//! - [`token`]: signed session tokens
//! - [`store`]: local mirror of the session user and OTP progress
//! - [`sync`]: keeps the mirror aligned with the signed session
//! - [`guard`]: route guard and request middleware
//! - [`errors`]: sign-in error codes

pub mod credentials;
pub mod errors;
pub mod guard;
pub mod otp;
pub mod store;
pub mod sync;
pub mod token;
pub mod users;
pub mod validation;

pub use guard::{CurrentSession, GuardDecision, session_middleware};
pub use otp::{OtpProvider, TwilioSettings, TwilioVerify};
pub use store::AuthSessionStore;
pub use sync::{ObservedSession, SessionStatus};
pub use token::{SessionClaims, SessionTokens};

use serde::{Deserialize, Serialize};

/// The user fields a client sees for its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub phone_number: String,
}
