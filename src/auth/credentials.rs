//! The "credentials" sign-in provider: phone number plus SMS code.

use std::sync::Arc;

use serde::Deserialize;

use super::otp::{self, INVALID_CODE_MESSAGE, OtpProvider};
use super::users::{User, UserDirectory};
use super::validation::{self, ValidationError};

/// Fields posted to the credentials callback.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub otp: String,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignInError {
    #[error("Phone number and OTP are required")]
    MissingCredentials,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("{0}")]
    Rejected(String),
}

/// Re-verifies the code with the SMS provider and resolves the user.
#[derive(Debug, Clone)]
pub struct CredentialsProvider {
    otp: Arc<dyn OtpProvider>,
    users: UserDirectory,
}

impl CredentialsProvider {
    pub fn new(otp: Arc<dyn OtpProvider>, users: UserDirectory) -> Self {
        Self { otp, users }
    }

    pub async fn authorize(&self, credentials: &Credentials) -> Result<User, SignInError> {
        let phone = credentials.phone_number.trim();
        let code = credentials.otp.trim();
        if phone.is_empty() || code.is_empty() {
            return Err(SignInError::MissingCredentials);
        }
        validation::validate_phone(phone)?;
        validation::validate_otp(code)?;

        let phone = validation::normalize_phone(phone, credentials.country_code.as_deref());
        let verification = otp::verify_code(self.otp.as_ref(), &phone, code).await;
        if !verification.success {
            let reason = verification
                .error
                .unwrap_or_else(|| INVALID_CODE_MESSAGE.to_string());
            tracing::warn!(name: "auth.signin.rejected", reason = %reason, "OTP verification failed");
            return Err(SignInError::Rejected(reason));
        }

        let user = self.users.find_or_create_by_phone(&phone);
        tracing::info!(name: "auth.signin.succeeded", user_id = %user.id, "User signed in");
        Ok(user)
    }
}

/// Where to send the browser after sign-in.
///
/// Relative paths resolve against `base_url`, same-origin URLs pass
/// through, anything else collapses to `base_url`.
pub fn resolve_callback(callback: &str, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if callback.starts_with('/') && !callback.starts_with("//") {
        return format!("{base}{callback}");
    }
    match (url::Url::parse(callback), url::Url::parse(base)) {
        (Ok(target), Ok(base_parsed)) if target.origin() == base_parsed.origin() => {
            callback.to_string()
        }
        _ => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::otp::testing::FakeOtp;
    use crate::storage::{KeyValueStorage, MemoryStorage};

    fn provider() -> (CredentialsProvider, UserDirectory) {
        let users = UserDirectory::open(Arc::new(MemoryStorage::new()) as Arc<dyn KeyValueStorage>);
        let provider = CredentialsProvider::new(Arc::new(FakeOtp::approving("123456")), users.clone());
        (provider, users)
    }

    fn creds(phone: &str, otp: &str) -> Credentials {
        Credentials {
            phone_number: phone.into(),
            otp: otp.into(),
            country_code: Some("+1".into()),
            callback_url: None,
        }
    }

    #[tokio::test]
    async fn test_approved_code_signs_in_and_reuses_user() {
        let (provider, users) = provider();
        let first = provider.authorize(&creds("555 123 4567", "123456")).await.unwrap();
        assert_eq!(first.phone_number, "+15551234567");

        let again = provider.authorize(&creds("+1 555 123 4567", "123456")).await.unwrap();
        assert_eq!(again.id, first.id);
        assert!(users.get(&first.id).is_some());
    }

    #[tokio::test]
    async fn test_pending_code_is_rejected() {
        let (provider, _) = provider();
        let err = provider.authorize(&creds("5551234567", "000000")).await.unwrap_err();
        assert_eq!(err, SignInError::Rejected("Invalid verification code".into()));
    }

    #[tokio::test]
    async fn test_missing_and_malformed_input() {
        let (provider, _) = provider();
        assert_eq!(
            provider.authorize(&creds("", "123456")).await,
            Err(SignInError::MissingCredentials)
        );
        assert_eq!(
            provider.authorize(&creds("5551234567", "12")).await,
            Err(SignInError::Invalid(ValidationError::OtpLength))
        );
    }

    #[test]
    fn test_resolve_callback() {
        let base = "http://localhost:3000";
        assert_eq!(resolve_callback("/dashboard", base), "http://localhost:3000/dashboard");
        assert_eq!(
            resolve_callback("http://localhost:3000/chat/1", base),
            "http://localhost:3000/chat/1"
        );
        assert_eq!(resolve_callback("https://evil.example/", base), base);
        assert_eq!(resolve_callback("//evil.example", base), base);
        assert_eq!(resolve_callback("not a url", base), base);
    }
}
