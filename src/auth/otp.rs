//! SMS one-time-code delivery and checking.
//!
//! Codes are generated and checked by the provider; this module only
//! relays requests. [`TwilioVerify`] speaks the Twilio Verify v2 REST API.

use serde::Serialize;
use serde_json::Value;

/// Failures talking to the SMS provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtpError {
    /// The provider answered with an error.
    #[error("{0}")]
    Provider(String),
    /// The provider could not be reached.
    #[error("{0}")]
    Transport(String),
}

/// A verification was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub sid: String,
}

/// Provider status for a checked code (`approved`, `pending`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeCheck {
    pub status: String,
}

impl CodeCheck {
    pub fn approved(&self) -> bool {
        self.status == "approved"
    }
}

/// An SMS verification service.
#[async_trait::async_trait]
pub trait OtpProvider: Send + Sync + std::fmt::Debug {
    /// Text a fresh code to `phone` (E.164).
    async fn send_code(&self, phone: &str) -> Result<SentCode, OtpError>;

    /// Ask the provider whether `code` is the one sent to `phone`.
    async fn check_code(&self, phone: &str, code: &str) -> Result<CodeCheck, OtpError>;
}

/// Outcome of a verification attempt, as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Default message for a code the provider did not approve.
pub const INVALID_CODE_MESSAGE: &str = "Invalid verification code";

/// Check `code` and fold every outcome into a [`Verification`].
pub async fn verify_code(provider: &dyn OtpProvider, phone: &str, code: &str) -> Verification {
    match provider.check_code(phone, code).await {
        Ok(check) if check.approved() => {
            tracing::info!(name: "auth.otp.approved", "Verification code approved");
            Verification {
                success: true,
                error: None,
                status: Some(check.status),
            }
        }
        Ok(check) => {
            tracing::info!(name: "auth.otp.rejected", status = %check.status, "Verification code rejected");
            Verification {
                success: false,
                error: Some(INVALID_CODE_MESSAGE.to_string()),
                status: Some(check.status),
            }
        }
        Err(e) => {
            tracing::error!(name: "auth.otp.check_failed", error = %e, "Verification check error");
            Verification {
                success: false,
                error: Some(e.to_string()),
                status: None,
            }
        }
    }
}

/// Twilio Verify account settings.
#[derive(Clone)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub verify_service_sid: String,
    /// API root (e.g., `https://verify.twilio.com`).
    pub base_url: String,
}

impl std::fmt::Debug for TwilioSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioSettings")
            .field("account_sid", &sid_prefix(&self.account_sid))
            .field("verify_service_sid", &sid_prefix(&self.verify_service_sid))
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// First five characters of a SID, enough to tell accounts apart in logs.
fn sid_prefix(sid: &str) -> String {
    format!("{}...", sid.chars().take(5).collect::<String>())
}

/// Twilio Verify v2 client.
#[derive(Debug, Clone)]
pub struct TwilioVerify {
    http: reqwest::Client,
    settings: TwilioSettings,
}

impl TwilioVerify {
    pub fn new(settings: TwilioSettings) -> Self {
        tracing::info!(
            name: "auth.otp.configured",
            account_sid = %sid_prefix(&settings.account_sid),
            verify_service_sid = %sid_prefix(&settings.verify_service_sid),
            "SMS verification configured"
        );
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    fn url(&self, resource: &str) -> String {
        format!(
            "{}/v2/Services/{}/{resource}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.verify_service_sid
        )
    }

    async fn post(&self, resource: &str, form: &[(&str, &str)]) -> Result<Value, OtpError> {
        let resp = self
            .http
            .post(self.url(resource))
            .basic_auth(&self.settings.account_sid, Some(&self.settings.auth_token))
            .form(form)
            .send()
            .await
            .map_err(|e| OtpError::Transport(e.to_string()))?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = body["message"]
                .as_str()
                .map_or_else(|| format!("SMS provider returned {status}"), ToString::to_string);
            return Err(OtpError::Provider(message));
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl OtpProvider for TwilioVerify {
    async fn send_code(&self, phone: &str) -> Result<SentCode, OtpError> {
        let body = self
            .post("Verifications", &[("To", phone), ("Channel", "sms")])
            .await?;
        Ok(SentCode {
            sid: body["sid"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn check_code(&self, phone: &str, code: &str) -> Result<CodeCheck, OtpError> {
        let body = self
            .post("VerificationCheck", &[("To", phone), ("Code", code)])
            .await?;
        Ok(CodeCheck {
            status: body["status"].as_str().unwrap_or("pending").to_string(),
        })
    }
}
