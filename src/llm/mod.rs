//! Generative-AI reply generation.
//!
//! This module turns a role-tagged conversation into a single reply string
//! from a hosted text model.
//!
//! # Overview
//!
//! The [`GenerativeModel`] trait is the provider seam: one single-shot call
//! and one history-seeded chat call. [`ResponseGenerator`] sits on top and
//! adds turn filtering, call spacing, rate-limit retries and the mapping of
//! provider failures to readable text.
//!
//! # Drivers
//!
//! - [`GeminiClient`]: Google Generative Language API (`:generateContent`)

pub mod gemini;
pub mod generator;
pub mod spacing;

pub use gemini::{GeminiClient, GeminiSettings};
pub use generator::ResponseGenerator;
pub use spacing::CallSpacer;

use serde::{Deserialize, Serialize};

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The person chatting.
    User,
    /// The AI assistant.
    Model,
}

/// One turn of a conversation with a single text segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }

    /// Provider wire shape: `{ "role": ..., "parts": [{ "text": ... }] }`.
    #[must_use]
    pub fn to_content(&self) -> serde_json::Value {
        serde_json::json!({
            "role": self.role,
            "parts": [{ "text": self.text }],
        })
    }
}

/// Failures reported by a generative model provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider throttled the request (HTTP 429).
    #[error("{0}")]
    RateLimited(String),

    /// The API key was rejected (HTTP 401/403).
    #[error("{0}")]
    Unauthorized(String),

    /// The model does not exist (HTTP 404).
    #[error("{0}")]
    NotFound(String),

    /// Any other error status.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The request never got a response.
    #[error("{0}")]
    Transport(String),

    /// The response could not be understood.
    #[error("{0}")]
    InvalidResponse(String),

    /// Filtering left no user turn to answer.
    #[error("No user message found in the conversation")]
    NoUserMessage,
}

impl ProviderError {
    /// Classify an unsuccessful HTTP status.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            429 => Self::RateLimited(message),
            401 | 403 => Self::Unauthorized(message),
            404 => Self::NotFound(message),
            _ => Self::Api { status, message },
        }
    }
}

/// A hosted text model.
#[async_trait::async_trait]
pub trait GenerativeModel: Send + Sync + std::fmt::Debug {
    /// Generate a reply to a single prompt with no history.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Start a chat seeded with `history` and send `message` as the next
    /// user turn.
    async fn chat(&self, history: &[Turn], message: &str) -> Result<String, ProviderError>;
}
