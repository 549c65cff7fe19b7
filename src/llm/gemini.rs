//! Google Generative Language API driver.
//!
//! Implements [`GenerativeModel`] over the REST `generateContent` endpoint.
//! A chat call is stateless on the wire: the seeded history and the new
//! message are sent together as `contents`.

use serde_json::{Value, json};

use super::{GenerativeModel, ProviderError, Turn};

/// Gemini connection and generation settings.
#[derive(Clone)]
pub struct GeminiSettings {
    /// Base URL (e.g., `https://generativelanguage.googleapis.com`).
    pub base_url: String,
    /// API key sent as `x-goog-api-key`.
    pub api_key: String,
    /// Model identifier (e.g., `gemini-2.0-flash`).
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl std::fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl GeminiSettings {
    /// Build the `generateContent` URL for the configured model.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

/// Client for the Gemini `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    settings: GeminiSettings,
}

impl GeminiClient {
    #[must_use]
    pub fn new(settings: GeminiSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &GeminiSettings {
        &self.settings
    }

    async fn generate_contents(&self, contents: Vec<Value>) -> Result<String, ProviderError> {
        let body = request_body(&self.settings, contents);

        let resp = self
            .http
            .post(self.settings.endpoint())
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let message = error_message(&raw)
                .unwrap_or_else(|| format!("[{}] {}", status.as_u16(), raw.trim()));
            tracing::warn!(
                name: "llm.gemini.error",
                status = status.as_u16(),
                message = %message,
                "Gemini API returned an error"
            );
            return Err(ProviderError::from_status(status.as_u16(), message));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        response_text(&value)
    }
}

#[async_trait::async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.generate_contents(vec![Turn::user(prompt).to_content()])
            .await
    }

    async fn chat(&self, history: &[Turn], message: &str) -> Result<String, ProviderError> {
        let contents = history
            .iter()
            .map(Turn::to_content)
            .chain(std::iter::once(Turn::user(message).to_content()))
            .collect();
        self.generate_contents(contents).await
    }
}

/// JSON body for a `generateContent` call.
fn request_body(settings: &GeminiSettings, contents: Vec<Value>) -> Value {
    json!({
        "contents": contents,
        "generationConfig": {
            "maxOutputTokens": settings.max_output_tokens,
            "temperature": settings.temperature,
            "topP": settings.top_p,
            "topK": settings.top_k,
        }
    })
}

/// Concatenate the text parts of the first candidate.
fn response_text(value: &Value) -> Result<String, ProviderError> {
    let parts = value["candidates"][0]["content"]["parts"].as_array();
    let text: String = parts
        .into_iter()
        .flatten()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();

    if text.is_empty() {
        let reason = value["promptFeedback"]["blockReason"]
            .as_str()
            .or_else(|| value["candidates"][0]["finishReason"].as_str())
            .unwrap_or("no candidates");
        return Err(ProviderError::InvalidResponse(format!(
            "Empty response from model ({reason})"
        )));
    }
    Ok(text)
}

/// Extract `error.message` from a Google API error body.
fn error_message(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    value["error"]["message"]
        .as_str()
        .filter(|m| !m.trim().is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> GeminiSettings {
        GeminiSettings {
            base_url: "https://generativelanguage.googleapis.com/".to_string(),
            api_key: "secret".to_string(),
            model: "gemini-2.0-flash".to_string(),
            max_output_tokens: 1000,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
        }
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            settings().endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_debug_hides_api_key() {
        let debug = format!("{:?}", settings());
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_request_body_carries_generation_config() {
        let body = request_body(&settings(), vec![Turn::user("hi").to_content()]);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1000);
        assert_eq!(body["generationConfig"]["topK"], 40);
    }

    #[test]
    fn test_response_text_joins_parts() {
        let value = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hello " }, { "text": "there" }] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(response_text(&value).unwrap(), "Hello there");
    }

    #[test]
    fn test_response_text_reports_block_reason() {
        let value = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = response_text(&value).unwrap_err();
        assert_eq!(
            err,
            ProviderError::InvalidResponse("Empty response from model (SAFETY)".into())
        );
    }

    #[test]
    fn test_error_message_extraction() {
        let raw = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            error_message(raw).as_deref(),
            Some("Resource has been exhausted")
        );
        assert!(error_message("<html>").is_none());
    }
}
