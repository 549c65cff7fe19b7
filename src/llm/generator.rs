//! Reply generation with call spacing, retries and readable failures.

use std::sync::Arc;
use std::time::Duration;

use super::{CallSpacer, GenerativeModel, ProviderError, Turn, TurnRole};
use crate::chat::{ChatError, Responder};

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please wait a moment and try again.";
pub const UNAUTHORIZED_MESSAGE: &str = "Invalid API key. Please check your Gemini API key.";
pub const NOT_FOUND_MESSAGE: &str =
    "The requested model was not found. Please check the model name.";
pub const FALLBACK_MESSAGE: &str =
    "I'm having trouble connecting to the AI service. Please try again later.";

/// Turns a conversation into one reply string.
///
/// Never fails: every provider failure resolves to a message the user can
/// read.
#[derive(Debug, Clone)]
pub struct ResponseGenerator {
    model: Arc<dyn GenerativeModel>,
    spacer: Arc<CallSpacer>,
    max_retries: u32,
    backoff_base: Duration,
}

impl ResponseGenerator {
    /// Create a generator over `model`, spaced by the shared `spacer`.
    pub fn new(model: Arc<dyn GenerativeModel>, spacer: Arc<CallSpacer>) -> Self {
        Self {
            model,
            spacer,
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        }
    }

    /// Override the retry policy for rate-limited calls.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, backoff_base: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff_base = backoff_base;
        self
    }

    /// Generate a reply for `turns`.
    pub async fn generate(&self, turns: &[Turn]) -> String {
        let turns = filter_turns(turns);
        let mut retry = 0;

        loop {
            self.spacer.wait_turn().await;

            match self.attempt(&turns).await {
                Ok(text) => return text,
                Err(ProviderError::RateLimited(_)) if retry < self.max_retries => {
                    let delay = self.backoff_base * 2u32.pow(retry);
                    retry += 1;
                    tracing::warn!(
                        name: "llm.retry",
                        attempt = retry,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis(),
                        "Rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(name: "llm.failed", error = %e, "Error generating response");
                    return describe(&e);
                }
            }
        }
    }

    async fn attempt(&self, turns: &[Turn]) -> Result<String, ProviderError> {
        let last_user = turns
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::User)
            .ok_or(ProviderError::NoUserMessage)?;

        tracing::debug!(name: "llm.request", turns = turns.len(), "Sending request to model");

        if turns.len() <= 1 {
            return self.model.generate(&last_user.text).await;
        }
        let history = &turns[..turns.len() - 1];
        self.model.chat(history, &last_user.text).await
    }
}

#[async_trait::async_trait]
impl Responder for ResponseGenerator {
    async fn respond(&self, turns: Vec<Turn>) -> Result<String, ChatError> {
        Ok(self.generate(&turns).await)
    }
}

/// Drop empty turns, and model turns that look like earlier error output.
fn filter_turns(turns: &[Turn]) -> Vec<Turn> {
    turns
        .iter()
        .filter(|t| !t.text.trim().is_empty())
        .filter(|t| !(t.role == TurnRole::Model && t.text.contains("error")))
        .cloned()
        .collect()
}

/// Readable text for a provider failure.
fn describe(error: &ProviderError) -> String {
    match error {
        ProviderError::RateLimited(_) => RATE_LIMIT_MESSAGE.to_string(),
        ProviderError::Unauthorized(_) => UNAUTHORIZED_MESSAGE.to_string(),
        ProviderError::NotFound(_) => NOT_FOUND_MESSAGE.to_string(),
        other => {
            let message = other.to_string();
            if message.trim().is_empty() {
                FALLBACK_MESSAGE.to_string()
            } else {
                message
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Call, ScriptedModel};
    use super::*;
    use tokio::time::Instant;

    fn generator(model: &Arc<ScriptedModel>) -> ResponseGenerator {
        let model: Arc<dyn GenerativeModel> = Arc::clone(model) as Arc<dyn GenerativeModel>;
        ResponseGenerator::new(model, Arc::new(CallSpacer::new(Duration::from_millis(2000))))
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_turn_uses_single_shot_call() {
        let model = Arc::new(ScriptedModel::with_results(vec![Ok("Hi!".into())]));
        let reply = generator(&model).generate(&[Turn::user("Hello")]).await;

        assert_eq!(reply, "Hi!");
        assert_eq!(model.calls(), vec![Call::Single("Hello".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_turns_seed_history_and_send_last() {
        let model = Arc::new(ScriptedModel::default());
        let turns = vec![
            Turn::user("You are helpful"),
            Turn::model("I am helpful"),
            Turn::user("What is Rust?"),
        ];
        generator(&model).generate(&turns).await;

        assert_eq!(
            model.calls(),
            vec![Call::Chat {
                history: turns[..2].to_vec(),
                message: "What is Rust?".into(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_empty_and_error_model_turns() {
        let model = Arc::new(ScriptedModel::default());
        let turns = vec![
            Turn::model("Sorry, I encountered an error while generating a response."),
            Turn::user("   "),
            Turn::user("error in my code?"),
        ];
        generator(&model).generate(&turns).await;

        // Only the user's turn survives, so the call is single-shot even
        // though the user's text mentions "error".
        assert_eq!(model.calls(), vec![Call::Single("error in my code?".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_user_turn_resolves_to_message() {
        let model = Arc::new(ScriptedModel::default());
        let reply = generator(&model).generate(&[Turn::model("hello")]).await;

        assert_eq!(reply, "No user message found in the conversation");
        assert!(model.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_calls_are_two_seconds_apart() {
        let model = Arc::new(ScriptedModel::default());
        let generator = generator(&model);

        generator.generate(&[Turn::user("one")]).await;
        generator.generate(&[Turn::user("two")]).await;

        let times = model.call_times();
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_with_backoff_then_succeeds() {
        let model = Arc::new(ScriptedModel::with_results(vec![
            Err(ProviderError::RateLimited("429".into())),
            Err(ProviderError::RateLimited("429".into())),
            Ok("finally".into()),
        ]));
        let start = Instant::now();
        let reply = generator(&model).generate(&[Turn::user("hi")]).await;

        assert_eq!(reply, "finally");
        assert_eq!(model.calls().len(), 3);
        // 1s + 2s of backoff, each retry also respecting the 2s spacing.
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausted_returns_fixed_message() {
        let model = Arc::new(ScriptedModel::with_results(vec![
            Err(ProviderError::RateLimited("429".into()));
            4
        ]));
        let reply = generator(&model).generate(&[Turn::user("hi")]).await;

        assert_eq!(reply, RATE_LIMIT_MESSAGE);
        assert_eq!(model.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_classes_map_to_readable_text() {
        let cases = vec![
            (ProviderError::Unauthorized("401".into()), UNAUTHORIZED_MESSAGE.to_string()),
            (ProviderError::NotFound("404".into()), NOT_FOUND_MESSAGE.to_string()),
            (
                ProviderError::Api { status: 500, message: "Internal error".into() },
                "Internal error".to_string(),
            ),
            (ProviderError::Transport(String::new()), FALLBACK_MESSAGE.to_string()),
        ];

        for (error, expected) in cases {
            let model = Arc::new(ScriptedModel::with_results(vec![Err(error)]));
            let reply = generator(&model).generate(&[Turn::user("hi")]).await;
            assert_eq!(reply, expected);
        }
    }
}
