//! Generative-model client seam.
//!
//! The pipeline only needs "send a system + user message, get text back";
//! everything it receives through this trait is treated as untrusted.

mod openai;

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

pub use openai::OpenAiClient;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM network error: {0}")]
    Network(String),

    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM returned no content")]
    EmptyResponse,

    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),
}

/// One JSON-mode completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// Runs the call under an upper bound; the timeout is reported as a failure
/// and never retried.
pub async fn complete_within(
    client: &dyn LlmClient,
    request: CompletionRequest,
    limit: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(limit, client.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(limit)),
    }
}

/// Strips a surrounding markdown code fence, if the model added one.
pub fn strip_code_fences(text: &str) -> &str {
    lazy_static! {
        static ref FENCE_RE: Regex = Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n?(.*?)\s*```\s*$")
            .expect("fence regex compiles");
    }
    match FENCE_RE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted responses and records every request it saw.
    #[derive(Default)]
    pub(crate) struct ScriptedLlm {
        responses: Mutex<VecDeque<Result<String, LlmError>>>,
        pub(crate) seen: Mutex<Vec<CompletionRequest>>,
        pub(crate) delay: Option<Duration>,
    }

    impl ScriptedLlm {
        /// Sleeps for `delay` before answering every call.
        pub(crate) fn delayed(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Default::default()
            }
        }

        pub(crate) fn push_ok(&self, text: impl Into<String>) {
            self.responses.lock().unwrap().push_back(Ok(text.into()));
        }

        pub(crate) fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"days\": []}\n```";
        assert_eq!(strip_code_fences(raw), "{\"days\": []}");
    }

    #[test]
    fn leaves_plain_json_untouched() {
        assert_eq!(strip_code_fences("  {\"a\":1}\n"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn timeout_is_reported_as_failure() {
        let llm = ScriptedLlm::delayed(Duration::from_millis(200));
        llm.push_ok("{}");
        let req = CompletionRequest {
            system: "s".into(),
            user: "u".into(),
            temperature: 0.7,
        };
        let err = complete_within(&llm, req, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)));
    }
}
