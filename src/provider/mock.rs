//! Mock provider for tests
//!
//! Queued responses, recorded requests, optional failure simulation. No
//! network.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use super::{CompletionProvider, CompletionRequest, CompletionResponse, TokenUsage};

pub struct MockProvider {
    /// FIFO queue of responses; falls back to the default when drained.
    responses: Arc<Mutex<Vec<String>>>,
    default_response: String,
    /// Every request made, for assertions.
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    fail_with: Option<String>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![])),
            default_response: "Mock completion".to_string(),
            requests: Arc::new(Mutex::new(vec![])),
            fail_with: None,
        }
    }

    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::new()
        }
    }

    pub fn with_default(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Make every call fail with this message.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().unwrap().push(request);

        if let Some(message) = &self.fail_with {
            anyhow::bail!("{}", message.clone());
        }

        let text = {
            let mut queue = self.responses.lock().unwrap();
            if queue.is_empty() {
                self.default_response.clone()
            } else {
                queue.remove(0)
            }
        };

        Ok(CompletionResponse {
            usage: Some(TokenUsage::new(10, text.len() as u32 / 3)),
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: 64,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn queued_responses_drain_to_default() {
        let provider = MockProvider::with_responses(vec!["first".to_string()]);

        assert_eq!(provider.complete(request("a")).await.unwrap().text, "first");
        assert_eq!(
            provider.complete(request("b")).await.unwrap().text,
            "Mock completion"
        );
    }

    #[tokio::test]
    async fn records_requests() {
        let provider = MockProvider::new();
        provider.complete(request("what's up")).await.unwrap();

        let last = provider.last_request().unwrap();
        assert_eq!(last.messages[0].content, "what's up");
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn failing_provider_errors() {
        let provider = MockProvider::new().failing("boom");
        let err = provider.complete(request("x")).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
