//! Completion provider abstraction
//!
//! How the LLM executor talks to a model backend: one [`CompletionProvider`]
//! trait, an HTTP implementation for OpenAI-compatible chat-completions APIs,
//! and a mock for tests. A [`PromptStore`] resolves symbolic prompt keys to
//! literal prompt text when a step configures a key instead of an inline
//! prompt.

mod mock;
mod openai;

pub use mock::MockProvider;
pub use openai::OpenAiProvider;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

/// Create-completion contract: {model, messages, max_tokens, temperature} →
/// one text choice.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name (e.g. "openai", "mock").
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }
}

/// Create a provider instance by name.
///
/// | Name | Requires |
/// |------|----------|
/// | `openai` | `OPENAI_API_KEY` env var |
/// | `mock` | Nothing |
pub fn create_provider(name: &str) -> Result<Arc<dyn CompletionProvider>> {
    match name.to_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new()?)),
        "mock" => Ok(Arc::new(MockProvider::new())),
        _ => anyhow::bail!("Unknown provider: '{}'. Available: openai, mock", name),
    }
}

/// Resolves a symbolic prompt key to literal prompt text.
pub trait PromptStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-process prompt store backed by a plain map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPromptStore {
    prompts: HashMap<String, String>,
}

impl InMemoryPromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.prompts.insert(key.into(), text.into());
    }

    pub fn with(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(key, text);
        self
    }
}

impl PromptStore for InMemoryPromptStore {
    fn get(&self, key: &str) -> Option<String> {
        self.prompts.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_mock() {
        let provider = create_provider("mock").unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn create_provider_unknown() {
        assert!(create_provider("oracle").is_err());
    }

    #[test]
    fn prompt_store_lookup() {
        let store = InMemoryPromptStore::new().with("video-ideas", "Give me {{count}} ideas");
        assert_eq!(
            store.get("video-ideas").as_deref(),
            Some("Give me {{count}} ideas")
        );
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn token_usage_totals() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total_tokens, 150);
    }
}
