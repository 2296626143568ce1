//! LLM-completion executor
//!
//! Builds the prompt from a literal config string or, when blank, from a
//! prompt-store lookup by key (same for the optional system message), then
//! template-substitutes both against the non-prompt resolved inputs and
//! invokes the configured completion provider.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::StepError;
use crate::provider::{ChatMessage, CompletionProvider, CompletionRequest, PromptStore};
use crate::reference;
use crate::workflow::{LlmCompletionConfig, OutputMap, Step};

pub struct LlmCompletionExecutor {
    provider: Arc<dyn CompletionProvider>,
    prompt_store: Arc<dyn PromptStore>,
}

impl LlmCompletionExecutor {
    pub fn new(provider: Arc<dyn CompletionProvider>, prompt_store: Arc<dyn PromptStore>) -> Self {
        Self {
            provider,
            prompt_store,
        }
    }

    pub async fn execute(
        &self,
        step: &Step,
        cfg: &LlmCompletionConfig,
        inputs: &OutputMap,
    ) -> Result<OutputMap, StepError> {
        let prompt_text = self.text_or_lookup(&cfg.prompt, cfg.prompt_key.as_deref())?;
        let Some(prompt_text) = prompt_text else {
            return Err(StepError::MissingInput("prompt".to_string()));
        };
        let system_text = self.text_or_lookup(&cfg.system, cfg.system_key.as_deref())?;

        // Substitute {{var}} placeholders against the non-prompt inputs
        let scope = template_scope(inputs);
        let prompt = reference::render(&prompt_text, &scope);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_text {
            messages.push(ChatMessage::system(reference::render(&system, &scope)));
        }
        messages.push(ChatMessage::user(prompt));

        tracing::debug!(
            step_id = %step.id,
            model = %cfg.model,
            provider = self.provider.name(),
            "requesting completion"
        );

        let response = self
            .provider
            .complete(CompletionRequest {
                model: cfg.model.clone(),
                messages,
                max_tokens: cfg.max_tokens,
                temperature: cfg.temperature,
            })
            .await
            .map_err(|e| StepError::Provider(e.to_string()))?;

        let text = response.text.trim().to_string();
        if text.is_empty() {
            return Err(StepError::EmptyCompletion);
        }

        let mut outputs = Map::new();
        outputs.insert(step.first_output().to_string(), Value::String(text));
        Ok(outputs)
    }

    /// Literal text when non-blank, otherwise a store lookup by key.
    /// `Ok(None)` means neither was configured.
    fn text_or_lookup(
        &self,
        literal: &str,
        key: Option<&str>,
    ) -> Result<Option<String>, StepError> {
        if !literal.trim().is_empty() {
            return Ok(Some(literal.to_string()));
        }
        match key {
            Some(key) => self
                .prompt_store
                .get(key)
                .map(Some)
                .ok_or_else(|| StepError::PromptNotFound(key.to_string())),
            None => Ok(None),
        }
    }
}

/// Resolved inputs minus the prompt-shaped entries, as a template root.
fn template_scope(inputs: &OutputMap) -> Value {
    let scope: OutputMap = inputs
        .iter()
        .filter(|(name, _)| name.as_str() != "prompt" && name.as_str() != "system")
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    Value::Object(scope)
}
