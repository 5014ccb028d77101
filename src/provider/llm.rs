//! [`ProviderClient`] over an `edgequake-llm` chat provider.
//!
//! This module turns one page of source text into a chat completion and
//! classifies what comes back. It is intentionally thin: all prompt text
//! lives in [`crate::prompts`] and the retry loop lives in
//! [`crate::retry`], so this file only builds messages, bounds the call with
//! a timeout and maps errors.

use crate::config::TranslationConfig;
use crate::error::ProviderError;
use crate::prompts;
use crate::provider::classify::ErrorClassifier;
use crate::provider::{ProviderClient, TranslationContext};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct LlmProviderClient {
    inner: Arc<dyn LLMProvider>,
    name: String,
    model: String,
    classifier: ErrorClassifier,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
    system_prompt: Option<String>,
}

impl LlmProviderClient {
    /// Wrap `inner` with the generation and classification settings in `config`.
    ///
    /// `config.classifier` overrides the preset table for `name`.
    pub fn from_config(
        inner: Arc<dyn LLMProvider>,
        name: &str,
        model: &str,
        config: &TranslationConfig,
    ) -> Self {
        Self {
            inner,
            name: name.to_string(),
            model: model.to_string(),
            classifier: config
                .classifier
                .clone()
                .unwrap_or_else(|| ErrorClassifier::for_provider(name)),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs),
            system_prompt: config.system_prompt.clone(),
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ProviderClient for LlmProviderClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    /// ## Message Layout
    ///
    /// 1. **System message**: the translation rules for the target language
    /// 2. **User message**: previous headings, the tail of the previous page,
    ///    then the page text
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        context: &TranslationContext,
    ) -> Result<String, ProviderError> {
        let messages = vec![
            ChatMessage::system(prompts::system_prompt(
                self.system_prompt.as_deref(),
                target_language,
            )),
            ChatMessage::user(prompts::user_prompt(text, target_language, context)),
        ];
        let options = self.options();
        let start = Instant::now();

        let response =
            match tokio::time::timeout(self.timeout, self.inner.chat(&messages, Some(&options)))
                .await
            {
                Err(_) => {
                    return Err(ProviderError::retryable(format!(
                        "request timed out after {}s",
                        self.timeout.as_secs()
                    )))
                }
                Ok(Err(e)) => return Err(self.classifier.classify(&e.to_string())),
                Ok(Ok(response)) => response,
            };

        debug!(
            provider = %self.name,
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(ProviderError::retryable("provider returned an empty response"));
        }
        Ok(response.content)
    }
}
