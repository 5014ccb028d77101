//! Translation providers: one capability, one variant per backend.
//!
//! The pipeline only ever sees a [`ProviderClient`]: "translate this text
//! into that language, given this context". Backends differ in wire format,
//! authentication, default model and error vocabulary, and all of that stays
//! behind the trait:
//!
//! * [`llm::LlmProviderClient`] drives gemini / openai / anthropic (and any
//!   other backend `edgequake-llm` knows) through one `LLMProvider` object.
//! * [`classify::ErrorClassifier`] turns each backend's error text into a
//!   [`ProviderError`] so the retry policy stays backend-agnostic.
//!
//! Tests plug in their own `ProviderClient` implementations.

pub mod classify;
pub mod llm;

use crate::config::TranslationConfig;
use crate::error::{ProviderError, TranslateError};
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

pub use classify::{ErrorClass, ErrorClassifier};
pub use llm::LlmProviderClient;

/// What the provider knows about the pages already translated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationContext {
    /// Tail of the previous page's translation.
    pub recent_translation: Option<String>,
    /// Heading lines (with their `#` markers) translated so far, in order.
    pub previous_headings: Vec<String>,
}

/// A translation backend.
///
/// `translate` must classify every failure: [`ProviderError::Retryable`] for
/// transient conditions, [`ProviderError::Fatal`] for everything a retry
/// cannot fix.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider identity, e.g. `"gemini"`.
    fn name(&self) -> &str;

    /// Model identity; empty when the backend chose it.
    fn model(&self) -> &str {
        ""
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        context: &TranslationContext,
    ) -> Result<String, ProviderError>;
}

// ── Provider resolution ──────────────────────────────────────────────────────

/// Providers with a known API key variable and default model, in
/// auto-detection order.
const KNOWN_PROVIDERS: &[(&str, &str, &str)] = &[
    ("gemini", "GEMINI_API_KEY", "gemini-2.5-flash"),
    ("openai", "OPENAI_API_KEY", "gpt-4.1"),
    ("anthropic", "ANTHROPIC_API_KEY", "claude-3-7-sonnet-latest"),
];

/// Map aliases to the name `edgequake-llm` expects.
pub fn canonical_provider_name(name: &str) -> String {
    match name.trim().to_ascii_lowercase().as_str() {
        "claude" => "anthropic".to_string(),
        "google" => "gemini".to_string(),
        other => other.to_string(),
    }
}

/// Default model for a provider, when one is known.
pub fn default_model(provider: &str) -> Option<&'static str> {
    let provider = canonical_provider_name(provider);
    KNOWN_PROVIDERS
        .iter()
        .find(|(name, _, _)| *name == provider)
        .map(|(_, _, model)| *model)
}

/// Resolve the translation provider, from most-specific to least-specific.
///
/// 1. **Pre-built client** (`config.provider`): used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or the
///    provider's default model.
/// 3. **Environment pair**: `PDFTRANSLATE_PROVIDER` (+ optional
///    `PDFTRANSLATE_MODEL`).
/// 4. **First API key present**: `GEMINI_API_KEY`, `OPENAI_API_KEY`,
///    `ANTHROPIC_API_KEY`, in that order.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(
    config: &TranslationConfig,
) -> Result<Arc<dyn ProviderClient>, TranslateError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_llm_client(name, config.model.as_deref(), config);
    }

    if let Ok(name) = std::env::var("PDFTRANSLATE_PROVIDER") {
        if !name.is_empty() {
            let model = config
                .model
                .clone()
                .or_else(|| std::env::var("PDFTRANSLATE_MODEL").ok().filter(|m| !m.is_empty()));
            return create_llm_client(&name, model.as_deref(), config);
        }
    }

    for (name, key_var, _) in KNOWN_PROVIDERS {
        if std::env::var(key_var).map(|k| !k.is_empty()).unwrap_or(false) {
            debug!("Auto-selected provider '{}' from {}", name, key_var);
            return create_llm_client(name, config.model.as_deref(), config);
        }
    }

    let (llm, _embedding) =
        ProviderFactory::from_env().map_err(|e| TranslateError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(LlmProviderClient::from_config(
        llm, "auto", "", config,
    )))
}

/// Instantiate a named `edgequake-llm` provider and wrap it.
fn create_llm_client(
    provider_name: &str,
    model: Option<&str>,
    config: &TranslationConfig,
) -> Result<Arc<dyn ProviderClient>, TranslateError> {
    let name = canonical_provider_name(provider_name);
    let model = model
        .or_else(|| default_model(&name))
        .ok_or_else(|| TranslateError::ProviderNotConfigured {
            provider: name.clone(),
            hint: "No default model is known for this provider; pass --model.".to_string(),
        })?;

    let llm: Arc<dyn LLMProvider> =
        ProviderFactory::create_llm_provider(&name, model).map_err(|e| {
            TranslateError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })?;

    debug!("Using provider '{}' with model '{}'", name, model);
    Ok(Arc::new(LlmProviderClient::from_config(
        llm, &name, model, config,
    )))
}
