//! Configuration types for PDF translation.
//!
//! All translation behaviour is controlled through [`TranslationConfig`],
//! built via its [`TranslationConfigBuilder`]. Keeping every knob in one
//! struct makes it trivial to share a config across the documents of a
//! batch and to log exactly what a run used.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest; `build()` validates the combination.

use crate::cancel::CancelFlag;
use crate::error::TranslateError;
use crate::language::validate_language_code;
use crate::progress::ProgressCallback;
use crate::provider::{ErrorClassifier, ProviderClient};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for translating one or more PDF documents.
///
/// Built via [`TranslationConfig::builder()`] or using
/// [`TranslationConfig::default()`].
///
/// # Example
/// ```rust
/// use pdftranslate2md::{PageFailurePolicy, TranslationConfig};
///
/// let config = TranslationConfig::builder()
///     .target_language("de")
///     .provider_name("anthropic")
///     .max_attempts(3)
///     .page_failure_policy(PageFailurePolicy::Placeholder)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct TranslationConfig {
    /// ISO 639-1 or 639-3 code of the output language. Default: `"ja"`.
    pub target_language: String,

    /// Provider name: `gemini`, `openai`, `anthropic` (alias `claude`), or any
    /// other backend `edgequake-llm` supports. If None along with `provider`,
    /// the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Model identifier. If None, the provider's default model is used.
    pub model: Option<String>,

    /// Pre-constructed client. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn ProviderClient>>,

    /// Error classification table. If None, the preset for the resolved
    /// provider is used (see [`ErrorClassifier::for_provider`]).
    pub classifier: Option<ErrorClassifier>,

    /// Sampling temperature. Default: 0.2.
    ///
    /// Translation wants faithfulness, not creativity; a low temperature keeps
    /// terminology stable from page to page.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 8192.
    ///
    /// Translations into CJK languages can use more tokens than the source;
    /// a low cap silently truncates the page mid-sentence.
    pub max_tokens: usize,

    /// Total attempts per page, including the first. Default: 5.
    pub max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds. Default: 10 000.
    ///
    /// Doubles after each failure: 10 s → 20 s → 40 s → 80 s. Rate limits on
    /// hosted LLM APIs are usually per-minute, so sub-second retries only
    /// burn attempts.
    pub retry_base_delay_ms: u64,

    /// Upper bound for a single backoff delay, in milliseconds. Default: 180 000.
    pub retry_max_delay_ms: u64,

    /// Per-call timeout in seconds. Default: 500.
    ///
    /// Long pages on slow models can legitimately take minutes. A timeout is
    /// treated as a retryable failure.
    pub api_timeout_secs: u64,

    /// Custom system prompt; `{language}` is replaced with the target language
    /// name. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Characters from the end of the previous translated page passed as
    /// context to the next one. 0 disables it. Default: 1500.
    pub context_window_chars: usize,

    /// What to do when a page cannot be translated. Default: [`PageFailurePolicy::Abort`].
    pub page_failure_policy: PageFailurePolicy,

    /// Derive heading levels from leading section numbers (`2.1` → `##`)
    /// before cross-page normalisation. Default: true.
    pub section_number_levels: bool,

    /// Separator between pages in the assembled Markdown. Default: horizontal rule.
    pub page_separator: PageSeparator,

    /// Extract embedded images and link them from the Markdown. Default: true.
    pub extract_images: bool,

    /// Root directory for extracted images; each document gets a
    /// `<image_dir>/<document_id>/` subdirectory. If None, `<output_dir>/images`.
    pub image_dir: Option<PathBuf>,

    /// Documents translated concurrently in a batch. Default: 1.
    ///
    /// Pages inside a document are always sequential because each page's
    /// prompt depends on the previous page's translation.
    pub batch_concurrency: usize,

    /// Progress sink. If None, events are dropped.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation flag shared with the caller.
    pub cancel: CancelFlag,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            target_language: "ja".to_string(),
            provider_name: None,
            model: None,
            provider: None,
            classifier: None,
            temperature: 0.2,
            max_tokens: 8192,
            max_attempts: 5,
            retry_base_delay_ms: 10_000,
            retry_max_delay_ms: 180_000,
            api_timeout_secs: 500,
            system_prompt: None,
            context_window_chars: 1500,
            page_failure_policy: PageFailurePolicy::default(),
            section_number_levels: true,
            page_separator: PageSeparator::default(),
            extract_images: true,
            image_dir: None,
            batch_concurrency: 1,
            progress_callback: None,
            cancel: CancelFlag::new(),
        }
    }
}

impl fmt::Debug for TranslationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationConfig")
            .field("target_language", &self.target_language)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field(
                "provider",
                &self.provider.as_ref().map(|p| p.name().to_string()),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("context_window_chars", &self.context_window_chars)
            .field("page_failure_policy", &self.page_failure_policy)
            .field("section_number_levels", &self.section_number_levels)
            .field("page_separator", &self.page_separator)
            .field("extract_images", &self.extract_images)
            .field("image_dir", &self.image_dir)
            .field("batch_concurrency", &self.batch_concurrency)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl TranslationConfig {
    /// Create a new builder for `TranslationConfig`.
    pub fn builder() -> TranslationConfigBuilder {
        TranslationConfigBuilder {
            config: Self::default(),
        }
    }

    /// The retry policy these settings describe.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}

/// Builder for [`TranslationConfig`].
pub struct TranslationConfigBuilder {
    config: TranslationConfig,
}

impl TranslationConfigBuilder {
    pub fn target_language(mut self, code: impl Into<String>) -> Self {
        self.config.target_language = code.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.config.classifier = Some(classifier);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn retry_max_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_max_delay_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn context_window_chars(mut self, n: usize) -> Self {
        self.config.context_window_chars = n;
        self
    }

    pub fn page_failure_policy(mut self, policy: PageFailurePolicy) -> Self {
        self.config.page_failure_policy = policy;
        self
    }

    pub fn section_number_levels(mut self, v: bool) -> Self {
        self.config.section_number_levels = v;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn extract_images(mut self, v: bool) -> Self {
        self.config.extract_images = v;
        self
    }

    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_dir = Some(dir.into());
        self
    }

    pub fn batch_concurrency(mut self, n: usize) -> Self {
        self.config.batch_concurrency = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.config.cancel = flag;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<TranslationConfig, TranslateError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(TranslateError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.batch_concurrency == 0 {
            return Err(TranslateError::InvalidConfig(
                "batch concurrency must be ≥ 1".into(),
            ));
        }
        if c.retry_max_delay_ms < c.retry_base_delay_ms {
            return Err(TranslateError::InvalidConfig(format!(
                "retry max delay ({} ms) is shorter than the base delay ({} ms)",
                c.retry_max_delay_ms, c.retry_base_delay_ms
            )));
        }
        self.config.target_language = validate_language_code(&self.config.target_language)?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What a document does when one of its pages cannot be translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageFailurePolicy {
    /// Fail the whole document; nothing is written. (default)
    #[default]
    Abort,
    /// Insert a placeholder naming the page and the error, keep the source
    /// text, and continue.
    Placeholder,
}

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n".
    None,
    /// Horizontal rule: "\n\n---\n\n". (default)
    #[default]
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Visible page label before each page: "(Page N)"
    PageLabel,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator string placed before page `page_num` (1-indexed, ≥ 2).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::PageLabel => format!("\n\n---\n\n(Page {})\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }

    /// Text placed before the first page, if any.
    pub fn leading(&self) -> Option<String> {
        match self {
            PageSeparator::PageLabel => Some("(Page 1)\n\n".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = TranslationConfig::default();
        assert_eq!(c.target_language, "ja");
        assert_eq!(c.max_attempts, 5);
        assert_eq!(c.api_timeout_secs, 500);
        assert_eq!(c.batch_concurrency, 1);
        assert_eq!(c.page_failure_policy, PageFailurePolicy::Abort);
        assert!(c.section_number_levels);
        assert!(c.extract_images);
    }

    #[test]
    fn retry_policy_from_config() {
        let c = TranslationConfig::builder()
            .max_attempts(3)
            .retry_base_delay_ms(100)
            .retry_max_delay_ms(250)
            .build()
            .unwrap();
        let p = c.retry_policy();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.delay_for(1, None), Duration::from_millis(100));
        assert_eq!(p.delay_for(2, None), Duration::from_millis(200));
        assert_eq!(p.delay_for(3, None), Duration::from_millis(250));
    }

    #[test]
    fn build_rejects_invalid_values() {
        assert!(TranslationConfig::builder().max_attempts(0).build().is_err());
        assert!(TranslationConfig::builder()
            .batch_concurrency(0)
            .build()
            .is_err());
        assert!(TranslationConfig::builder()
            .target_language("klingon")
            .build()
            .is_err());
        assert!(TranslationConfig::builder()
            .retry_base_delay_ms(5_000)
            .retry_max_delay_ms(1_000)
            .build()
            .is_err());
    }

    #[test]
    fn build_normalises_language() {
        let c = TranslationConfig::builder()
            .target_language("EN")
            .build()
            .unwrap();
        assert_eq!(c.target_language, "en");
    }

    #[test]
    fn temperature_is_clamped() {
        let c = TranslationConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn separators_render() {
        assert_eq!(PageSeparator::HorizontalRule.render(2), "\n\n---\n\n");
        assert_eq!(PageSeparator::None.render(2), "\n\n");
        assert_eq!(PageSeparator::Comment.render(3), "\n\n<!-- page 3 -->\n\n");
        assert_eq!(
            PageSeparator::PageLabel.render(4),
            "\n\n---\n\n(Page 4)\n\n"
        );
        assert_eq!(
            PageSeparator::Custom("* * *".into()).render(2),
            "\n\n* * *\n\n"
        );
        assert_eq!(PageSeparator::PageLabel.leading().as_deref(), Some("(Page 1)\n\n"));
        assert_eq!(PageSeparator::HorizontalRule.leading(), None);
    }

    #[test]
    fn debug_does_not_require_provider_debug() {
        let s = format!("{:?}", TranslationConfig::default());
        assert!(s.contains("target_language"));
    }
}
