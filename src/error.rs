//! Error types for the pdftranslate2md library.
//!
//! Two layers of failure are kept apart:
//!
//! * [`ProviderError`] - what a single provider call reports. It is already
//!   classified as *retryable* or *fatal* by the provider's classification
//!   table, so [`crate::retry::RetryPolicy`] never has to inspect strings.
//!
//! * [`TranslateError`] - what a document run reports. Returned as
//!   `Err(TranslateError)` from [`crate::translate::PageTranslationPipeline::run`]
//!   and recorded per item by the batch coordinator.
//!
//! [`ErrorKind`] is the serialisable tag of a [`TranslateError`], used in
//! batch reports and `--json` output.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Outcome of one failed provider call, already classified.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ProviderError {
    /// Transient: rate limit, server overload, timeout, connection reset.
    #[error("retryable provider error: {reason}")]
    Retryable {
        reason: String,
        /// Server-suggested wait before the next attempt, when one was given.
        retry_after: Option<Duration>,
    },

    /// Permanent: auth failure, invalid request, content policy, or retries exhausted.
    #[error("fatal provider error: {reason}")]
    Fatal { reason: String },
}

impl ProviderError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        ProviderError::Retryable {
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        ProviderError::Fatal {
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Retryable { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            ProviderError::Retryable { reason, .. } | ProviderError::Fatal { reason } => reason,
        }
    }
}

/// All errors a document run can end with.
#[derive(Debug, Error)]
pub enum TranslateError {
    // ── Provider errors ───────────────────────────────────────────────────
    /// A transient provider failure surfaced outside the retry loop.
    #[error("Provider error on page {page} (retryable): {reason}")]
    RetryableProvider { page: usize, reason: String },

    /// A page could not be translated: permanent error or attempts exhausted.
    #[error("Translation failed on page {page}: {reason}")]
    FatalProvider { page: usize, reason: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Input / extraction errors ─────────────────────────────────────────
    /// The path is missing, not a PDF, or collides with another input.
    #[error("Invalid input '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// The PDF produced zero pages.
    #[error("No pages could be extracted from '{path}'")]
    EmptyDocument { path: PathBuf },

    /// The extractor could not read the PDF.
    #[error("Failed to extract '{path}': {detail}")]
    ExtractionFailure { path: PathBuf, detail: String },

    // ── Run control ───────────────────────────────────────────────────────
    /// The run observed the cancellation flag; nothing was written.
    #[error("Translation cancelled")]
    Cancelled,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown (or an image).
    #[error("Failed to write output file '{path}': {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task join failure and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TranslateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranslateError::RetryableProvider { .. } => ErrorKind::RetryableProvider,
            TranslateError::FatalProvider { .. } => ErrorKind::FatalProvider,
            TranslateError::ProviderNotConfigured { .. } => ErrorKind::ProviderNotConfigured,
            TranslateError::InvalidInput { .. } => ErrorKind::InvalidInput,
            TranslateError::EmptyDocument { .. } => ErrorKind::EmptyDocument,
            TranslateError::ExtractionFailure { .. } => ErrorKind::ExtractionFailure,
            TranslateError::Cancelled => ErrorKind::Cancelled,
            TranslateError::WriteFailure { .. } => ErrorKind::WriteFailure,
            TranslateError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            TranslateError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Snapshot for reporting; the error itself is not `Clone`.
    pub fn to_failure(&self) -> FailureInfo {
        FailureInfo {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Serialisable tag for a [`TranslateError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RetryableProvider,
    FatalProvider,
    ProviderNotConfigured,
    InvalidInput,
    EmptyDocument,
    ExtractionFailure,
    Cancelled,
    WriteFailure,
    InvalidConfig,
    Internal,
}

/// Kind and message of a failure, as recorded on a batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub kind: ErrorKind,
    pub message: String,
}
