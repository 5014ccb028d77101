//! Result types returned by a document run.

use crate::document::PageOutcome;
use crate::error::TranslateError;
use crate::retry::TranslationAttempt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-page summary kept after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    /// 1-based page index.
    pub index: usize,
    pub outcome: PageOutcome,
    /// Provider calls made for this page.
    pub attempts: u32,
    pub images: usize,
    /// Error that caused a placeholder, if any.
    pub error: Option<String>,
}

/// Aggregate numbers for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub total_pages: usize,
    pub translated_pages: usize,
    pub placeholder_pages: usize,
    pub total_attempts: usize,
    pub citation_entries: usize,
    pub citation_markers_linked: usize,
    pub images_written: usize,
    pub duration_ms: u64,
}

/// A successfully written document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutput {
    pub document_id: String,
    pub output_path: PathBuf,
    /// The Markdown exactly as written to `output_path`.
    pub markdown: String,
    pub pages: Vec<PageSummary>,
    /// Every provider call, in order.
    pub attempts: Vec<TranslationAttempt>,
    pub stats: DocumentStats,
}

pub type PipelineResult = Result<DocumentOutput, TranslateError>;
