//! # pdftranslate2md
//!
//! Translate PDF documents into Markdown in another language, page by page,
//! with an LLM.
//!
//! ## Why page by page?
//!
//! Whole-document prompts overflow context windows on long papers, and a
//! single failure throws away everything. Translating one page at a time
//! keeps every request small and retryable. The price is that the model
//! only ever sees one page, so the crate repairs what that breaks: heading
//! levels are clamped across page boundaries, and numeric citations are
//! linked to the bibliography once the whole document is assembled.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract    page text + embedded images via pdfium (spawn_blocking)
//!  ├─ 2. Translate  one provider call per page, bounded retry with backoff
//!  ├─ 3. Normalize  heading levels clamped across page boundaries
//!  ├─ 4. Assemble   pages joined with a separator, images linked
//!  ├─ 5. Link       [n] citations → bibliography anchors
//!  └─ 6. Write      images, then Markdown via temp file + rename
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdftranslate2md::{translate_pdf, TranslationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ANTHROPIC_API_KEY
//!     let config = TranslationConfig::builder().target_language("ja").build()?;
//!     let output = translate_pdf("paper.pdf", "out/paper.md", &config).await?;
//!     eprintln!(
//!         "{} pages, {} provider calls",
//!         output.stats.total_pages, output.stats.total_attempts
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Batches
//!
//! [`BatchCoordinator::run_batch`] takes files and directories, skips
//! documents whose output already exists (unless forced), runs up to
//! `batch_concurrency` documents at once and records every failure on its
//! [`BatchItem`] instead of aborting.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdftranslate2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdftranslate2md = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod cancel;
pub mod config;
pub mod document;
pub mod error;
pub mod language;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod retry;
pub mod translate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{discover_inputs, output_path_for, BatchCoordinator, BatchItem, BatchStatus, BatchSummary};
pub use cancel::CancelFlag;
pub use config::{PageFailurePolicy, PageSeparator, TranslationConfig, TranslationConfigBuilder};
pub use document::{Document, Page, PageOutcome};
pub use error::{ErrorKind, FailureInfo, ProviderError, TranslateError};
pub use output::{DocumentOutput, DocumentStats, PageSummary, PipelineResult};
pub use pipeline::citations::{CitationIndex, CitationLinker};
pub use pipeline::extract::{ExtractedImage, ExtractedPage, Extractor, PdfiumExtractor};
pub use pipeline::headings::{normalize, HeadingMarker, HeadingState};
pub use progress::{ChannelProgressSink, NoopProgressSink, ProgressCallback, ProgressEvent, ProgressSink, ProgressStatus};
pub use provider::{resolve_provider, ErrorClass, ErrorClassifier, LlmProviderClient, ProviderClient, TranslationContext};
pub use retry::{AttemptOutcome, RetryOutcome, RetryPolicy, TranslationAttempt};
pub use translate::{translate_pdf, PageTranslationPipeline, PipelineState};
