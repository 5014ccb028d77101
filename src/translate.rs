//! Per-document translation: the state machine that drives one PDF from
//! extraction to a written Markdown file.
//!
//! ## States
//!
//! ```text
//! Extracting ──▶ Translating{page,total} ──▶ Normalizing ──▶ Linking ──▶ Writing ──▶ Done
//!      │                  │                                                  │
//!      └──────────────────┴───────────────────▶ Failed ◀────────────────────┘
//! ```
//!
//! ## Why are pages sequential?
//!
//! Each page's prompt carries the tail of the previous page's translation
//! and the headings translated so far. That context keeps terminology and
//! heading hierarchy consistent, and it only exists once the previous page
//! is done. Parallelism lives one level up, across documents
//! (see [`crate::batch`]).
//!
//! Nothing is written until every page has reached a terminal state. A
//! failed or cancelled run leaves the destination untouched.

use crate::config::{PageFailurePolicy, TranslationConfig};
use crate::document::{check_page_indices, validate_pdf_path, Document, Page, PageOutcome};
use crate::error::TranslateError;
use crate::output::{DocumentOutput, DocumentStats, PageSummary, PipelineResult};
use crate::pipeline::citations::CitationLinker;
use crate::pipeline::extract::{extract_pages, ExtractedImage, Extractor, PdfiumExtractor};
use crate::pipeline::headings::{apply_section_numbering, extract_headings, normalize, HeadingState};
use crate::pipeline::postprocess::{clean_translation, sanitize_source};
use crate::pipeline::write::{
    image_file_name, relative_link, remove_images, write_images, write_markdown_atomic,
};
use crate::progress::{ProgressEvent, ProgressStatus};
use crate::prompts::MAX_CONTEXT_HEADINGS;
use crate::provider::{resolve_provider, ProviderClient, TranslationContext};
use crate::retry::TranslationAttempt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Where a document run currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Extracting,
    /// `page` is 1-based.
    Translating { page: usize, total: usize },
    Normalizing,
    Linking,
    Writing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

/// Translates one [`Document`].
///
/// A pipeline is cheap to build; create one per document. Its state can be
/// watched from another task through [`subscribe`](Self::subscribe).
pub struct PageTranslationPipeline {
    config: TranslationConfig,
    provider: Arc<dyn ProviderClient>,
    extractor: Arc<dyn Extractor>,
    linker: CitationLinker,
    state: watch::Sender<PipelineState>,
}

impl PageTranslationPipeline {
    pub fn new(
        config: TranslationConfig,
        provider: Arc<dyn ProviderClient>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            config,
            provider,
            extractor,
            linker: CitationLinker::default(),
            state,
        }
    }

    /// Use a custom citation linker (extra bibliography labels).
    pub fn with_linker(mut self, linker: CitationLinker) -> Self {
        self.linker = linker;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Run the document to completion.
    ///
    /// `Ok` means the Markdown (and any images) were written. On `Err`
    /// nothing was written to `document.output_path`.
    pub async fn run(&self, mut document: Document) -> PipelineResult {
        let start = Instant::now();
        document.target_language = self.config.target_language.clone();
        document.provider = self.provider.name().to_string();
        document.model = self.provider.model().to_string();
        info!(
            "Translating {} → {} ({} / {})",
            document.source_path.display(),
            document.target_language,
            document.provider,
            if document.model.is_empty() { "default model" } else { document.model.as_str() }
        );

        let id = document.id.clone();
        match self.execute(&mut document, start).await {
            Ok(output) => {
                self.enter(&id, PipelineState::Done);
                info!(
                    "Wrote {} ({} pages, {} attempts, {}ms)",
                    output.output_path.display(),
                    output.stats.total_pages,
                    output.stats.total_attempts,
                    output.stats.duration_ms
                );
                self.emit(ProgressEvent::document(&id, ProgressStatus::Completed));
                Ok(output)
            }
            Err(e) => {
                self.enter(&id, PipelineState::Failed);
                match e {
                    TranslateError::Cancelled => {
                        info!("Translation of '{}' cancelled", id);
                        self.emit(ProgressEvent::document(&id, ProgressStatus::Cancelled));
                    }
                    ref other => {
                        warn!("Translation of '{}' failed: {}", id, other);
                        self.emit(ProgressEvent::document(
                            &id,
                            ProgressStatus::Failed {
                                message: other.to_string(),
                            },
                        ));
                    }
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, doc: &mut Document, start: Instant) -> PipelineResult {
        // ── Step 1: Extract ──────────────────────────────────────────────
        self.enter(&doc.id, PipelineState::Extracting);
        let extracted = extract_pages(
            Arc::clone(&self.extractor),
            &doc.source_path,
            self.config.extract_images,
        )
        .await?;
        if extracted.is_empty() {
            return Err(TranslateError::EmptyDocument {
                path: doc.source_path.clone(),
            });
        }
        check_page_indices(&doc.source_path, &extracted)?;
        doc.pages = extracted.into_iter().map(Page::from_extracted).collect();
        for page in doc.pages.iter_mut() {
            page.source_text = sanitize_source(&page.source_text);
        }
        let total = doc.pages.len();
        self.emit(ProgressEvent {
            document_id: doc.id.clone(),
            page_index: None,
            total_pages: Some(total),
            status: ProgressStatus::Started,
        });

        // ── Step 2: Translate page by page ───────────────────────────────
        let (attempts, page_errors) = self.translate_pages(doc).await?;

        // ── Step 3: Normalise headings across pages ──────────────────────
        self.enter(&doc.id, PipelineState::Normalizing);
        self.normalize_pages(doc);

        // ── Step 4: Assemble ─────────────────────────────────────────────
        let (assembled, images) = self.assemble(doc);

        // ── Step 5: Link citations ───────────────────────────────────────
        self.enter(&doc.id, PipelineState::Linking);
        let (markdown, citations) = self.linker.link_with_report(&assembled);
        debug!(
            "Linked {} citation markers to {} bibliography entries",
            citations.markers_linked, citations.entries
        );

        // ── Step 6: Write ────────────────────────────────────────────────
        if self.config.cancel.is_cancelled() {
            return Err(TranslateError::Cancelled);
        }
        self.enter(&doc.id, PipelineState::Writing);
        let written = write_images(images).await?;
        if let Err(e) = write_markdown_atomic(&doc.output_path, markdown.clone()).await {
            remove_images(&written).await;
            return Err(e);
        }
        let images_written = written.len();

        let pages: Vec<PageSummary> = doc
            .pages
            .iter()
            .map(|p| PageSummary {
                index: p.index,
                outcome: p.outcome,
                attempts: attempts.iter().filter(|a| a.page_index == p.index).count() as u32,
                images: p.images.len(),
                error: page_errors
                    .iter()
                    .find(|(i, _)| *i == p.index)
                    .map(|(_, e)| e.clone()),
            })
            .collect();

        let stats = DocumentStats {
            total_pages: total,
            translated_pages: count_outcome(&doc.pages, PageOutcome::Translated),
            placeholder_pages: count_outcome(&doc.pages, PageOutcome::Placeholder),
            total_attempts: attempts.len(),
            citation_entries: citations.entries,
            citation_markers_linked: citations.markers_linked,
            images_written,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        Ok(DocumentOutput {
            document_id: doc.id.clone(),
            output_path: doc.output_path.clone(),
            markdown,
            pages,
            attempts,
            stats,
        })
    }

    /// Translate every page in order. Returns all attempts plus the
    /// `(page, reason)` of each placeholder page.
    async fn translate_pages(
        &self,
        doc: &mut Document,
    ) -> Result<(Vec<TranslationAttempt>, Vec<(usize, String)>), TranslateError> {
        let policy = self.config.retry_policy();
        let total = doc.pages.len();
        let language = doc.target_language.clone();

        let mut attempts = Vec::new();
        let mut page_errors = Vec::new();
        let mut previous: Option<String> = None;
        let mut headings_so_far: VecDeque<String> = VecDeque::with_capacity(MAX_CONTEXT_HEADINGS);

        for page in doc.pages.iter_mut() {
            if self.config.cancel.is_cancelled() {
                return Err(TranslateError::Cancelled);
            }
            self.enter(
                &doc.id,
                PipelineState::Translating {
                    page: page.index,
                    total,
                },
            );

            let context = TranslationContext {
                recent_translation: previous
                    .as_deref()
                    .filter(|_| self.config.context_window_chars > 0)
                    .map(|t| tail_chars(t, self.config.context_window_chars).to_string()),
                previous_headings: headings_so_far.iter().cloned().collect(),
            };
            let source = page.source_text.as_str();
            let language = language.as_str();
            let context = &context;

            let outcome = policy
                .execute(page.index, |_| {
                    self.provider.translate(source, language, context)
                })
                .await;
            attempts.extend(outcome.attempts);

            match outcome.result {
                Ok(text) => {
                    let cleaned = clean_translation(&text);
                    for heading in extract_headings(&cleaned) {
                        if headings_so_far.len() == MAX_CONTEXT_HEADINGS {
                            headings_so_far.pop_front();
                        }
                        headings_so_far.push_back(heading.to_markdown());
                    }
                    previous = Some(cleaned.clone());
                    page.translated = Some(cleaned);
                    page.outcome = PageOutcome::Translated;
                    self.emit(ProgressEvent::page(
                        &doc.id,
                        page.index,
                        total,
                        ProgressStatus::PageTranslated,
                    ));
                }
                Err(e) => match self.config.page_failure_policy {
                    PageFailurePolicy::Abort => {
                        return Err(TranslateError::FatalProvider {
                            page: page.index,
                            reason: e.reason().to_string(),
                        });
                    }
                    PageFailurePolicy::Placeholder => {
                        warn!(
                            "Page {} of '{}' left untranslated: {}",
                            page.index,
                            doc.id,
                            e.reason()
                        );
                        page.translated =
                            Some(placeholder_page(page.index, e.reason(), &page.source_text));
                        page.outcome = PageOutcome::Placeholder;
                        previous = None;
                        page_errors.push((page.index, e.reason().to_string()));
                        self.emit(ProgressEvent::page(
                            &doc.id,
                            page.index,
                            total,
                            ProgressStatus::PagePlaceholder {
                                reason: e.reason().to_string(),
                            },
                        ));
                    }
                },
            }
        }

        Ok((attempts, page_errors))
    }

    fn normalize_pages(&self, doc: &mut Document) {
        let mut state = HeadingState::default();
        for page in doc.pages.iter_mut() {
            let text = page.translated.take().unwrap_or_default();
            let text = if self.config.section_number_levels {
                apply_section_numbering(&text)
            } else {
                text
            };
            let (normalized, next) = normalize(&text, &state);
            state = next;
            page.headings = extract_headings(&normalized);
            page.translated = Some(normalized);
        }
    }

    /// Join pages with the separator and link each page's images at its end.
    /// Returns the text and the image files still to be written.
    fn assemble(&self, doc: &Document) -> (String, Vec<(PathBuf, ExtractedImage)>) {
        let separator = &self.config.page_separator;
        let output_dir = doc.output_dir();
        let image_dir = doc.document_image_dir();

        let mut out = separator.leading().unwrap_or_default();
        let mut images = Vec::new();

        for (i, page) in doc.pages.iter().enumerate() {
            if i > 0 {
                out.push_str(&separator.render(page.index));
            }
            out.push_str(page.translated.as_deref().unwrap_or_default().trim_end());

            for (k, image) in page.images.iter().enumerate() {
                let path = image_dir.join(image_file_name(page.index, k + 1));
                out.push_str(&format!(
                    "\n\n![Page {} image {}]({})",
                    page.index,
                    k + 1,
                    relative_link(&path, &output_dir)
                ));
                images.push((path, image.clone()));
            }
        }
        out.push('\n');
        (out, images)
    }

    fn enter(&self, document_id: &str, next: PipelineState) {
        debug!("[{}] {:?}", document_id, next);
        self.state.send_replace(next);
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_event(&event);
        }
    }
}

/// Translate one PDF with the pdfium extractor and the configured provider.
pub async fn translate_pdf(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &TranslationConfig,
) -> PipelineResult {
    let input = input.as_ref();
    validate_pdf_path(input)?;
    let provider = resolve_provider(config)?;

    let mut document = Document::new(input, output_path.as_ref());
    if let Some(ref dir) = config.image_dir {
        document = document.with_image_dir(dir);
    }
    PageTranslationPipeline::new(config.clone(), provider, Arc::new(PdfiumExtractor::new()))
        .run(document)
        .await
}

/// Text substituted for a page whose translation failed: a visible note
/// naming the page and the reason, followed by the source text.
pub fn placeholder_page(page_index: usize, reason: &str, source_text: &str) -> String {
    format!(
        "> **[Untranslated page {}]** {}\n\n{}\n",
        page_index,
        reason.lines().next().unwrap_or_default(),
        source_text.trim_end()
    )
}

/// The last `n` characters of `text`.
fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let idx = text
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[idx..]
}

fn count_outcome(pages: &[Page], outcome: PageOutcome) -> usize {
    pages.iter().filter(|p| p.outcome == outcome).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail_chars("こんにちは世界", 2), "世界");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("abc", 0), "");
    }

    #[test]
    fn placeholder_names_page_and_reason() {
        let p = placeholder_page(4, "401 invalid api key\ndetails", "Original text\n");
        assert!(p.starts_with("> **[Untranslated page 4]** 401 invalid api key\n"));
        assert!(p.ends_with("Original text\n"));
        assert!(!p.contains("details"));
    }

    #[test]
    fn terminal_states() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
        assert!(!PipelineState::Translating { page: 1, total: 2 }.is_terminal());
    }
}
