//! Batch translation: many PDFs in, one Markdown file per PDF out.
//!
//! ## Why does `run_batch` never fail?
//!
//! A batch is usually a folder of papers left running unattended. One
//! corrupt PDF or one page the provider refuses must not cost the other
//! documents their translation, so every failure is recorded on its
//! [`BatchItem`] and the batch moves on. The caller reads the items (or a
//! [`BatchSummary`]) to decide the exit status.
//!
//! Documents run up to `batch_concurrency` at a time through
//! `futures::stream::buffered`, which also keeps results in input order.

use crate::config::TranslationConfig;
use crate::document::{document_id, has_pdf_extension, validate_pdf_path, Document};
use crate::error::{FailureInfo, TranslateError};
use crate::pipeline::extract::Extractor;
use crate::progress::{ProgressEvent, ProgressStatus};
use crate::provider::{resolve_provider, ProviderClient};
use crate::translate::PageTranslationPipeline;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Lifecycle of one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    /// Output already existed and `force` was off; nothing was done.
    SkippedExisting,
    /// Being translated. Only observable through progress events; items
    /// returned from a batch are always in a final state.
    InProgress,
    Completed,
    Failed,
    /// Cancellation was requested before the document finished.
    Cancelled,
}

/// One input of a batch and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub status: BatchStatus,
    /// Set when `status` is `Failed`.
    pub error: Option<FailureInfo>,
    /// Pages in the written document; 0 unless completed.
    pub pages: usize,
    pub duration_ms: u64,
}

impl BatchItem {
    fn new(input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            input_path,
            output_path,
            status: BatchStatus::Pending,
            error: None,
            pages: 0,
            duration_ms: 0,
        }
    }

    fn fail(&mut self, error: &TranslateError) {
        self.status = BatchStatus::Failed;
        self.error = Some(error.to_failure());
    }
}

/// Counts over a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub pages: usize,
}

impl BatchSummary {
    pub fn from_items(items: &[BatchItem]) -> Self {
        let count = |s: BatchStatus| items.iter().filter(|i| i.status == s).count();
        Self {
            total: items.len(),
            completed: count(BatchStatus::Completed),
            skipped: count(BatchStatus::SkippedExisting),
            failed: count(BatchStatus::Failed),
            cancelled: count(BatchStatus::Cancelled),
            pages: items.iter().map(|i| i.pages).sum(),
        }
    }

    /// Cancelled items are not failures.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

// ── Discovery ────────────────────────────────────────────────────────────────

/// An input path after discovery, with the reason it cannot be processed.
#[derive(Debug)]
pub struct DiscoveredInput {
    pub path: PathBuf,
    pub problem: Option<TranslateError>,
}

/// Expand the user's paths into PDF files.
///
/// Files are taken as given (and must be `.pdf`). A directory contributes
/// the `.pdf` files directly inside it, sorted; subdirectories are not
/// searched. Paths that cannot be used are returned with a problem instead
/// of being dropped.
pub fn discover_inputs(paths: &[PathBuf]) -> Vec<DiscoveredInput> {
    let mut found = Vec::new();
    for path in paths {
        if path.is_dir() {
            match pdfs_in_dir(path) {
                Ok(pdfs) => {
                    if pdfs.is_empty() {
                        warn!("No PDF files in {}", path.display());
                    }
                    found.extend(pdfs.into_iter().map(|p| DiscoveredInput {
                        path: p,
                        problem: None,
                    }));
                }
                Err(e) => found.push(DiscoveredInput {
                    path: path.clone(),
                    problem: Some(TranslateError::InvalidInput {
                        path: path.clone(),
                        reason: format!("cannot read directory: {}", e),
                    }),
                }),
            }
        } else {
            found.push(DiscoveredInput {
                path: path.clone(),
                problem: validate_pdf_path(path).err(),
            });
        }
    }
    found
}

fn pdfs_in_dir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_pdf_extension(&path) {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

/// `<output_dir>/<stem>.md`.
pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}.md", document_id(input)))
}

// ── Coordinator ──────────────────────────────────────────────────────────────

/// Runs a [`PageTranslationPipeline`] per input, isolating failures.
pub struct BatchCoordinator {
    config: TranslationConfig,
    extractor: Arc<dyn Extractor>,
}

impl BatchCoordinator {
    pub fn new(config: TranslationConfig, extractor: Arc<dyn Extractor>) -> Self {
        Self { config, extractor }
    }

    /// Translate every input. Returns one item per discovered input, in
    /// input order. Never fails as a whole.
    pub async fn run_batch(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
        force: bool,
    ) -> Vec<BatchItem> {
        let image_dir = self
            .config
            .image_dir
            .clone()
            .unwrap_or_else(|| output_dir.join("images"));

        // ── Plan: validate, detect collisions, skip existing ─────────────
        let mut items = Vec::new();
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
        for found in discover_inputs(inputs) {
            let output = output_path_for(&found.path, output_dir);
            let mut item = BatchItem::new(found.path.clone(), output.clone());

            if let Some(problem) = found.problem {
                warn!("Skipping {}: {}", found.path.display(), problem);
                item.fail(&problem);
            } else if let Some(first) = claimed.get(&output) {
                let problem = TranslateError::InvalidInput {
                    path: found.path.clone(),
                    reason: format!(
                        "output path {} collides with {}",
                        output.display(),
                        first.display()
                    ),
                };
                warn!("{}", problem);
                item.fail(&problem);
            } else {
                claimed.insert(output.clone(), found.path.clone());
                if output.exists() && !force {
                    info!(
                        "Skipping {}: {} exists (use --force to overwrite)",
                        found.path.display(),
                        output.display()
                    );
                    item.status = BatchStatus::SkippedExisting;
                    self.emit(ProgressEvent::document(
                        document_id(&found.path),
                        ProgressStatus::Skipped,
                    ));
                }
            }
            if item.status == BatchStatus::Failed {
                if let Some(ref error) = item.error {
                    self.emit(ProgressEvent::document(
                        document_id(&item.input_path),
                        ProgressStatus::Failed {
                            message: error.message.clone(),
                        },
                    ));
                }
            }
            items.push(item);
        }

        let pending: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.status == BatchStatus::Pending)
            .map(|(idx, _)| idx)
            .collect();
        if pending.is_empty() {
            return items;
        }

        // ── Resolve the provider once for the whole batch ────────────────
        let provider = match resolve_provider(&self.config) {
            Ok(p) => p,
            Err(e) => {
                warn!("{}", e);
                for idx in pending {
                    items[idx].fail(&e);
                }
                return items;
            }
        };

        info!(
            "Translating {} document(s), {} at a time",
            pending.len(),
            self.config.batch_concurrency
        );

        // ── Process ──────────────────────────────────────────────────────
        let jobs: Vec<(usize, BatchItem)> = pending
            .into_iter()
            .map(|idx| (idx, items[idx].clone()))
            .collect();
        let finished: Vec<(usize, BatchItem)> = stream::iter(jobs)
            .map(|(idx, item)| {
                let provider = Arc::clone(&provider);
                let image_dir = image_dir.clone();
                async move { (idx, self.process(item, provider, image_dir).await) }
            })
            .buffered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        for (idx, item) in finished {
            items[idx] = item;
        }
        items
    }

    async fn process(
        &self,
        mut item: BatchItem,
        provider: Arc<dyn ProviderClient>,
        image_dir: PathBuf,
    ) -> BatchItem {
        if self.config.cancel.is_cancelled() {
            item.status = BatchStatus::Cancelled;
            self.emit(ProgressEvent::document(
                document_id(&item.input_path),
                ProgressStatus::Cancelled,
            ));
            return item;
        }

        let start = Instant::now();
        let document =
            Document::new(&item.input_path, &item.output_path).with_image_dir(image_dir);
        let pipeline = PageTranslationPipeline::new(
            self.config.clone(),
            provider,
            Arc::clone(&self.extractor),
        );

        match pipeline.run(document).await {
            Ok(output) => {
                item.status = BatchStatus::Completed;
                item.pages = output.stats.total_pages;
            }
            Err(TranslateError::Cancelled) => item.status = BatchStatus::Cancelled,
            Err(e) => item.fail(&e),
        }
        item.duration_ms = start.elapsed().as_millis() as u64;
        item
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_event(&event);
        }
    }
}
