//! The unit of work: one PDF and its pages.

use crate::error::TranslateError;
use crate::pipeline::extract::{ExtractedImage, ExtractedPage};
use crate::pipeline::headings::{extract_headings, HeadingMarker};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Terminal state of one page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageOutcome {
    #[default]
    Pending,
    Translated,
    /// Translation failed; the page carries a placeholder and the source text.
    Placeholder,
}

/// One page of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based, contiguous within the document.
    pub index: usize,
    pub source_text: String,
    pub translated: Option<String>,
    /// Parsed from the source at extraction; replaced by the normalised
    /// headings once the page has been through heading normalisation.
    pub headings: Vec<HeadingMarker>,
    pub images: Vec<ExtractedImage>,
    pub outcome: PageOutcome,
}

impl Page {
    pub fn from_extracted(page: ExtractedPage) -> Self {
        Self {
            index: page.index,
            headings: extract_headings(&page.text),
            source_text: page.text,
            translated: None,
            images: page.images,
            outcome: PageOutcome::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome != PageOutcome::Pending
    }
}

/// A PDF to translate, and everything the pipeline learns about it.
#[derive(Debug, Clone)]
pub struct Document {
    /// File stem of the source; names the image subdirectory.
    pub id: String,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    /// Root for extracted images; this document writes to `<image_dir>/<id>/`.
    pub image_dir: PathBuf,
    pub target_language: String,
    pub provider: String,
    pub model: String,
    pub pages: Vec<Page>,
}

impl Document {
    /// A document with no pages yet. Images default to
    /// `<output dir>/images`.
    pub fn new(source_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        let source_path = source_path.into();
        let output_path = output_path.into();
        let image_dir = output_dir_of(&output_path).join("images");
        Self {
            id: document_id(&source_path),
            source_path,
            output_path,
            image_dir,
            target_language: String::new(),
            provider: String::new(),
            model: String::new(),
            pages: Vec::new(),
        }
    }

    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = dir.into();
        self
    }

    /// Directory the Markdown file is written into.
    pub fn output_dir(&self) -> PathBuf {
        output_dir_of(&self.output_path)
    }

    /// Directory this document's images are written into.
    pub fn document_image_dir(&self) -> PathBuf {
        self.image_dir.join(&self.id)
    }
}

/// Reject extractor output whose page indices are not exactly `1..=n`.
pub fn check_page_indices(path: &Path, pages: &[ExtractedPage]) -> Result<(), TranslateError> {
    for (pos, page) in pages.iter().enumerate() {
        if page.index != pos + 1 {
            return Err(TranslateError::ExtractionFailure {
                path: path.to_path_buf(),
                detail: format!(
                    "page at position {} reports index {}",
                    pos + 1,
                    page.index
                ),
            });
        }
    }
    Ok(())
}

/// File stem of `path`, or `"document"` when it has none.
pub fn document_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// Check that `path` is an existing file with a `.pdf` extension
/// (case-insensitive).
pub fn validate_pdf_path(path: &Path) -> Result<(), TranslateError> {
    let invalid = |reason: &str| TranslateError::InvalidInput {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    if !path.exists() {
        return Err(invalid("no such file or directory"));
    }
    if !path.is_file() {
        return Err(invalid("not a regular file"));
    }
    if !has_pdf_extension(path) {
        return Err(invalid("not a .pdf file"));
    }
    Ok(())
}

pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn output_dir_of(output_path: &Path) -> PathBuf {
    match output_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
