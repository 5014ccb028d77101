//! PDF extraction: page text and embedded images via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! [`extract_pages`] moves the work onto tokio's blocking pool so the
//! runtime's worker threads keep serving provider calls of other documents.
//!
//! ## Why an `Extractor` trait?
//!
//! Everything downstream only needs "ordered pages of text plus images".
//! Tests and alternative backends implement [`Extractor`] directly; the
//! pipeline never names pdfium.

use crate::error::TranslateError;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Images smaller than this on either side are rules, bullets or logos.
const MIN_IMAGE_SIDE_PX: u32 = 16;

/// An embedded image, re-encoded as PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// One page as extracted from the PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// 1-based page number.
    pub index: usize,
    pub text: String,
    pub images: Vec<ExtractedImage>,
}

/// Source of page text and images.
///
/// Implementations are synchronous and may block; the pipeline calls them
/// through [`extract_pages`]. Pages must be returned in document order,
/// numbered from 1.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path, with_images: bool)
        -> Result<Vec<ExtractedPage>, TranslateError>;
}

/// Run `extractor` on the blocking thread pool.
pub async fn extract_pages(
    extractor: Arc<dyn Extractor>,
    path: &Path,
    with_images: bool,
) -> Result<Vec<ExtractedPage>, TranslateError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || extractor.extract(&path, with_images))
        .await
        .map_err(|e| TranslateError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// [`Extractor`] backed by the pdfium shared library.
///
/// The library is looked up in, in order: the explicit
/// [`with_library_path`](Self::with_library_path), the `PDFIUM_LIB_PATH`
/// environment variable (a file or a directory), the current directory,
/// and finally the system library path.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    library_path: Option<PathBuf>,
    password: Option<String>,
}

impl PdfiumExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// User password for encrypted PDFs.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    fn bind(&self, pdf_path: &Path) -> Result<Pdfium, TranslateError> {
        let configured = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match configured {
            Some(p) if p.is_file() => Pdfium::bind_to_library(&p),
            Some(p) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&p)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| TranslateError::ExtractionFailure {
            path: pdf_path.to_path_buf(),
            detail: format!(
                "could not bind to the pdfium library ({:?}); set PDFIUM_LIB_PATH to libpdfium",
                e
            ),
        })?;

        Ok(Pdfium::new(bindings))
    }
}

impl Extractor for PdfiumExtractor {
    fn extract(
        &self,
        path: &Path,
        with_images: bool,
    ) -> Result<Vec<ExtractedPage>, TranslateError> {
        let pdfium = self.bind(path)?;
        let failure = |detail: String| TranslateError::ExtractionFailure {
            path: path.to_path_buf(),
            detail,
        };

        let document = pdfium
            .load_pdf_from_file(path, self.password.as_deref())
            .map_err(|e| failure(format!("{:?}", e)))?;

        let mut pages = Vec::new();
        for (i, page) in document.pages().iter().enumerate() {
            let index = i + 1;
            let text = page
                .text()
                .map(|t| t.all())
                .map_err(|e| failure(format!("page {}: {:?}", index, e)))?;
            let images = if with_images {
                page_images(&page, index)
            } else {
                Vec::new()
            };
            debug!(
                "Extracted page {}: {} chars, {} images",
                index,
                text.chars().count(),
                images.len()
            );
            pages.push(ExtractedPage {
                index,
                text,
                images,
            });
        }

        info!("Extracted {} pages from {}", pages.len(), path.display());
        Ok(pages)
    }
}

/// Embedded images of one page. Unreadable images are skipped with a warning.
fn page_images(page: &PdfPage, page_num: usize) -> Vec<ExtractedImage> {
    let mut images = Vec::new();
    for object in page.objects().iter() {
        let Some(image_object) = object.as_image_object() else {
            continue;
        };
        let raw = match image_object.get_raw_image() {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Page {}: skipping unreadable image: {:?}", page_num, e);
                continue;
            }
        };
        if raw.width() < MIN_IMAGE_SIDE_PX || raw.height() < MIN_IMAGE_SIDE_PX {
            continue;
        }
        match encode_png(&raw) {
            Ok(png) => images.push(ExtractedImage {
                png,
                width: raw.width(),
                height: raw.height(),
            }),
            Err(e) => warn!("Page {}: failed to encode image: {}", page_num, e),
        }
    }
    images
}

/// Encode an image as PNG. Lossless, so figures with text stay legible.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}
