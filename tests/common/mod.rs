//! Test doubles shared by the integration suites: a scripted provider and an
//! in-memory extractor. No network, no pdfium.

#![allow(dead_code)]

use async_trait::async_trait;
use pdftranslate2md::{
    ExtractedImage, ExtractedPage, Extractor, ProviderClient, ProviderError, TranslateError,
    TranslationConfig, TranslationContext,
};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// ── Provider ─────────────────────────────────────────────────────────────────

/// One recorded `translate` call.
#[derive(Debug, Clone)]
pub struct Call {
    pub text: String,
    pub target_language: String,
    pub context: TranslationContext,
}

/// Returns the source text unchanged, except where a failure was scripted
/// for text containing a given marker. Scripted failures are consumed in
/// order, then the call succeeds.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<Vec<(String, VecDeque<ProviderError>)>>,
    always_fail: Mutex<Vec<(String, ProviderError)>>,
    calls: Mutex<Vec<Call>>,
    on_call: Mutex<Option<Box<dyn Fn(&str) + Send + Sync>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next calls whose text contains `marker` with `errors`, in order.
    pub fn fail_then_succeed(self, marker: &str, errors: Vec<ProviderError>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push((marker.to_string(), errors.into()));
        self
    }

    /// Fail every call whose text contains `marker`.
    pub fn always_fail(self, marker: &str, error: ProviderError) -> Self {
        self.always_fail
            .lock()
            .unwrap()
            .push((marker.to_string(), error));
        self
    }

    /// Run `f` with the text of every call before answering.
    pub fn on_call(self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        *self.on_call.lock().unwrap() = Some(Box::new(f));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_containing(&self, marker: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.text.contains(marker))
            .count()
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "echo-1"
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        context: &TranslationContext,
    ) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(Call {
            text: text.to_string(),
            target_language: target_language.to_string(),
            context: context.clone(),
        });
        if let Some(f) = self.on_call.lock().unwrap().as_ref() {
            f(text);
        }

        if let Some((_, e)) = self
            .always_fail
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| text.contains(m.as_str()))
        {
            return Err(e.clone());
        }

        let mut script = self.script.lock().unwrap();
        if let Some((_, queue)) = script.iter_mut().find(|(m, _)| text.contains(m.as_str())) {
            if let Some(e) = queue.pop_front() {
                return Err(e);
            }
        }
        Ok(text.to_string())
    }
}

// ── Extractor ────────────────────────────────────────────────────────────────

/// Serves fixed pages per document stem; unknown stems get `default_pages`.
#[derive(Default)]
pub struct FakeExtractor {
    by_stem: HashMap<String, Vec<ExtractedPage>>,
    default_pages: Vec<ExtractedPage>,
    failing: Vec<String>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn new(default_pages: &[&str]) -> Self {
        Self {
            default_pages: pages(default_pages),
            ..Self::default()
        }
    }

    pub fn with_document(mut self, stem: &str, texts: &[&str]) -> Self {
        self.by_stem.insert(stem.to_string(), pages(texts));
        self
    }

    pub fn with_pages(mut self, stem: &str, pages: Vec<ExtractedPage>) -> Self {
        self.by_stem.insert(stem.to_string(), pages);
        self
    }

    /// Extraction of `stem` fails.
    pub fn failing(mut self, stem: &str) -> Self {
        self.failing.push(stem.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Extractor for FakeExtractor {
    fn extract(
        &self,
        path: &Path,
        with_images: bool,
    ) -> Result<Vec<ExtractedPage>, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing.contains(&stem) {
            return Err(TranslateError::ExtractionFailure {
                path: path.to_path_buf(),
                detail: "not a PDF".into(),
            });
        }
        let mut pages = self
            .by_stem
            .get(&stem)
            .cloned()
            .unwrap_or_else(|| self.default_pages.clone());
        if !with_images {
            for p in pages.iter_mut() {
                p.images.clear();
            }
        }
        Ok(pages)
    }
}

pub fn pages(texts: &[&str]) -> Vec<ExtractedPage> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| ExtractedPage {
            index: i + 1,
            text: t.to_string(),
            images: vec![],
        })
        .collect()
}

pub fn image(bytes: &[u8]) -> ExtractedImage {
    ExtractedImage {
        png: bytes.to_vec(),
        width: 64,
        height: 64,
    }
}

// ── Config ───────────────────────────────────────────────────────────────────

/// Config with zero backoff so retry tests run instantly.
pub fn fast_config() -> pdftranslate2md::TranslationConfigBuilder {
    TranslationConfig::builder()
        .target_language("ja")
        .retry_base_delay_ms(0)
        .retry_max_delay_ms(0)
}

/// Create an empty placeholder PDF file at `path`.
pub fn touch_pdf(path: &Path) {
    std::fs::write(path, b"%PDF-1.7\n%%EOF\n").unwrap();
}
