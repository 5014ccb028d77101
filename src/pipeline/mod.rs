//! Stages of the per-document translation pipeline.
//!
//! Each submodule implements exactly one transformation step. The state
//! machine that drives them lives in [`crate::translate`].
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ postprocess ──▶ (provider) ──▶ postprocess ──▶ headings ──▶ citations ──▶ write
//! (pdfium)    (sanitize)       (retry)        (clean)        (clamp)      (link)        (atomic)
//! ```
//!
//! 1. [`extract`]     - page text and embedded images; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 2. [`postprocess`] - strip extraction artefacts before sending, and model
//!    artefacts after receiving
//! 3. [`headings`]    - clamp heading levels page by page with a threaded
//!    [`headings::HeadingState`]
//! 4. [`citations`]   - anchor bibliography entries and link numeric markers
//!    on the assembled document
//! 5. [`write`]       - images, then the Markdown via temp file + rename

pub mod citations;
pub mod extract;
pub mod headings;
pub mod postprocess;
pub mod write;
