//! Output persistence: extracted images and the final Markdown file.
//!
//! The Markdown is written all-or-nothing: content goes to a uniquely named
//! temporary file in the destination directory, is flushed, then renamed over
//! the target. A crash or a cancelled run therefore never leaves a
//! half-written `.md` behind, and an existing file is replaced atomically
//! when `--force` is used. The temp file lives in the same directory so the
//! rename never crosses a filesystem.

use crate::error::TranslateError;
use crate::pipeline::extract::ExtractedImage;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

fn write_failure(path: &Path) -> impl Fn(std::io::Error) -> TranslateError + '_ {
    move |source| TranslateError::WriteFailure {
        path: path.to_path_buf(),
        source,
    }
}

/// File name of the `ordinal`-th image (1-based) on page `page_index`.
pub fn image_file_name(page_index: usize, ordinal: usize) -> String {
    format!("page{}_img{}.png", page_index, ordinal)
}

/// Markdown link target for `target`, relative to `base_dir` when `target`
/// lives below it, always with `/` separators.
pub fn relative_link(target: &Path, base_dir: &Path) -> String {
    let rel = target.strip_prefix(base_dir).unwrap_or(target);
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::RootDir => Some(String::new()),
            Component::Prefix(p) => Some(p.as_os_str().to_string_lossy().into_owned()),
            Component::CurDir => None,
            Component::ParentDir => Some("..".to_string()),
        })
        .collect();
    parts.join("/")
}

/// Write the Markdown atomically (temp file + rename).
pub async fn write_markdown_atomic(path: &Path, contents: String) -> Result<(), TranslateError> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&target, contents.as_bytes()))
        .await
        .map_err(|e| TranslateError::Internal(format!("Write task panicked: {}", e)))?
}

fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> Result<(), TranslateError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_failure(path))?;

    let mut tmp = NamedTempFile::new_in(&parent).map_err(write_failure(path))?;
    tmp.write_all(bytes).map_err(write_failure(path))?;
    tmp.as_file().sync_all().map_err(write_failure(path))?;
    tmp.persist(path).map_err(|e| write_failure(path)(e.error))?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Write each `(path, image)` pair, creating directories as needed.
///
/// Returns the paths written. If any write fails, the images already written
/// by this call are removed before the error is returned.
pub async fn write_images(
    images: Vec<(PathBuf, ExtractedImage)>,
) -> Result<Vec<PathBuf>, TranslateError> {
    let mut written = Vec::with_capacity(images.len());
    for (path, image) in images {
        if let Err(e) = write_image(&path, &image).await {
            remove_images(&written).await;
            return Err(e);
        }
        written.push(path);
    }
    Ok(written)
}

async fn write_image(path: &Path, image: &ExtractedImage) -> Result<(), TranslateError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(write_failure(path))?;
    }
    tokio::fs::write(path, &image.png)
        .await
        .map_err(write_failure(path))
}

/// Best-effort removal of `paths`, then of their parent directories if they
/// are left empty.
pub async fn remove_images(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
    let mut parents: Vec<&Path> = paths.iter().filter_map(|p| p.parent()).collect();
    parents.sort();
    parents.dedup();
    for dir in parents {
        // Non-empty directories are kept.
        let _ = tokio::fs::remove_dir(dir).await;
    }
}
