//! Utility functions for string truncation, URL resolution, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - String truncation for logging and for the API's field limits
//! - JSON error detection for spotting truncated model replies
//! - Relative → absolute URL resolution against a source's base URL
//! - File system validation for the output directory
//! - Atomic file replacement for the watermark table and run artifacts

use crate::error::IngestError;
use serde_json::error::Category;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Truncate a string for logging purposes.
///
/// Long strings are cut after `max` bytes (moved back to a char boundary)
/// with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Keep at most `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// A reply cut off by the model's output limit fails with an EOF error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    matches!(e.classify(), Category::Eof)
}

/// Resolve `href` against the source's `base` URL.
///
/// Absolute hrefs come back unchanged; relative ones follow the usual
/// URL-joining rules, e.g. `/a/1` against `https://example.com/news/`
/// becomes `https://example.com/a/1`.
pub fn resolve_url(base: &str, href: &str) -> Result<String, IngestError> {
    let base_url = Url::parse(base).map_err(|source| IngestError::Url {
        url: base.to_string(),
        source,
    })?;
    let resolved = base_url.join(href.trim()).map_err(|source| IngestError::Url {
        url: href.to_string(),
        source,
    })?;
    Ok(resolved.to_string())
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then writes and removes a
/// marker file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path).await?;
    let marker_path = path.join(".__write_check__");
    fs::write(&marker_path, b"").await?;
    let _ = fs::remove_file(&marker_path).await;
    info!("Output directory is writable");
    Ok(())
}

/// Write `contents` next to `path` and rename it into place.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), IngestError> {
    let io_err = |source| IngestError::Io {
        path: path.display().to_string(),
        source,
    };
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).await.map_err(io_err)?;
    fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}
