//! Utility functions for text cleanup, slug handling and file system operations.
//!
//! This module provides helpers used throughout the application:
//! - Whitespace normalization for text pulled out of HTML
//! - String truncation for logging
//! - Slug-to-title conversion for synthesized research titles
//! - Directory validation and atomic file writes for the cache and feed files

use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Collapse every run of whitespace into a single space and trim the ends.
///
/// Text collected from `scraper` nodes keeps the indentation and newlines of
/// the source markup; everything downstream wants it flattened.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(collapse_whitespace("  Hello\n\t  world "), "Hello world");
/// ```
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a character boundary)
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
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Capitalize the first character of a string.
///
/// Used for category labels in the feeds (`"news"` -> `"News"`).
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Turn a URL slug into a readable title.
///
/// Percent-escapes are decoded, `-` and `_` become spaces, and every word is
/// capitalized. Returns `None` when nothing readable is left.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(title_from_slug("scaling-monosemanticity"), Some("Scaling Monosemanticity".into()));
/// assert_eq!(title_from_slug("paper.pdf"), Some("Paper".into()));
/// ```
pub fn title_from_slug(slug: &str) -> Option<String> {
    let decoded = urlencoding::decode(slug)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| slug.to_string());
    let stem = decoded
        .strip_suffix(".pdf")
        .or_else(|| decoded.strip_suffix(".html"))
        .unwrap_or(&decoded);

    let title = stem
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(upcase)
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() { None } else { Some(title) }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable
/// (permission denied, read-only filesystem, etc.).
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // A sync probe keeps the error surface simple
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Write `contents` to `path` through a sibling temporary file and a rename,
/// so readers never observe a half-written cache.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
