//! File discovery: expand a user-supplied path into the list of jobs.
//!
//! Directories are walked recursively with entries sorted by file name, so
//! the submission order is stable across runs and platforms.

use crate::error::HandwriteError;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Extensions accepted by the pipeline (lowercase, without the dot).
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["pdf", "png", "jpg", "jpeg"];

/// True if `path` has a supported extension, ignoring case.
pub fn is_supported_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| e.eq_ignore_ascii_case(s))
        })
        .unwrap_or(false)
}

/// List the supported files at `path`.
///
/// A single file is included iff its extension matches. A missing path is
/// [`HandwriteError::InputNotFound`]. An empty result is returned as-is; the
/// caller decides whether that is fatal.
pub fn list_supported_files(path: &Path) -> Result<Vec<PathBuf>, HandwriteError> {
    let meta = std::fs::metadata(path).map_err(|_| HandwriteError::InputNotFound {
        path: path.to_path_buf(),
    })?;

    if !meta.is_dir() {
        return Ok(if is_supported_file(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| HandwriteError::DiscoveryFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        if entry.file_type().is_file() && is_supported_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    debug!("Discovered {} supported file(s) under {}", files.len(), path.display());
    Ok(files)
}
