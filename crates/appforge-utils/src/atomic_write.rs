//! Atomic file writes: temp file in the target directory, fsync, rename.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

use crate::canonicalization::normalize_line_endings;

/// Atomically write content to a file using temp file + fsync + rename.
///
/// Parent directories are created as needed and line endings are normalized
/// to LF. A reader never observes a half-written file.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    let normalized_content = normalize_line_endings(content);

    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create parent directory: {parent}"))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in: {parent}"))?;

    temp_file
        .write_all(normalized_content.as_bytes())
        .with_context(|| "Failed to write content to temporary file")?;

    temp_file
        .as_file()
        .sync_all()
        .with_context(|| "Failed to fsync temporary file")?;

    temp_file
        .persist(path.as_std_path())
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to atomically write file: {path}"))?;

    Ok(())
}
