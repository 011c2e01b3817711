// ABOUTME: Writes run summaries to disk as JSON
// ABOUTME: Uses an atomic temp-file rename so a crash never leaves a half-written report

use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Serialize `summary` as pretty JSON to `path`
///
/// Parent directories are created as needed. The file is written next to
/// its destination and renamed into place.
pub fn write_json_report<T: Serialize>(path: &Path, summary: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), summary)?;
    tmp.persist(path).map_err(|e| e.error)?;

    tracing::info!("Report written to {}", path.display());
    Ok(())
}
