use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::types::StreamKind;

/// Recursively collect every stream CSV (`acc.csv`, `eda.csv`, `temp.csv`)
/// under `root`. Unreadable entries are logged and skipped; the walk is not
/// aborted. Results come back sorted so downstream processing is
/// deterministic.
pub fn discover_stream_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(PipelineError::structural(root, "export root not found"));
    }
    if !root.is_dir() {
        return Err(PipelineError::structural(root, "export root is not a directory"));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && StreamKind::from_path(entry.path()).is_ok() {
                    files.push(entry.path().to_path_buf());
                }
            }
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                // Continue scanning, don't abort
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Keep only the paths whose file stem is one of the requested streams.
pub fn filter_streams(paths: Vec<PathBuf>, streams: &[StreamKind]) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|p| {
            StreamKind::from_path(p)
                .map(|s| streams.contains(&s))
                .unwrap_or(false)
        })
        .collect()
}
