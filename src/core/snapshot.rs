//! Loading the JSON snapshot that feeds a scan.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::ScanInput;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses a snapshot document.
pub fn parse_snapshot(content: &str) -> Result<ScanInput, SnapshotError> {
    let input: ScanInput = serde_json::from_str(content)?;
    warn_anomalies(&input);
    Ok(input)
}

/// Reads and parses the snapshot at `path`.
pub fn load_snapshot(path: &Path) -> Result<ScanInput, SnapshotError> {
    let content = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_snapshot(&content)
}

/// Logs suspicious but tolerated input shapes.
fn warn_anomalies(input: &ScanInput) {
    let mut seen = HashSet::new();
    for source in &input.sources {
        if !seen.insert(&source.path) {
            tracing::warn!("Duplicate source entry {:?}", source.path);
        }
    }

    let mut changed = HashSet::new();
    for change in &input.changes {
        if !changed.insert(&change.path) {
            tracing::warn!("Duplicate change entry {:?}", change.path);
        }
        if change.hunks.is_empty() && change.additions + change.deletions > 0 {
            tracing::warn!(
                "{:?} reports {} changed lines but carries no hunks",
                change.path,
                change.additions + change.deletions
            );
        }
    }

    tracing::debug!(
        "Snapshot: {} sources, {} changes",
        input.sources.len(),
        input.changes.len()
    );
}
