use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("path does not match the export layout: {}: {reason}", path.display())]
    StructuralPath { path: PathBuf, reason: String },

    #[error("count reconciliation failed: {0}")]
    Inconsistency(String),

    #[error("I/O failure on {}: {source}", path.display())]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("chunk of {bytes} bytes cannot fit the {max_bytes} byte shard budget for {}", path.display())]
    SizeBudgetViolation {
        path: PathBuf,
        bytes: u64,
        max_bytes: u64,
    },

    #[error("duplicate ledger error: {0}")]
    Ledger(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Attach the offending file to an I/O error so operators can map a
    /// failure back to one physical file.
    pub fn file(path: &Path, source: std::io::Error) -> Self {
        PipelineError::File {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn structural(path: &Path, reason: impl Into<String>) -> Self {
        PipelineError::StructuralPath {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
