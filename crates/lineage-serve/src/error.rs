//! Error types for the lineage-serve crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Build of {name} still running after {waited_secs}s")]
    Timeout { name: String, waited_secs: u64 },

    #[error("Build of {name} failed: {reason}")]
    BuildFailed { name: String, reason: String },

    #[error("No entities export found in {dir}")]
    ExportNotFound { dir: String },

    #[error("Lineage error: {0}")]
    Lineage(#[from] lineage_core::LineageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServeError {
    /// Whether the caller should simply ask again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::BuildFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, ServeError>;
