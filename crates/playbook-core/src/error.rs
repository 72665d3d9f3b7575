//! Error types for playbook operations.

use std::path::PathBuf;

use playbook_abstraction::EmbeddingError;
use thiserror::Error;

use crate::index::IndexError;

/// Errors that can occur during playbook operations.
#[derive(Error, Debug)]
pub enum PlaybookError {
    /// A bullet id (or section filter) does not resolve in the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// The embedding collaborator failed; the call aborted with the store untouched.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(#[from] EmbeddingError),

    /// The vector index disagrees with the store.
    #[error("index inconsistency: {0}")]
    IndexInconsistency(String),

    /// The vector index rejected an operation.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// A delta operation could not be applied; the whole delta was rolled back.
    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    /// Snapshot or load failed at a specific path.
    #[error("persistence failure at {path}: {source}")]
    PersistenceFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot contents could not be understood.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PlaybookError {
    /// Whether this is a persistence problem (the in-memory state is still valid).
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::PersistenceFailure { .. } | Self::CorruptSnapshot(_))
    }
}

/// Result type alias for playbook operations.
pub type Result<T> = std::result::Result<T, PlaybookError>;
