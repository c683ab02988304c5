//! Storage error types
//!
//! Defines all errors that can occur in the interval store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the interval store
#[derive(Error, Debug)]
pub enum StoreError {
    /// A data file failed to read or parse
    #[error("invalid data file {path:?}: {reason}")]
    InvalidFile { path: PathBuf, reason: String },

    /// No data file covers the interval targeted by a delete
    #[error("no data file contains interval '{0}'")]
    NotFound(String),

    /// The undo journal could not be persisted
    #[error("undo journal cannot be written: {0}")]
    JournalFull(String),

    /// I/O operation failed
    #[error("{path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A class of bugs caught by internal assertions
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl StoreError {
    /// Attach a path to a raw I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
