//! Storage error types.

use std::io;
use thiserror::Error;

/// Tiddler store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Title or location not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed record, missing title, or otherwise unusable input
    #[error("Invalid tiddler: {0}")]
    Invalid(String),

    /// Structured (JSON) encoding could not be parsed or produced
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// I/O error from the local filesystem
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Object store error
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Storage medium unreachable or failing
    #[error("Backend unavailable: {0}")]
    Backend(String),

    /// Operation not implemented by this backend
    #[error("Not implemented by {backend}: {operation}")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound(_) => true,
            StoreError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            StoreError::ObjectStore(object_store::Error::NotFound { .. }) => true,
            _ => false,
        }
    }

    /// Check if the storage medium itself failed (as opposed to bad input).
    pub fn is_backend_failure(&self) -> bool {
        match self {
            StoreError::Backend(_) => true,
            StoreError::Io(_) | StoreError::ObjectStore(_) => !self.is_not_found(),
            _ => false,
        }
    }

    pub(crate) fn not_implemented(backend: &'static str, operation: &'static str) -> Self {
        StoreError::NotImplemented { backend, operation }
    }
}
