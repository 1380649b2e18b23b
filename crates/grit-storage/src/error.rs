//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No loose object exists for the given id.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// A loose object failed header or size validation.
    #[error("corrupt object: {0}")]
    CorruptObject(String),

    /// Malformed object content (bad hex, unknown type, bad record).
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// A tree entry mode outside the supported set.
    #[error("unsupported tree entry mode: {0}")]
    UnsupportedMode(String),
}
