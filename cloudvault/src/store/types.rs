//! Errors for the external storage boundaries.

use thiserror::Error;

/// Errors from durable-store and metadata-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist in the durable store
    #[error("object '{0}' not found")]
    NotFound(String),

    /// Write to the durable store failed
    #[error("durable write failed: {0}")]
    WriteFailed(String),

    /// Read from the durable store failed
    #[error("durable read failed: {0}")]
    ReadFailed(String),

    /// Metadata record could not be written
    #[error("metadata write failed: {0}")]
    MetadataFailed(String),

    /// I/O error while streaming object bytes
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}
