//! Error types for the index crate.

use stow_types::ObjectId;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The specified path was not found in the index.
    #[error("path not found in index: {0}")]
    PathNotFound(String),

    /// An object referenced by the index was not found in the store.
    #[error("object not found in store: {0:?}")]
    ObjectNotFound(ObjectId),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] stow_store::StoreError),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The index file was written by an incompatible version.
    #[error("unsupported index file version: {0}")]
    UnsupportedVersion(u32),

    /// An invalid path was provided.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// I/O error reading or writing the index file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
