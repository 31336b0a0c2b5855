//! Error types for garbage collection.

use stow_index::IndexError;
use stow_pack::PackError;
use stow_refs::RefError;
use stow_store::StoreError;
use thiserror::Error;

/// Errors that can occur while repacking or pruning.
#[derive(Debug, Error)]
pub enum GcError {
    /// Reading or writing loose objects failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Writing, installing or reading a pack failed.
    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    /// Reading refs or reflogs failed.
    #[error("ref error: {0}")]
    Ref(#[from] RefError),

    /// Reading the staging index failed.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// The progress monitor asked to stop.
    #[error("garbage collection cancelled")]
    Cancelled,

    /// Another writer changed the pack set while this run was packing.
    #[error("pack set changed concurrently, retry later")]
    ConcurrentModification,

    /// Only one pack index version can be written.
    #[error("unsupported pack index version: {0}")]
    UnsupportedIndexVersion(u32),

    /// A prune expiry could not be parsed.
    #[error("invalid prune expiry {value:?}: {reason}")]
    InvalidExpire { value: String, reason: String },

    /// A configuration document could not be parsed.
    #[error("invalid gc configuration: {0}")]
    Config(String),
}

impl GcError {
    /// Lift a pack error, keeping cancellation distinguishable.
    pub(crate) fn from_pack(e: PackError) -> Self {
        match e {
            PackError::Cancelled => GcError::Cancelled,
            other => GcError::Pack(other),
        }
    }
}

/// Convenience alias for garbage collection results.
pub type GcResult<T> = Result<T, GcError>;
