use stow_store::StoreError;
use stow_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid pack magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("pack checksum mismatch")]
    ChecksumMismatch,

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("CRC32 mismatch for object {id}")]
    CrcMismatch { id: ObjectId },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("invalid pack name: {0}")]
    InvalidPackName(String),

    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    #[error("operation cancelled")]
    Cancelled,

    /// An invariant of the pack directory was violated mid-operation, e.g. a
    /// pack file was installed but its index could not be.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type PackResult<T> = Result<T, PackError>;
