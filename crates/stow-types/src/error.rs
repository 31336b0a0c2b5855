use thiserror::Error;

/// Errors from parsing object identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// The text is not hexadecimal.
    #[error("object id is not valid hex: {0}")]
    InvalidHex(String),

    /// The decoded id has the wrong number of bytes.
    #[error("object id must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
