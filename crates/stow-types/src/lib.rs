//! Foundation types for stow.
//!
//! Every other stow crate depends on `stow-types`. It is deliberately small:
//! the identifier every stored object is addressed by, and the hasher that
//! produces those identifiers.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content-addressed identifier (BLAKE3 hash)
//! - [`ContentHasher`]: Domain-separated hasher for each object kind

pub mod error;
pub mod hasher;
pub mod object;

pub use error::TypeError;
pub use hasher::ContentHasher;
pub use object::{ObjectId, OBJECT_ID_HEX_LEN};
