//! Reference management for stow.
//!
//! Named references (branches, tags, remote tracking refs, `HEAD`) are the
//! roots of reachability: garbage collection keeps everything reachable from
//! a ref or from a ref's reflog.
//!
//! # Modules
//!
//! - [`error`]: error types for ref operations
//! - [`types`]: [`Ref`], [`RefTarget`], [`RefStorage`], [`ReflogEntry`], [`PersonIdent`]
//! - [`traits`]: the [`RefDatabase`] trait
//! - [`names`]: ref name validation
//! - [`memory`]: in-memory [`InMemoryRefDatabase`]

pub mod error;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, Result};
pub use memory::InMemoryRefDatabase;
pub use names::{branch_ref, validate_branch_name, validate_ref_name};
pub use traits::{RefDatabase, MAX_SYMBOLIC_DEPTH};
pub use types::{
    PersonIdent, Ref, RefStorage, RefTarget, ReflogEntry, HEAD, HEADS_PREFIX, REFS_PREFIX,
    TAGS_PREFIX,
};
