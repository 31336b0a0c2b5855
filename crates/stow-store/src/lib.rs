//! Content-addressed object storage for stow.
//!
//! This crate implements the object model and the loose half of the object
//! database, analogous to git's `.git/objects/` fan-out directory. Every
//! object -- commits, trees, blobs, annotated tags -- is immutable and
//! identified by its BLAKE3 hash (domain-separated by object kind).
//!
//! # Object Types
//!
//! - [`Commit`] -- a snapshot: root tree plus parent commits
//! - [`Tree`] -- directory listing mapping names to object references
//! - [`Blob`] -- raw content
//! - [`Tag`] -- annotated tag pointing at (and peeling to) another object
//!
//! # Loose Backends
//!
//! All backends implement [`ObjectStore`] and [`LooseObjects`]:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileObjectStore`] -- one zstd-compressed file per object under a
//!   two-character fan-out directory
//!
//! # Reachability
//!
//! [`ObjectWalk`] enumerates the closure of a set of start objects, minus the
//! closure of a set of uninteresting boundary objects.

pub mod error;
pub mod file;
pub mod loose;
pub mod memory;
pub mod object;
pub mod traits;
pub mod walk;

pub use error::{StoreError, StoreResult};
pub use file::FileObjectStore;
pub use loose::{LooseObject, LooseObjects};
pub use memory::InMemoryObjectStore;
pub use object::{Blob, Commit, EntryMode, ObjectKind, StoredObject, Tag, Tree, TreeEntry};
pub use traits::{ObjectReader, ObjectStore};
pub use walk::ObjectWalk;
