//! Staging index for stow.
//!
//! Tracks staged content between the working directory and the next commit.
//! Blobs staged here but not yet committed are reachable only through the
//! index; [`non_head_objects`] reports them so garbage collection keeps them.
//!
//! # Key Types
//!
//! - [`Index`]: the staging area (BTreeMap-backed), saved as one bincode file
//! - [`IndexEntry`]: a tracked file entry with flags
//! - [`IndexFlags`]: staged/deleted flags

pub mod diff;
pub mod entry;
pub mod error;
pub mod index;

pub use diff::{flatten_tree, non_head_objects};
pub use entry::{IndexEntry, IndexFlags};
pub use error::{IndexError, IndexResult};
pub use index::{read_entries, Index, INDEX_FILE_VERSION};
