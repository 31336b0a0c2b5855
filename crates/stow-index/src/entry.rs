//! Index entry types for tracking working directory files.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use stow_store::EntryMode;
use stow_types::ObjectId;

/// An entry in the staging index, representing a tracked file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Relative path from the workdir root.
    pub path: String,
    /// Content-addressed ID of the file's blob in the object store.
    pub object_id: ObjectId,
    /// File mode (regular, executable, symlink, gitlink).
    pub mode: EntryMode,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time (used for quick dirty checks).
    pub mtime: SystemTime,
    /// Status flags for this entry.
    pub flags: IndexFlags,
}

impl IndexEntry {
    /// Create a new, unstaged entry.
    pub fn new(path: impl Into<String>, object_id: ObjectId, mode: EntryMode, size: u64) -> Self {
        Self {
            path: path.into(),
            object_id,
            mode,
            size,
            mtime: SystemTime::now(),
            flags: IndexFlags::default(),
        }
    }

    /// Create a new staged entry.
    pub fn new_staged(
        path: impl Into<String>,
        object_id: ObjectId,
        mode: EntryMode,
        size: u64,
    ) -> Self {
        let mut entry = Self::new(path, object_id, mode, size);
        entry.flags.staged = true;
        entry
    }

    /// Whether this entry will be part of the next tree written.
    pub fn is_live(&self) -> bool {
        !self.flags.deleted
    }
}

/// Status flags for an index entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFlags {
    /// Whether the file is staged for the next commit.
    pub staged: bool,
    /// Whether the file's removal has been staged.
    pub deleted: bool,
}
