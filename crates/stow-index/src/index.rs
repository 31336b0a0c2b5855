//! The core Index structure managing staged entries.
//!
//! The [`Index`] manages a `BTreeMap<String, IndexEntry>` as the staging
//! area. It is persisted as a single bincode file that is replaced
//! atomically on save.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use stow_store::{Blob, EntryMode, ObjectStore, Tree, TreeEntry};
use stow_types::ObjectId;
use tracing::debug;

use crate::entry::{IndexEntry, IndexFlags};
use crate::error::{IndexError, IndexResult};

/// Version written into index files.
pub const INDEX_FILE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    entries: Vec<IndexEntry>,
}

/// The staging index: tracks which files are staged for the next commit.
///
/// The `store` is used for writing blob and tree objects when staging
/// content or building trees.
pub struct Index {
    /// All tracked entries, keyed by path.
    pub entries: BTreeMap<String, IndexEntry>,
    /// Cached tree ObjectId for the current staged state (invalidated on changes).
    pub tree_cache: Option<ObjectId>,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("entries", &self.entries.len())
            .field("tree_cache", &self.tree_cache)
            .finish()
    }
}

impl Index {
    /// Create a new empty index backed by the given store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            entries: BTreeMap::new(),
            tree_cache: None,
            store,
        }
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an entry by path.
    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    // ---------------------------------------------------------------
    // Stage operations
    // ---------------------------------------------------------------

    /// Stage a file: write its blob to the store and record a staged entry.
    pub fn stage_file(&mut self, path: &str, content: &[u8], mode: EntryMode) -> IndexResult<()> {
        let stored = Blob::new(content.to_vec()).to_stored_object();
        let object_id = self.store.write(&stored)?;
        self.stage_object(path, object_id, mode, content.len() as u64)
    }

    /// Stage a file from an already-stored object ID.
    pub fn stage_object(
        &mut self,
        path: &str,
        object_id: ObjectId,
        mode: EntryMode,
        size: u64,
    ) -> IndexResult<()> {
        if path.is_empty() {
            return Err(IndexError::InvalidPath("empty path".to_string()));
        }

        self.entries.insert(
            path.to_string(),
            IndexEntry::new_staged(path, object_id, mode, size),
        );
        self.tree_cache = None;
        Ok(())
    }

    /// Remove an entry from the index entirely.
    pub fn remove(&mut self, path: &str) -> IndexResult<IndexEntry> {
        self.tree_cache = None;
        self.entries
            .remove(path)
            .ok_or_else(|| IndexError::PathNotFound(path.to_string()))
    }

    /// Stage the removal of a file (keeps the entry but flags it).
    pub fn mark_deleted(&mut self, path: &str) -> IndexResult<()> {
        let entry = self
            .entries
            .get_mut(path)
            .ok_or_else(|| IndexError::PathNotFound(path.to_string()))?;

        entry.flags.deleted = true;
        entry.flags.staged = true;
        self.tree_cache = None;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Tree building
    // ---------------------------------------------------------------

    /// Write a tree of every live entry to the store and return its id.
    pub fn write_tree(&mut self) -> IndexResult<ObjectId> {
        let tree_entries: Vec<TreeEntry> = self
            .entries
            .values()
            .filter(|e| e.is_live())
            .map(|e| TreeEntry::new(e.mode, &e.path, e.object_id))
            .collect();

        let stored = Tree::new(tree_entries).to_stored_object()?;
        let tree_id = self.store.write(&stored)?;

        self.tree_cache = Some(tree_id);
        Ok(tree_id)
    }

    /// Replace the index contents with the entries of a tree.
    pub fn read_tree(&mut self, tree_id: &ObjectId) -> IndexResult<()> {
        let flattened = crate::diff::flatten_tree(self.store.as_ref(), tree_id)?;

        self.entries.clear();
        for (path, (mode, object_id)) in flattened {
            let entry = IndexEntry {
                path: path.clone(),
                object_id,
                mode,
                size: 0,
                mtime: SystemTime::now(),
                flags: IndexFlags::default(),
            };
            self.entries.insert(path, entry);
        }

        self.tree_cache = Some(*tree_id);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------

    /// Write the index to `path`, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> IndexResult<()> {
        let file = IndexFile {
            version: INDEX_FILE_VERSION,
            entries: self.entries.values().cloned().collect(),
        };
        let bytes =
            bincode::serialize(&file).map_err(|e| IndexError::Serialization(e.to_string()))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| IndexError::Io(e.error))?;

        debug!(entries = self.entries.len(), path = %path.display(), "saved index");
        Ok(())
    }

    /// Load an index from `path`. A missing file yields an empty index.
    pub fn load(path: &Path, store: Arc<dyn ObjectStore>) -> IndexResult<Self> {
        let mut index = Self::new(store);
        index.entries = read_entries(path)?;
        Ok(index)
    }
}

/// Read only the entries of the index file at `path`.
///
/// A missing file is an empty index.
pub fn read_entries(path: &Path) -> IndexResult<BTreeMap<String, IndexEntry>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };
    let file: IndexFile =
        bincode::deserialize(&bytes).map_err(|e| IndexError::Serialization(e.to_string()))?;
    if file.version != INDEX_FILE_VERSION {
        return Err(IndexError::UnsupportedVersion(file.version));
    }
    Ok(file
        .entries
        .into_iter()
        .map(|e| (e.path.clone(), e))
        .collect())
}
