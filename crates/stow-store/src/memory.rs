use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use stow_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::loose::{LooseObject, LooseObjects};
use crate::object::StoredObject;
use crate::traits::{ObjectReader, ObjectStore};

struct Entry {
    object: StoredObject,
    modified: DateTime<Utc>,
}

/// In-memory, HashMap-based loose object store.
///
/// Intended for tests and embedding. Every object carries a modification
/// time (the write time unless overridden with [`set_modified`]) so that
/// pruning can be exercised without touching the filesystem.
///
/// [`set_modified`]: InMemoryObjectStore::set_modified
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, Entry>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Return a sorted list of all object IDs in the store.
    pub fn all_ids(&self) -> Vec<ObjectId> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Override the modification time of a stored object.
    ///
    /// Returns `false` if the object is not present.
    pub fn set_modified(&self, id: &ObjectId, when: DateTime<Utc>) -> bool {
        let mut map = self.objects.write().expect("lock poisoned");
        match map.get_mut(id) {
            Some(entry) => {
                entry.modified = when;
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectReader for InMemoryObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).map(|e| e.object.clone()))
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let mut map = self.objects.write().expect("lock poisoned");
        map.entry(id).or_insert_with(|| Entry {
            object: object.clone(),
            modified: Utc::now(),
        });
        Ok(id)
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(map.remove(id).is_some())
    }
}

impl LooseObjects for InMemoryObjectStore {
    fn scan(&self) -> StoreResult<Vec<LooseObject>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map
            .iter()
            .map(|(id, e)| LooseObject {
                id: *id,
                modified: e.modified,
                size: e.object.size,
            })
            .collect())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}
