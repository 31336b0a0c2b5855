use stow_types::ObjectId;

use crate::error::StoreResult;
use crate::object::StoredObject;

/// Read side of a content-addressed object store.
///
/// Implementations must be safe to share across threads: objects are
/// immutable once written, so concurrent reads never conflict.
pub trait ObjectReader: Send + Sync {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    /// Returns `Err` on I/O failure or data corruption.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Check whether an object exists.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.read(id)?.is_some())
    }

    /// Read multiple objects in a batch.
    fn read_batch(&self, ids: &[ObjectId]) -> StoreResult<Vec<Option<StoredObject>>> {
        ids.iter().map(|id| self.read(id)).collect()
    }
}

/// Writable content-addressed object store.
///
/// - Objects are immutable once written. The same data always produces the
///   same ID, so writing an existing object is a no-op.
/// - The store never interprets object contents.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: ObjectReader {
    /// Write an object and return its content-addressed ID.
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Delete an object by ID. Returns `true` if the object existed.
    ///
    /// Intended for garbage collection only. Deleting a referenced object
    /// corrupts the repository.
    fn delete(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Write multiple objects in a batch and return their IDs.
    fn write_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<ObjectId>> {
        objects.iter().map(|obj| self.write(obj)).collect()
    }
}
