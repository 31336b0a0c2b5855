use chrono::{DateTime, Utc};
use stow_types::ObjectId;

use crate::error::StoreResult;
use crate::traits::ObjectStore;

/// Metadata of one loose object, as seen by a directory scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LooseObject {
    pub id: ObjectId,
    /// Last modification time of the backing file.
    pub modified: DateTime<Utc>,
    /// On-disk size in bytes.
    pub size: u64,
}

/// An object store whose contents can be enumerated with timestamps.
///
/// Garbage collection needs the modification time of every loose object to
/// decide whether it is old enough to prune.
pub trait LooseObjects: ObjectStore {
    /// List every loose object. Order is unspecified.
    fn scan(&self) -> StoreResult<Vec<LooseObject>>;

    /// Number of loose objects and their total size in bytes.
    fn usage(&self) -> StoreResult<(u64, u64)> {
        let objects = self.scan()?;
        let size = objects.iter().map(|o| o.size).sum();
        Ok((objects.len() as u64, size))
    }
}
