use std::fmt;

use serde::{Deserialize, Serialize};
use stow_pack::ObjectDatabase;
use stow_refs::{RefDatabase, RefStorage};

use crate::error::GcResult;

/// A snapshot of how a repository's objects and refs are stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoStatistics {
    /// Objects across all packs. An object in two packs counts twice.
    pub packed_objects: u64,
    pub pack_files: u64,
    /// Bytes of all pack files.
    pub packed_bytes: u64,
    pub loose_objects: u64,
    pub loose_bytes: u64,
    /// Refs stored loose, including loose refs that shadow a packed copy.
    pub loose_refs: u64,
    /// Refs present in the packed-refs store.
    pub packed_refs: u64,
}

impl RepoStatistics {
    pub fn collect(objects: &dyn ObjectDatabase, refs: &dyn RefDatabase) -> GcResult<Self> {
        let mut stats = Self::default();
        for pack in objects.packs()? {
            stats.pack_files += 1;
            stats.packed_objects += pack.reader.object_count() as u64;
            stats.packed_bytes += pack.reader.pack_size();
        }
        (stats.loose_objects, stats.loose_bytes) = objects.loose().usage()?;

        for r in refs.refs()?.values() {
            match r.storage {
                RefStorage::Loose => stats.loose_refs += 1,
                RefStorage::Packed => stats.packed_refs += 1,
                RefStorage::LoosePacked => {
                    stats.loose_refs += 1;
                    stats.packed_refs += 1;
                }
                RefStorage::New => {}
            }
        }
        Ok(stats)
    }
}

impl fmt::Display for RepoStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} packed objects in {} packs ({} bytes), {} loose objects ({} bytes), {} loose refs, {} packed refs",
            self.packed_objects,
            self.pack_files,
            self.packed_bytes,
            self.loose_objects,
            self.loose_bytes,
            self.loose_refs,
            self.packed_refs,
        )
    }
}
