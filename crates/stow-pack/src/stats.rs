use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stow_store::ObjectKind;

/// What a single pack write produced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackStatistics {
    pub objects_by_kind: BTreeMap<ObjectKind, u64>,
    /// Entries copied from an existing pack without recompression.
    pub reused_objects: u64,
    pub total_objects: u64,
    pub pack_bytes: u64,
    pub index_bytes: u64,
    pub bitmap_bytes: u64,
    /// Commits that received a reachability bitmap.
    pub bitmap_commits: u64,
}

impl PackStatistics {
    pub(crate) fn record(&mut self, kind: ObjectKind, reused: bool) {
        *self.objects_by_kind.entry(kind).or_default() += 1;
        self.total_objects += 1;
        if reused {
            self.reused_objects += 1;
        }
    }

    pub fn objects_of(&self, kind: ObjectKind) -> u64 {
        self.objects_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

impl std::fmt::Display for PackStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} objects ({} commits, {} trees, {} blobs, {} tags), {} reused, {} bytes",
            self.total_objects,
            self.objects_of(ObjectKind::Commit),
            self.objects_of(ObjectKind::Tree),
            self.objects_of(ObjectKind::Blob),
            self.objects_of(ObjectKind::Tag),
            self.reused_objects,
            self.pack_bytes,
        )
    }
}
