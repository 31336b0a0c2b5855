//! Which existing packs a repack rewrites.

use stow_pack::{Pack, PackDescription, PackExt, PackSource};

/// The existing packs, split by how a repack treats them.
#[derive(Clone, Debug, Default)]
pub struct RebuildPlan {
    /// Rewritten and then retired.
    pub rebuild: Vec<Pack>,
    /// Kept packs: never rewritten or retired. Their objects are treated as
    /// already packed.
    pub keep: Vec<Pack>,
    /// Garbage packs too large to coalesce. Left alone.
    pub untouched: Vec<Pack>,
}

impl RebuildPlan {
    /// Split `packs`, coalescing garbage packs smaller than `limit` bytes.
    pub fn new(packs: Vec<Pack>, coalesce_garbage_limit: u64) -> Self {
        let mut plan = Self::default();
        for pack in packs {
            if pack.description.is_keep() {
                plan.keep.push(pack);
            } else if should_rebuild(&pack.description, coalesce_garbage_limit) {
                plan.rebuild.push(pack);
            } else {
                plan.untouched.push(pack);
            }
        }
        plan
    }

    /// Every pack of the plan.
    pub fn all(&self) -> impl Iterator<Item = &Pack> {
        self.rebuild
            .iter()
            .chain(&self.keep)
            .chain(&self.untouched)
    }

    /// Total objects in the packs to rebuild.
    pub fn rebuild_objects(&self) -> u64 {
        self.rebuild.iter().map(|p| p.reader.object_count() as u64).sum()
    }
}

/// Whether a non-kept pack is rewritten. Only unreachable-garbage packs at
/// or above the limit are spared.
pub fn should_rebuild(description: &PackDescription, coalesce_garbage_limit: u64) -> bool {
    description.source() != PackSource::UnreachableGarbage
        || description.file_size(PackExt::Pack) < coalesce_garbage_limit
}
