//! State captured at the start of a repack and threaded through its passes.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use stow_pack::{ObjectDatabase, Pack, PackDescription};
use stow_refs::{Ref, RefDatabase};
use tracing::debug;

use crate::classify::{index_objects, reflog_objects, Classification};
use crate::coalesce::RebuildPlan;
use crate::error::GcResult;

/// One consistent view of refs and packs for a single repack.
#[derive(Clone, Debug)]
pub struct RunContext {
    /// When the snapshot was taken.
    pub started: DateTime<Utc>,
    /// Every ref, including additional refs.
    pub refs_before: BTreeMap<String, Ref>,
    /// The full pack set the run started from.
    pub packs_before: Vec<PackDescription>,
    pub plan: RebuildPlan,
    pub classification: Classification,
}

impl RunContext {
    /// Snapshot refs and packs, then classify the live roots.
    ///
    /// Caches of both databases are dropped first so the snapshot reflects
    /// the backing stores.
    pub fn capture(
        objects: &dyn ObjectDatabase,
        refs: &dyn RefDatabase,
        index_file: Option<&Path>,
        coalesce_garbage_limit: u64,
        now: DateTime<Utc>,
    ) -> GcResult<Self> {
        refs.clear_cache();
        objects.clear_cache();

        let refs_before = refs.all_refs()?;
        let packs = objects.packs()?;
        let packs_before = packs.iter().map(|p| p.description.clone()).collect();
        let plan = RebuildPlan::new(packs, coalesce_garbage_limit);

        let mut classification = Classification::from_refs(refs_before.values());
        classification.add_non_heads(reflog_objects(refs, None)?);
        classification.add_non_heads(index_objects(objects.reader(), refs, index_file)?);

        debug!(
            refs = refs_before.len(),
            heads = classification.heads.len(),
            non_heads = classification.non_heads.len(),
            rebuild = plan.rebuild.len(),
            keep = plan.keep.len(),
            untouched = plan.untouched.len(),
            "captured gc snapshot"
        );
        Ok(Self {
            started: now,
            refs_before,
            packs_before,
            plan,
            classification,
        })
    }

    /// Find a pack of the starting pack set by name.
    pub fn existing_pack(&self, name: &str) -> Option<&Pack> {
        self.plan.all().find(|p| p.name() == name)
    }
}

/// What the last successful repack saw. Prune uses it to skip refs that
/// have not moved since.
#[derive(Clone, Debug)]
pub struct LastRepack {
    pub refs: BTreeMap<String, Ref>,
    pub started: DateTime<Utc>,
}

impl From<&RunContext> for LastRepack {
    fn from(ctx: &RunContext) -> Self {
        Self {
            refs: ctx.refs_before.clone(),
            started: ctx.started,
        }
    }
}
