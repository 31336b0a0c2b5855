//! Deleting loose objects: unreachable ones past their expiry, and ones a
//! pack already holds.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use stow_pack::ObjectDatabase;
use stow_refs::RefDatabase;
use stow_store::{LooseObject, ObjectWalk};
use stow_types::ObjectId;
use tracing::debug;

use crate::classify::{index_objects, reflog_objects, snapshot_target};
use crate::context::LastRepack;
use crate::error::GcResult;

/// Inputs of one prune besides the two databases.
#[derive(Clone, Copy, Debug)]
pub struct PruneScope<'a> {
    /// Only objects modified strictly before this instant are candidates.
    pub cutoff: DateTime<Utc>,
    /// Objects never pruned, whatever their age.
    pub keep: &'a HashSet<ObjectId>,
    pub last_repack: Option<&'a LastRepack>,
    pub index_file: Option<&'a Path>,
}

/// Delete expired loose objects that nothing reaches. Returns how many
/// were deleted.
///
/// Reachability is checked from refs that moved since the last repack and
/// from reflog entries recorded since then. Everything the last repack's
/// refs reached was packed by it and bounds both walks.
pub fn prune_loose(
    objects: &dyn ObjectDatabase,
    refs: &dyn RefDatabase,
    scope: PruneScope<'_>,
) -> GcResult<usize> {
    let mut candidates: HashMap<ObjectId, LooseObject> = objects
        .loose()
        .scan()?
        .into_iter()
        .filter(|o| o.modified < scope.cutoff && !scope.keep.contains(&o.id))
        .map(|o| (o.id, o))
        .collect();
    debug!(candidates = candidates.len(), cutoff = %scope.cutoff, "prune candidates");
    if candidates.is_empty() {
        return Ok(0);
    }

    for id in index_objects(objects.reader(), refs, scope.index_file)? {
        candidates.remove(&id);
    }
    if candidates.is_empty() {
        return Ok(0);
    }

    let current = refs.all_refs()?;
    let previous = scope.last_repack.filter(|last| !last.refs.is_empty());

    let mut uninteresting = Vec::new();
    let mut starts = Vec::new();
    match previous {
        None => {
            starts.extend(current.values().filter_map(|r| snapshot_target(&current, r)));
        }
        Some(last) => {
            uninteresting.extend(last.refs.values().filter_map(|r| snapshot_target(&last.refs, r)));
            for r in current.values() {
                let moved = last.refs.get(&r.name).map_or(true, |old| !r.same_target(old));
                if moved {
                    starts.extend(snapshot_target(&current, r));
                }
            }
        }
    }
    debug!(
        starts = starts.len(),
        uninteresting = uninteresting.len(),
        "walking refs changed since last repack"
    );
    remove_reachable(objects, &starts, &uninteresting, &mut candidates)?;
    if candidates.is_empty() {
        return Ok(0);
    }

    let since = previous.map(|last| last.started);
    let logged: Vec<ObjectId> = reflog_objects(refs, since)?.into_iter().collect();
    remove_reachable(objects, &logged, &uninteresting, &mut candidates)?;

    let mut deleted = 0;
    for id in candidates.keys() {
        match objects.loose().delete(id) {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(e) => debug!(id = %id.short_hex(), error = %e, "could not delete loose object"),
        }
    }
    debug!(deleted, "pruned loose objects");
    Ok(deleted)
}

/// Remove from `candidates` everything reachable from `starts` but not from
/// `uninteresting`. Stops as soon as no candidate is left.
fn remove_reachable(
    objects: &dyn ObjectDatabase,
    starts: &[ObjectId],
    uninteresting: &[ObjectId],
    candidates: &mut HashMap<ObjectId, LooseObject>,
) -> GcResult<()> {
    if starts.is_empty() {
        return Ok(());
    }
    let mut walk = ObjectWalk::new(objects.reader());
    for id in uninteresting {
        walk.mark_uninteresting(*id)?;
    }
    for id in starts {
        walk.mark_start(*id);
    }
    while let Some((id, _)) = walk.next_object()? {
        candidates.remove(&id);
        if candidates.is_empty() {
            break;
        }
    }
    Ok(())
}

/// Delete every loose object some pack already holds. Returns how many
/// were deleted.
pub fn prune_packed(objects: &dyn ObjectDatabase) -> GcResult<usize> {
    let packs = objects.packs()?;
    if packs.is_empty() {
        return Ok(0);
    }
    let mut deleted = 0;
    for loose in objects.loose().scan()? {
        if !packs.iter().any(|p| p.reader.contains(&loose.id)) {
            continue;
        }
        match objects.loose().delete(&loose.id) {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(e) => debug!(id = %loose.id.short_hex(), error = %e, "could not delete packed loose object"),
        }
    }
    debug!(deleted, "removed loose copies of packed objects");
    Ok(deleted)
}
