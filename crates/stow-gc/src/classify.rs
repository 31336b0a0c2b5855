//! Sorting the roots of reachability into the sets each pass packs.
//!
//! Branch heads go into the first pack. Everything else that must stay
//! alive (other refs, reflog entries, staged index content) goes into the
//! second. Tag targets and heads are hinted to the writer so they are
//! placed first.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use stow_index::non_head_objects;
use stow_refs::{Ref, RefDatabase, RefTarget, HEAD, MAX_SYMBOLIC_DEPTH};
use stow_store::{Commit, ObjectKind, ObjectReader, StoreError};
use stow_types::ObjectId;
use tracing::debug;

use crate::error::GcResult;

/// Object ids split by the pass that packs them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    /// Targets of refs under `refs/heads/`.
    pub heads: HashSet<ObjectId>,
    /// Every other live root.
    pub non_heads: HashSet<ObjectId>,
    /// Peeled tag targets plus all heads.
    pub tag_targets: HashSet<ObjectId>,
}

impl Classification {
    /// Classify a ref snapshot. Symbolic refs and refs holding the null id
    /// contribute nothing.
    pub fn from_refs<'a>(refs: impl IntoIterator<Item = &'a Ref>) -> Self {
        let mut out = Self::default();
        for r in refs {
            let Some(id) = r.object_id() else {
                continue;
            };
            if r.is_head() {
                out.heads.insert(id);
            } else {
                out.non_heads.insert(id);
            }
            if let Some(peeled) = r.peeled_id() {
                out.tag_targets.insert(peeled);
            }
        }
        out.tag_targets.extend(out.heads.iter().copied());
        out
    }

    /// Keep objects alive that only a reflog or the index still names.
    pub fn add_non_heads(&mut self, ids: impl IntoIterator<Item = ObjectId>) {
        self.non_heads
            .extend(ids.into_iter().filter(|id| !id.is_null()));
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty() && self.non_heads.is_empty()
    }
}

/// Object ids named by reflog entries recorded at or after `since`
/// (every entry when `since` is `None`). Null ids are skipped.
///
/// Logs of deleted refs are included.
pub fn reflog_objects(
    refs: &dyn RefDatabase,
    since: Option<DateTime<Utc>>,
) -> GcResult<HashSet<ObjectId>> {
    let mut out = HashSet::new();
    for name in refs.reflog_names()? {
        // Newest first: stop at the first entry that is too old.
        for entry in refs.reflog(&name)? {
            if since.is_some_and(|since| entry.who.when < since) {
                break;
            }
            for id in [entry.new_id, entry.old_id] {
                if !id.is_null() {
                    out.insert(id);
                }
            }
        }
    }
    Ok(out)
}

/// Resolve a ref within a snapshot, following symbolic refs.
pub fn snapshot_target(refs: &BTreeMap<String, Ref>, r: &Ref) -> Option<ObjectId> {
    let mut current = r;
    for _ in 0..=MAX_SYMBOLIC_DEPTH {
        match &current.target {
            RefTarget::Object { .. } => return current.object_id(),
            RefTarget::Symbolic(target) => current = refs.get(target)?,
        }
    }
    None
}

/// Ids of staged index content that differs from the tree at `HEAD`.
///
/// Without an index file there is nothing staged.
pub fn index_objects(
    reader: &dyn ObjectReader,
    refs: &dyn RefDatabase,
    index_file: Option<&Path>,
) -> GcResult<HashSet<ObjectId>> {
    let Some(path) = index_file else {
        return Ok(HashSet::new());
    };
    let entries = stow_index::read_entries(path)?;
    if entries.is_empty() {
        return Ok(HashSet::new());
    }

    let head_tree = match refs.resolve(HEAD)? {
        Some(id) => {
            let object = reader.read(&id)?.ok_or(StoreError::NotFound(id))?;
            if object.kind != ObjectKind::Commit {
                return Err(StoreError::CorruptObject {
                    id,
                    reason: format!("HEAD names a {}, not a commit", object.kind),
                }
                .into());
            }
            Some(Commit::from_stored_object(&object)?.tree)
        }
        None => None,
    };

    let ids = non_head_objects(entries.values(), reader, head_tree.as_ref())?;
    debug!(count = ids.len(), "staged objects not in HEAD");
    Ok(ids)
}
