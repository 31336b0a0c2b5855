//! Comparing the index against the tree of the `HEAD` commit.
//!
//! Staged content that differs from `HEAD` is reachable only through the
//! index, so garbage collection treats those blobs as live.

use std::collections::{BTreeMap, HashSet};

use stow_store::{EntryMode, ObjectReader, Tree};
use stow_types::ObjectId;

use crate::entry::IndexEntry;
use crate::error::{IndexError, IndexResult};

/// Flatten a tree into `path -> (mode, id)`, descending into subtrees.
///
/// Gitlink entries are kept as leaves; their targets live in another
/// repository.
pub fn flatten_tree<R: ObjectReader + ?Sized>(
    reader: &R,
    tree_id: &ObjectId,
) -> IndexResult<BTreeMap<String, (EntryMode, ObjectId)>> {
    let mut out = BTreeMap::new();
    let mut pending = vec![(String::new(), *tree_id)];
    while let Some((prefix, id)) = pending.pop() {
        let stored = reader
            .read(&id)?
            .ok_or(IndexError::ObjectNotFound(id))?;
        let tree = Tree::from_stored_object(&stored)?;
        for entry in tree.entries {
            let path = if prefix.is_empty() {
                entry.name
            } else {
                format!("{prefix}/{}", entry.name)
            };
            if entry.mode == EntryMode::Directory {
                pending.push((path, entry.object_id));
            } else {
                out.insert(path, (entry.mode, entry.object_id));
            }
        }
    }
    Ok(out)
}

/// Ids of index entries whose content differs from `HEAD`.
///
/// With no `head_tree` (an unborn branch) every live entry differs.
/// Gitlink entries and staged deletions contribute nothing.
pub fn non_head_objects<'a, R: ObjectReader + ?Sized>(
    entries: impl IntoIterator<Item = &'a IndexEntry>,
    reader: &R,
    head_tree: Option<&ObjectId>,
) -> IndexResult<HashSet<ObjectId>> {
    let head = match head_tree {
        Some(tree) => flatten_tree(reader, tree)?,
        None => BTreeMap::new(),
    };

    Ok(entries
        .into_iter()
        .filter(|e| e.is_live() && e.mode != EntryMode::Gitlink)
        .filter(|e| head.get(&e.path).map(|(_, id)| id) != Some(&e.object_id))
        .map(|e| e.object_id)
        .collect())
}
