//! In-memory reference database for testing and ephemeral use.
//!
//! [`InMemoryRefDatabase`] keeps refs, reflogs and transient refs in one
//! `RwLock`, so a [`RefDatabase::all_refs`] snapshot is consistent.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use stow_types::ObjectId;
use tracing::debug;

use crate::error::{RefError, Result};
use crate::names::validate_ref_name;
use crate::traits::{RefDatabase, MAX_SYMBOLIC_DEPTH};
use crate::types::{PersonIdent, Ref, RefStorage, RefTarget, ReflogEntry, HEAD, REFS_PREFIX};

#[derive(Debug, Default)]
struct State {
    refs: BTreeMap<String, Ref>,
    /// Oldest entry first.
    logs: BTreeMap<String, Vec<ReflogEntry>>,
    additional: Vec<Ref>,
}

/// An in-memory implementation of [`RefDatabase`].
///
/// Data is lost when the database is dropped.
#[derive(Debug, Default)]
pub struct InMemoryRefDatabase {
    state: RwLock<State>,
}

impl InMemoryRefDatabase {
    /// Create a new empty ref database.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| RefError::Serialization(format!("lock poisoned: {e}")))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| RefError::Serialization(format!("lock poisoned: {e}")))
    }

    /// Point `name` at `id`, appending a reflog entry.
    ///
    /// If `name` is a symbolic ref the update goes to the ref it names, and
    /// both logs record it.
    pub fn update_ref(
        &self,
        name: &str,
        id: ObjectId,
        who: &PersonIdent,
        message: &str,
    ) -> Result<()> {
        self.update(name, RefTarget::Object { id, peeled: None }, who, message)
    }

    /// Point `name` at annotated tag `id`, recording the id it peels to.
    pub fn update_ref_peeled(
        &self,
        name: &str,
        id: ObjectId,
        peeled: ObjectId,
        who: &PersonIdent,
        message: &str,
    ) -> Result<()> {
        let target = RefTarget::Object {
            id,
            peeled: Some(peeled),
        };
        self.update(name, target, who, message)
    }

    fn update(&self, name: &str, target: RefTarget, who: &PersonIdent, message: &str) -> Result<()> {
        validate_ref_name(name)?;
        let mut state = self.write_state()?;
        let leaf = leaf_name(&state.refs, name)?;
        let RefTarget::Object { id: new_id, .. } = target else {
            return Err(RefError::InvalidName {
                name: name.to_string(),
                reason: "update target must be an object".into(),
            });
        };

        let (old_id, storage) = match state.refs.get(&leaf) {
            Some(existing) => {
                let storage = match existing.storage {
                    RefStorage::Packed | RefStorage::LoosePacked => RefStorage::LoosePacked,
                    RefStorage::New | RefStorage::Loose => RefStorage::Loose,
                };
                (existing.object_id().unwrap_or_else(ObjectId::null), storage)
            }
            None => (ObjectId::null(), RefStorage::Loose),
        };

        state.refs.insert(
            leaf.clone(),
            Ref {
                name: leaf.clone(),
                target,
                storage,
            },
        );

        let entry = ReflogEntry {
            old_id,
            new_id,
            who: who.clone(),
            message: message.to_string(),
        };
        if leaf != name {
            state
                .logs
                .entry(name.to_string())
                .or_default()
                .push(entry.clone());
        }
        state.logs.entry(leaf.clone()).or_default().push(entry);

        debug!(name = %leaf, old = %old_id.short_hex(), new = %new_id.short_hex(), "ref updated");
        Ok(())
    }

    /// Make `name` a symbolic ref naming `target`.
    pub fn link_symbolic(&self, name: &str, target: &str) -> Result<()> {
        validate_ref_name(name)?;
        validate_ref_name(target)?;
        let mut state = self.write_state()?;
        state.refs.insert(
            name.to_string(),
            Ref::symbolic(name, target).with_storage(RefStorage::Loose),
        );
        Ok(())
    }

    /// Delete a ref. Its reflog is kept.
    ///
    /// Returns `Ok(true)` if the ref existed. Deleting the branch `HEAD`
    /// names is refused.
    pub fn delete_ref(&self, name: &str) -> Result<bool> {
        let mut state = self.write_state()?;
        if let Some(Ref {
            target: RefTarget::Symbolic(current),
            ..
        }) = state.refs.get(HEAD)
        {
            if current == name {
                return Err(RefError::DeleteCurrentBranch {
                    name: name.to_string(),
                });
            }
        }
        let existed = state.refs.remove(name).is_some();
        if existed {
            debug!(name, "ref deleted");
        }
        Ok(existed)
    }

    /// Replace the transient refs reported by [`RefDatabase::additional_refs`].
    pub fn set_additional_refs(&self, refs: Vec<Ref>) -> Result<()> {
        self.write_state()?.additional = refs;
        Ok(())
    }
}

/// Follow symbolic refs from `name` to the name of the ref an update
/// should land on.
fn leaf_name(refs: &BTreeMap<String, Ref>, name: &str) -> Result<String> {
    let mut current = name.to_string();
    for _ in 0..=MAX_SYMBOLIC_DEPTH {
        match refs.get(&current).map(|r| &r.target) {
            Some(RefTarget::Symbolic(target)) => current = target.clone(),
            _ => return Ok(current),
        }
    }
    Err(RefError::SymbolicLoop {
        name: name.to_string(),
    })
}

impl RefDatabase for InMemoryRefDatabase {
    fn refs(&self) -> Result<BTreeMap<String, Ref>> {
        Ok(self.read_state()?.refs.clone())
    }

    fn additional_refs(&self) -> Result<Vec<Ref>> {
        Ok(self.read_state()?.additional.clone())
    }

    fn all_refs(&self) -> Result<BTreeMap<String, Ref>> {
        let state = self.read_state()?;
        let mut all = state.refs.clone();
        for r in &state.additional {
            all.insert(r.name.clone(), r.clone());
        }
        Ok(all)
    }

    fn exact_ref(&self, name: &str) -> Result<Option<Ref>> {
        Ok(self.read_state()?.refs.get(name).cloned())
    }

    fn reflog(&self, name: &str) -> Result<Vec<ReflogEntry>> {
        let state = self.read_state()?;
        Ok(state
            .logs
            .get(name)
            .map(|log| log.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn reflog_names(&self) -> Result<Vec<String>> {
        Ok(self.read_state()?.logs.keys().cloned().collect())
    }

    fn pack_refs(&self) -> Result<usize> {
        let mut state = self.write_state()?;
        let mut packed = 0;
        for r in state.refs.values_mut() {
            if r.is_symbolic() || !r.name.starts_with(REFS_PREFIX) {
                continue;
            }
            if r.storage != RefStorage::Packed {
                r.storage = RefStorage::Packed;
                packed += 1;
            }
        }
        debug!(packed, "packed refs");
        Ok(packed)
    }
}
