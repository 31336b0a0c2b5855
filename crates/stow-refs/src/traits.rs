//! The [`RefDatabase`] trait defining the reference storage interface.
//!
//! Garbage collection only reads refs: it snapshots them, reads reflogs and
//! asks the database to pack loose refs. Writers live on the concrete
//! backends.

use std::collections::BTreeMap;

use stow_types::ObjectId;

use crate::error::{RefError, Result};
use crate::types::{Ref, RefTarget, ReflogEntry};

/// How many symbolic hops [`RefDatabase::resolve`] follows.
pub const MAX_SYMBOLIC_DEPTH: usize = 5;

/// Storage backend for named references and their reflogs.
///
/// Implementations must be thread-safe (`Send + Sync`). The namespace follows
/// a hierarchical layout:
///
/// - `refs/heads/*` for branches
/// - `refs/tags/*` for tags
/// - `refs/remotes/{remote}/*` for remote tracking refs
/// - all-caps pseudo refs (`HEAD`, `MERGE_HEAD`) at the top level
pub trait RefDatabase: Send + Sync {
    /// Every ref, symbolic ones included, keyed by name.
    fn refs(&self) -> Result<BTreeMap<String, Ref>>;

    /// Transient refs that are not part of the namespace, such as a
    /// pending merge head.
    fn additional_refs(&self) -> Result<Vec<Ref>>;

    /// [`refs`](Self::refs) plus [`additional_refs`](Self::additional_refs),
    /// read as one snapshot.
    fn all_refs(&self) -> Result<BTreeMap<String, Ref>> {
        let mut all = self.refs()?;
        for r in self.additional_refs()? {
            all.insert(r.name.clone(), r);
        }
        Ok(all)
    }

    /// Read a single ref by exact name, without following symbolic refs.
    fn exact_ref(&self, name: &str) -> Result<Option<Ref>>;

    /// Follow symbolic refs from `name` to an object id.
    ///
    /// Returns `Ok(None)` when the chain ends at a missing or unborn ref.
    fn resolve(&self, name: &str) -> Result<Option<ObjectId>> {
        let mut current = name.to_string();
        for _ in 0..=MAX_SYMBOLIC_DEPTH {
            let Some(r) = self.exact_ref(&current)? else {
                return Ok(None);
            };
            match r.target {
                RefTarget::Object { id, .. } => {
                    return Ok(if id.is_null() { None } else { Some(id) });
                }
                RefTarget::Symbolic(target) => current = target,
            }
        }
        Err(RefError::SymbolicLoop {
            name: name.to_string(),
        })
    }

    /// The reflog of `name`, newest entry first. Empty when the ref has no
    /// log. Logs outlive their refs.
    fn reflog(&self, name: &str) -> Result<Vec<ReflogEntry>>;

    /// Names of every ref that has a reflog, including deleted refs.
    fn reflog_names(&self) -> Result<Vec<String>>;

    /// Move loose refs into packed form. Returns how many refs were packed.
    fn pack_refs(&self) -> Result<usize>;

    /// Drop any cached ref state so the next read sees the backing store.
    fn clear_cache(&self) {}
}
