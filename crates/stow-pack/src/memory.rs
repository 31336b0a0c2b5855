use std::collections::BTreeSet;
use std::sync::RwLock;

use stow_store::{InMemoryObjectStore, LooseObjects, ObjectReader, StoreResult, StoredObject};
use stow_types::ObjectId;
use tracing::{debug, warn};

use crate::database::{
    load_pack, read_from, CommitOutcome, ObjectDatabase, Pack, PackFiles, PackTransaction,
};
use crate::description::{PackDescription, PackExt};
use crate::error::PackResult;

/// Object database held entirely in memory.
///
/// Pack-set transitions are atomic: a commit installs new packs and removes
/// retired ones under one write lock, and is refused if the pack set no
/// longer matches the one the transaction started from.
pub struct InMemoryObjectDatabase {
    packs: RwLock<Vec<Pack>>,
    loose: InMemoryObjectStore,
    garbage_packs: bool,
}

impl InMemoryObjectDatabase {
    pub fn new() -> Self {
        Self {
            packs: RwLock::new(Vec::new()),
            loose: InMemoryObjectStore::new(),
            garbage_packs: true,
        }
    }

    /// Enable or disable unreachable-garbage packs.
    pub fn with_garbage_packs(mut self, enabled: bool) -> Self {
        self.garbage_packs = enabled;
        self
    }

    /// The loose object store, for writes and mtime control.
    pub fn loose_store(&self) -> &InMemoryObjectStore {
        &self.loose
    }

    /// Names of the current packs, in lookup order.
    pub fn pack_names(&self) -> Vec<String> {
        self.packs
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Protect a pack from being rebuilt or deleted.
    pub fn mark_keep(&self, name: &str) -> bool {
        let mut packs = self.packs.write().expect("lock poisoned");
        match packs.iter_mut().find(|p| p.name() == name) {
            Some(pack) => {
                pack.description.set_file_size(PackExt::Keep, 0);
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryObjectDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectReader for InMemoryObjectDatabase {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let packs = self.packs.read().expect("lock poisoned");
        read_from(&packs, &self.loose, id)
    }
}

impl ObjectDatabase for InMemoryObjectDatabase {
    fn packs(&self) -> PackResult<Vec<Pack>> {
        Ok(self.packs.read().expect("lock poisoned").clone())
    }

    fn reader(&self) -> &dyn ObjectReader {
        self
    }

    fn loose(&self) -> &dyn LooseObjects {
        &self.loose
    }

    fn clear_cache(&self) {}

    fn supports_garbage_packs(&self) -> bool {
        self.garbage_packs
    }

    fn begin_transaction(
        &self,
        expected: &[PackDescription],
    ) -> PackResult<Box<dyn PackTransaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            db: self,
            expected: expected.iter().map(|d| d.name().to_string()).collect(),
            staged: Vec::new(),
        }))
    }
}

impl std::fmt::Debug for InMemoryObjectDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectDatabase")
            .field("packs", &self.pack_names())
            .field("loose", &self.loose)
            .finish()
    }
}

struct MemoryTransaction<'a> {
    db: &'a InMemoryObjectDatabase,
    expected: BTreeSet<String>,
    staged: Vec<Pack>,
}

impl PackTransaction for MemoryTransaction<'_> {
    fn write_pack(&mut self, description: &PackDescription, files: PackFiles) -> PackResult<()> {
        self.staged.push(load_pack(description.clone(), &files)?);
        Ok(())
    }

    fn commit(self: Box<Self>, retired: &[PackDescription]) -> PackResult<CommitOutcome> {
        let db = self.db;
        let mut packs = db.packs.write().expect("lock poisoned");
        let current: BTreeSet<String> = packs.iter().map(|p| p.name().to_string()).collect();
        if current != self.expected {
            debug!(
                expected = self.expected.len(),
                current = current.len(),
                "pack set changed, refusing commit"
            );
            return Ok(CommitOutcome::Raced);
        }

        let retired: BTreeSet<&str> = retired.iter().map(|d| d.name()).collect();
        let mut next: Vec<Pack> = self
            .staged
            .into_iter()
            .filter(|p| !current.contains(p.name()))
            .collect();
        for pack in packs.drain(..) {
            if retired.contains(pack.name()) {
                if pack.description.is_keep() {
                    warn!(pack = %pack.name(), "not retiring kept pack");
                } else {
                    debug!(pack = %pack.name(), "retired pack");
                    continue;
                }
            }
            next.push(pack);
        }
        *packs = next;
        Ok(CommitOutcome::Committed)
    }

    fn rollback(self: Box<Self>) {
        debug!(staged = self.staged.len(), "discarding staged packs");
    }
}
