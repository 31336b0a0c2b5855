use std::sync::Arc;

use stow_store::{LooseObjects, ObjectReader, StoreError, StoreResult, StoredObject};
use stow_types::ObjectId;
use tracing::debug;

use crate::bitmap::BitmapIndex;
use crate::config::PackConfig;
use crate::description::{PackDescription, PackExt, PackSource};
use crate::error::{PackError, PackResult};
use crate::index::PackIndex;
use crate::reader::PackReader;
use crate::writer::PackWriter;

/// One pack visible to readers.
#[derive(Clone, Debug)]
pub struct Pack {
    pub description: PackDescription,
    pub reader: Arc<PackReader>,
    pub bitmap: Option<Arc<BitmapIndex>>,
}

impl Pack {
    pub fn name(&self) -> &str {
        self.description.name()
    }
}

/// The encoded files of a pack about to be installed.
#[derive(Clone, Debug)]
pub struct PackFiles {
    pub pack: Vec<u8>,
    pub index: Vec<u8>,
    pub bitmap: Option<Vec<u8>>,
}

impl PackFiles {
    /// Encode `objects` as a standalone pack with default settings.
    pub fn encode(
        objects: &[StoredObject],
        source: PackSource,
    ) -> PackResult<(PackDescription, PackFiles)> {
        let mut writer = PackWriter::new(PackConfig::default());
        for object in objects {
            writer.add_object(object.compute_id(), object.clone());
        }
        let mut description = PackDescription::new(writer.compute_name(source), source);
        let (pack, index) = writer.write_pack()?;
        let files = PackFiles {
            pack,
            index: index.to_bytes(),
            bitmap: None,
        };
        files.describe(&mut description);
        description.set_object_count(index.object_count() as u64);
        description.set_statistics(writer.statistics().clone());
        Ok((description, files))
    }

    /// Record this pack's file sizes on `description`.
    pub fn describe(&self, description: &mut PackDescription) {
        description.set_file_size(PackExt::Pack, self.pack.len() as u64);
        description.set_file_size(PackExt::Index, self.index.len() as u64);
        match &self.bitmap {
            Some(bitmap) => description.set_file_size(PackExt::Bitmap, bitmap.len() as u64),
            None => description.clear_file(PackExt::Bitmap),
        }
    }
}

/// Result of committing a pack transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// New packs are visible and retired packs are gone.
    Committed,
    /// The pack set changed since the transaction began. Nothing was
    /// installed or removed.
    Raced,
}

/// A pending transition of the pack set.
///
/// Packs written through a transaction are invisible until [`commit`]
/// succeeds. Dropping a transaction without committing is equivalent to
/// [`rollback`].
///
/// [`commit`]: PackTransaction::commit
/// [`rollback`]: PackTransaction::rollback
pub trait PackTransaction {
    /// Stage the files of one new pack.
    fn write_pack(&mut self, description: &PackDescription, files: PackFiles) -> PackResult<()>;

    /// Install every staged pack, then remove `retired`.
    fn commit(self: Box<Self>, retired: &[PackDescription]) -> PackResult<CommitOutcome>;

    /// Discard every staged pack.
    fn rollback(self: Box<Self>);
}

/// Packs plus loose objects, with a way to change the pack set.
///
/// Two realizations exist: [`InMemoryObjectDatabase`] commits atomically
/// and rejects transitions that raced another writer, and
/// [`ObjectDirectory`] installs packs by renaming files into a pack
/// directory.
///
/// [`InMemoryObjectDatabase`]: crate::InMemoryObjectDatabase
/// [`ObjectDirectory`]: crate::ObjectDirectory
pub trait ObjectDatabase: Send + Sync {
    /// Current packs, in lookup order.
    fn packs(&self) -> PackResult<Vec<Pack>>;

    /// Reader over packs and loose objects.
    fn reader(&self) -> &dyn ObjectReader;

    /// The loose object store.
    fn loose(&self) -> &dyn LooseObjects;

    /// Drop cached pack listings so the next call rescans.
    fn clear_cache(&self);

    /// Whether unreachable objects may be kept in a garbage pack.
    fn supports_garbage_packs(&self) -> bool;

    /// Start a transition from the pack set `expected`.
    fn begin_transaction(
        &self,
        expected: &[PackDescription],
    ) -> PackResult<Box<dyn PackTransaction + '_>>;

    /// Write `objects` as one new pack and commit it.
    fn insert_pack(&self, objects: &[StoredObject], source: PackSource) -> PackResult<PackDescription> {
        let before: Vec<PackDescription> =
            self.packs()?.into_iter().map(|p| p.description).collect();
        let (description, files) = PackFiles::encode(objects, source)?;

        let mut tx = self.begin_transaction(&before)?;
        tx.write_pack(&description, files)?;
        match tx.commit(&[])? {
            CommitOutcome::Committed => {
                debug!(pack = %description, objects = objects.len(), "inserted pack");
                Ok(description)
            }
            CommitOutcome::Raced => Err(PackError::Internal(format!(
                "pack set changed while inserting {description}"
            ))),
        }
    }
}

/// Build an in-memory [`Pack`] from encoded files.
pub(crate) fn load_pack(description: PackDescription, files: &PackFiles) -> PackResult<Pack> {
    let index = PackIndex::from_bytes(&files.index)?;
    let bitmap = match &files.bitmap {
        Some(bytes) => Some(Arc::new(BitmapIndex::from_bytes(bytes)?)),
        None => None,
    };
    let reader = PackReader::from_bytes(files.pack.clone(), index)?;
    Ok(Pack {
        description,
        reader: Arc::new(reader),
        bitmap,
    })
}

/// Look an object up in packs first, then among loose objects.
pub(crate) fn read_from(
    packs: &[Pack],
    loose: &dyn ObjectReader,
    id: &ObjectId,
) -> StoreResult<Option<StoredObject>> {
    for pack in packs {
        if pack.reader.contains(id) {
            return pack.reader.read_object(id).map_err(|e| StoreError::CorruptObject {
                id: *id,
                reason: format!("in {}: {e}", pack.name()),
            });
        }
    }
    loose.read(id)
}
