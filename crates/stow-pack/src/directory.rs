use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use stow_store::{FileObjectStore, LooseObjects, ObjectReader, StoreError, StoreResult, StoredObject};
use stow_types::ObjectId;
use tempfile::TempPath;
use tracing::{debug, warn};

use crate::bitmap::BitmapIndex;
use crate::database::{read_from, CommitOutcome, ObjectDatabase, Pack, PackFiles, PackTransaction};
use crate::description::{PackDescription, PackExt};
use crate::error::{PackError, PackResult};
use crate::reader::PackReader;

/// Object database laid out on disk.
///
/// Loose objects live in the fan-out directories of `objects/`; packs live
/// in `objects/pack/` as `<name>.pack`, `<name>.idx`, optionally
/// `<name>.bitmap`, and a `<name>.keep` marker for kept packs. New packs are
/// written to temporary files in the pack directory and renamed into place
/// on commit, pack file first, then index, then bitmap.
pub struct ObjectDirectory {
    pack_dir: PathBuf,
    loose: FileObjectStore,
    cache: RwLock<Option<Vec<Pack>>>,
    garbage_packs: bool,
}

impl ObjectDirectory {
    /// Open (creating if necessary) an `objects/` directory.
    pub fn open(objects_dir: impl AsRef<Path>) -> PackResult<Self> {
        let objects_dir = objects_dir.as_ref();
        let pack_dir = objects_dir.join("pack");
        fs::create_dir_all(&pack_dir)?;
        Ok(Self {
            loose: FileObjectStore::open(objects_dir)?,
            pack_dir,
            cache: RwLock::new(None),
            garbage_packs: true,
        })
    }

    /// Enable or disable unreachable-garbage packs.
    pub fn with_garbage_packs(mut self, enabled: bool) -> Self {
        self.garbage_packs = enabled;
        self
    }

    pub fn pack_dir(&self) -> &Path {
        &self.pack_dir
    }

    pub fn loose_store(&self) -> &FileObjectStore {
        &self.loose
    }

    /// Path of one file of a pack.
    pub fn pack_file(&self, description: &PackDescription, ext: PackExt) -> PathBuf {
        self.pack_dir.join(description.file_name(ext))
    }

    /// Protect a pack from being rebuilt or deleted.
    pub fn mark_keep(&self, description: &PackDescription) -> PackResult<()> {
        fs::write(self.pack_file(description, PackExt::Keep), b"keep\n")?;
        self.clear_cache();
        Ok(())
    }

    /// Forget a pack so that no reader holds it.
    pub fn close_pack(&self, name: &str) {
        let mut cache = self.cache.write().expect("lock poisoned");
        if let Some(packs) = cache.as_mut() {
            packs.retain(|p| p.name() != name);
        }
    }

    /// Close and delete a pack.
    ///
    /// The pack file goes first and its failure is reported. Index and
    /// bitmap removal failures are only logged: without the pack file they
    /// are inert.
    pub fn delete_pack(&self, description: &PackDescription) -> PackResult<()> {
        self.close_pack(description.name());
        match fs::remove_file(self.pack_file(description, PackExt::Pack)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        for ext in [PackExt::Index, PackExt::Bitmap] {
            let path = self.pack_file(description, ext);
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "could not delete pack file");
                }
            }
        }
        debug!(pack = %description, "deleted pack");
        Ok(())
    }

    fn scan_packs(&self) -> PackResult<Vec<Pack>> {
        let mut files: BTreeMap<String, BTreeMap<PackExt, (u64, SystemTime)>> = BTreeMap::new();
        for entry in fs::read_dir(&self.pack_dir)? {
            let entry = entry?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some((name, ext)) = PackDescription::parse_file_name(&file_name) else {
                continue;
            };
            let meta = entry.metadata()?;
            files
                .entry(name)
                .or_default()
                .insert(ext, (meta.len(), meta.modified()?));
        }

        let mut packs = Vec::new();
        for (name, exts) in files {
            let Some(&(_, modified)) = exts.get(&PackExt::Pack) else {
                continue;
            };
            if !exts.contains_key(&PackExt::Index) {
                warn!(pack = %name, "skipping pack without index");
                continue;
            }
            let mut description = PackDescription::from_name(&name)?;
            for (ext, (size, _)) in &exts {
                description.set_file_size(*ext, *size);
            }
            let reader = match PackReader::open(&self.pack_file(&description, PackExt::Pack)) {
                Ok(reader) => reader,
                Err(e) => {
                    warn!("skipping corrupt pack {:?}: {}", name, e);
                    continue;
                }
            };
            description.set_object_count(reader.object_count() as u64);
            let bitmap = if exts.contains_key(&PackExt::Bitmap) {
                self.load_bitmap(&description, &reader)
            } else {
                None
            };
            packs.push((
                modified,
                Pack {
                    description,
                    reader: Arc::new(reader),
                    bitmap,
                },
            ));
        }
        // Newest first, so recently written packs are searched first.
        packs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name().cmp(b.1.name())));
        Ok(packs.into_iter().map(|(_, p)| p).collect())
    }

    fn load_bitmap(&self, description: &PackDescription, reader: &PackReader) -> Option<Arc<BitmapIndex>> {
        let path = self.pack_file(description, PackExt::Bitmap);
        let loaded = fs::read(&path)
            .map_err(PackError::from)
            .and_then(|bytes| BitmapIndex::from_bytes(&bytes));
        match loaded {
            Ok(bitmap) if bitmap.matches(reader.index()) => Some(Arc::new(bitmap)),
            Ok(_) => {
                warn!(path = %path.display(), "ignoring bitmap for a different pack");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable bitmap");
                None
            }
        }
    }
}

impl ObjectReader for ObjectDirectory {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let packs = self
            .packs()
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))?;
        read_from(&packs, &self.loose, id)
    }
}

impl ObjectDatabase for ObjectDirectory {
    fn packs(&self) -> PackResult<Vec<Pack>> {
        if let Some(packs) = self.cache.read().expect("lock poisoned").as_ref() {
            return Ok(packs.clone());
        }
        let packs = self.scan_packs()?;
        *self.cache.write().expect("lock poisoned") = Some(packs.clone());
        Ok(packs)
    }

    fn reader(&self) -> &dyn ObjectReader {
        self
    }

    fn loose(&self) -> &dyn LooseObjects {
        &self.loose
    }

    fn clear_cache(&self) {
        *self.cache.write().expect("lock poisoned") = None;
    }

    fn supports_garbage_packs(&self) -> bool {
        self.garbage_packs
    }

    fn begin_transaction(
        &self,
        _expected: &[PackDescription],
    ) -> PackResult<Box<dyn PackTransaction + '_>> {
        Ok(Box::new(DirectoryTransaction {
            dir: self,
            staged: Vec::new(),
        }))
    }
}

impl std::fmt::Debug for ObjectDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDirectory")
            .field("pack_dir", &self.pack_dir)
            .finish()
    }
}

struct StagedPack {
    description: PackDescription,
    /// Temporary files in install order. Dropping them deletes them.
    files: Vec<(PackExt, TempPath)>,
}

struct DirectoryTransaction<'a> {
    dir: &'a ObjectDirectory,
    staged: Vec<StagedPack>,
}

fn write_temp(pack_dir: &Path, data: &[u8]) -> PackResult<TempPath> {
    let mut tmp = tempfile::Builder::new()
        .prefix("gc_")
        .suffix(".pack_tmp")
        .tempfile_in(pack_dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    Ok(tmp.into_temp_path())
}

/// Flush directory entries so completed renames survive a crash.
#[cfg(unix)]
fn sync_dir(path: &Path) -> PackResult<()> {
    fs::File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> PackResult<()> {
    Ok(())
}

/// Rename one staged pack into place, pack file first.
fn install(dir: &ObjectDirectory, staged: StagedPack) -> PackResult<()> {
    for (ext, temp) in staged.files {
        let target = dir.pack_file(&staged.description, ext);
        let Err(failed) = temp.persist(&target) else {
            continue;
        };
        if ext == PackExt::Pack {
            return Err(PackError::Io(failed.error));
        }
        // The pack file is already in place. Leave the orphan next to its
        // target for manual recovery.
        let mut aside = target.clone().into_os_string();
        aside.push(".new");
        let aside = PathBuf::from(aside);
        let stranded = match failed.path.persist(&aside) {
            Ok(()) => aside,
            Err(retry) => match retry.path.keep() {
                Ok(path) => path,
                Err(kept) => kept.path.to_path_buf(),
            },
        };
        return Err(PackError::Internal(format!(
            "cannot rename {} to {}: {}",
            stranded.display(),
            target.display(),
            failed.error
        )));
    }
    debug!(pack = %staged.description, "installed pack");
    Ok(())
}

impl PackTransaction for DirectoryTransaction<'_> {
    fn write_pack(&mut self, description: &PackDescription, files: PackFiles) -> PackResult<()> {
        let pack_dir = &self.dir.pack_dir;
        let mut temps = vec![
            (PackExt::Pack, write_temp(pack_dir, &files.pack)?),
            (PackExt::Index, write_temp(pack_dir, &files.index)?),
        ];
        if let Some(bitmap) = &files.bitmap {
            temps.push((PackExt::Bitmap, write_temp(pack_dir, bitmap)?));
        }
        self.staged.push(StagedPack {
            description: description.clone(),
            files: temps,
        });
        Ok(())
    }

    fn commit(self: Box<Self>, retired: &[PackDescription]) -> PackResult<CommitOutcome> {
        let DirectoryTransaction { dir, staged } = *self;
        let new_names: BTreeSet<String> = staged
            .iter()
            .map(|s| s.description.name().to_string())
            .collect();
        for pack in staged {
            if let Err(e) = install(dir, pack).and_then(|()| sync_dir(&dir.pack_dir)) {
                dir.clear_cache();
                return Err(e);
            }
        }
        dir.clear_cache();

        for old in retired {
            if new_names.contains(old.name()) {
                debug!(pack = %old, "keeping pack rewritten under the same name");
                continue;
            }
            if old.is_keep() || dir.pack_file(old, PackExt::Keep).exists() {
                debug!(pack = %old, "keeping pack marked keep");
                continue;
            }
            if let Err(e) = dir.delete_pack(old) {
                warn!(pack = %old, error = %e, "could not delete retired pack");
            }
        }
        dir.clear_cache();
        Ok(CommitOutcome::Committed)
    }

    fn rollback(self: Box<Self>) {
        debug!(staged = self.staged.len(), "removing staged pack files");
    }
}
