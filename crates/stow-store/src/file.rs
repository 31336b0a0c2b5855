use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use stow_types::ObjectId;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::loose::{LooseObject, LooseObjects};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::{ObjectReader, ObjectStore};

const COMPRESSION_LEVEL: i32 = 3;

/// Loose object store backed by a fan-out directory.
///
/// Each object lives in `<root>/<first two hex chars>/<remaining 62 hex>`.
/// A file holds one type byte followed by the zstd-compressed object data.
/// Writes go through a temporary file in the fan-out directory that is then
/// renamed into place, so readers never observe a partial object.
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    /// Open (creating if necessary) a loose object directory.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory holding the fan-out subdirectories.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file that holds (or would hold) `id`.
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        let (dir, file) = id.loose_path_parts();
        self.root.join(dir).join(file)
    }

    /// Set the modification time of a loose object.
    pub fn touch(&self, id: &ObjectId, when: DateTime<Utc>) -> StoreResult<()> {
        let file = fs::File::options()
            .write(true)
            .open(self.object_path(id))
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => StoreError::NotFound(*id),
                _ => StoreError::Io(e),
            })?;
        file.set_modified(SystemTime::from(when))?;
        Ok(())
    }

    fn decode(id: &ObjectId, raw: &[u8]) -> StoreResult<StoredObject> {
        let (&type_byte, body) = raw.split_first().ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: "empty object file".into(),
        })?;
        let kind = ObjectKind::from_type_byte(type_byte).ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: format!("unknown type byte {type_byte}"),
        })?;
        let data = zstd::decode_all(body).map_err(|e| StoreError::CorruptObject {
            id: *id,
            reason: format!("decompression failed: {e}"),
        })?;
        let object = StoredObject::new(kind, data);
        let computed = object.compute_id();
        if computed != *id {
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(object)
    }
}

fn parse_loose_path(dir: &str, file: &str) -> Option<ObjectId> {
    if dir.len() != 2 || file.len() != stow_types::OBJECT_ID_HEX_LEN - 2 {
        return None;
    }
    ObjectId::from_hex(&format!("{dir}{file}")).ok()
}

impl ObjectReader for FileObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let raw = match fs::read(self.object_path(id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::decode(id, &raw).map(Some)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).is_file())
    }
}

impl ObjectStore for FileObjectStore {
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let path = self.object_path(&id);
        if path.is_file() {
            return Ok(id);
        }
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        let compressed = zstd::encode_all(object.data.as_slice(), COMPRESSION_LEVEL)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&[object.kind.type_byte()])?;
        tmp.write_all(&compressed)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        trace!(id = %id.short_hex(), kind = %object.kind, "wrote loose object");
        Ok(id)
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        match fs::remove_file(self.object_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl LooseObjects for FileObjectStore {
    fn scan(&self) -> StoreResult<Vec<LooseObject>> {
        let mut found = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| {
                StoreError::Io(e.into_io_error().unwrap_or_else(|| ErrorKind::Other.into()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let dir = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str());
            let file = entry.file_name().to_str();
            let Some(id) = dir.zip(file).and_then(|(d, f)| parse_loose_path(d, f)) else {
                debug!(path = %entry.path().display(), "ignoring non-object file");
                continue;
            };
            let meta = entry.metadata().map_err(|e| {
                StoreError::Io(e.into_io_error().unwrap_or_else(|| ErrorKind::Other.into()))
            })?;
            found.push(LooseObject {
                id,
                modified: DateTime::<Utc>::from(meta.modified()?),
                size: meta.len(),
            });
        }
        Ok(found)
    }
}

impl std::fmt::Debug for FileObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileObjectStore")
            .field("root", &self.root)
            .finish()
    }
}
