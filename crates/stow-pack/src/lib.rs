//! Pack files and the pack-aware object database for stow.
//!
//! Provides zstd-compressed, CRC-checked pack files, their indexes and
//! optional reachability bitmaps, plus the database abstraction garbage
//! collection drives to swap one pack set for another.
//!
//! # Architecture
//!
//! - **Pack file** (`.pack`): concatenated compressed objects with a BLAKE3 checksum
//! - **Pack index** (`.idx`): fan-out table + sorted IDs for O(log n) lookups
//! - **Bitmap index** (`.bitmap`): per-commit reachability over index positions
//! - **PackWriter**: walks a want/have closure, honoring exclusion sets
//! - **PackReader**: random-access reading, including raw entry reuse
//! - **ObjectDatabase**: packs + loose objects, changed through a
//!   [`PackTransaction`]; realized by [`InMemoryObjectDatabase`] (atomic,
//!   race-checked commits) and [`ObjectDirectory`] (rename into a pack
//!   directory)

pub mod bitmap;
pub mod config;
pub mod database;
pub mod description;
pub mod directory;
pub mod entry;
pub mod error;
pub mod index;
pub mod membership;
pub mod memory;
pub mod progress;
pub mod reader;
pub mod stats;
pub mod writer;

pub use bitmap::BitmapIndex;
pub use config::PackConfig;
pub use database::{CommitOutcome, ObjectDatabase, Pack, PackFiles, PackTransaction};
pub use description::{PackDescription, PackExt, PackSource};
pub use directory::ObjectDirectory;
pub use entry::{PackEntry, RawEntry};
pub use error::{PackError, PackResult};
pub use index::{PackIndex, INDEX_VERSION};
pub use membership::{ObjectIdSet, UnionSet};
pub use memory::InMemoryObjectDatabase;
pub use progress::{CancelFlag, NullProgressMonitor, ProgressMonitor, TracingProgressMonitor};
pub use reader::PackReader;
pub use stats::PackStatistics;
pub use writer::PackWriter;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use stow_store::{Blob, ObjectKind, ObjectReader, ObjectStore, StoredObject};

    fn make_blob(content: &[u8]) -> StoredObject {
        StoredObject::new(ObjectKind::Blob, content.to_vec())
    }

    /// Two sequential passes share nothing when the first pack's index is
    /// excluded from the second writer.
    #[test]
    fn index_excludes_objects_from_next_pass() {
        let db = InMemoryObjectDatabase::new();
        let shared = db.loose_store().write(&make_blob(b"shared")).unwrap();
        let only = db.loose_store().write(&make_blob(b"only second")).unwrap();

        let mut first = PackWriter::new(PackConfig::default());
        first.add_object(shared, db.read(&shared).unwrap().unwrap());
        let (_, index) = first.write_pack().unwrap();

        let mut second = PackWriter::new(PackConfig::default());
        second.exclude_objects(Arc::new(index));
        second
            .prepare_pack(
                &db,
                &HashSet::from([shared, only]),
                &HashSet::new(),
                &mut NullProgressMonitor,
            )
            .unwrap();
        assert_eq!(second.object_ids(), vec![only]);
    }

    #[test]
    fn raw_reuse_across_databases() {
        let source = InMemoryObjectDatabase::new();
        let obj = Blob::new(vec![0xAB; 10_000]).to_stored_object();
        let id = obj.compute_id();
        source.insert_pack(&[obj.clone()], PackSource::Insert).unwrap();
        let raw = source.packs().unwrap()[0].reader.read_raw(&id).unwrap().unwrap();
        // Highly repetitive data compresses well below its raw size.
        assert!(raw.compressed.len() < 10_000);

        let mut writer = PackWriter::new(PackConfig::default());
        writer.add_raw(raw);
        let mut desc = PackDescription::new(
            writer.compute_name(PackSource::UnreachableGarbage),
            PackSource::UnreachableGarbage,
        );
        let (pack, index) = writer.write_pack().unwrap();
        let files = PackFiles {
            pack,
            index: index.to_bytes(),
            bitmap: None,
        };
        files.describe(&mut desc);

        let target = InMemoryObjectDatabase::new();
        let mut tx = target.begin_transaction(&[]).unwrap();
        tx.write_pack(&desc, files).unwrap();
        assert_eq!(tx.commit(&[]).unwrap(), CommitOutcome::Committed);
        assert_eq!(target.read(&id).unwrap(), Some(obj));
    }

    #[test]
    fn directory_and_memory_agree_on_names() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ObjectDirectory::open(tmp.path()).unwrap();
        let mem = InMemoryObjectDatabase::new();
        let objects = [make_blob(b"x"), make_blob(b"y")];
        let a = dir.insert_pack(&objects, PackSource::Gc).unwrap();
        let b = mem.insert_pack(&objects, PackSource::Gc).unwrap();
        assert_eq!(a.name(), b.name());
        assert_eq!(a.file_size(PackExt::Pack), b.file_size(PackExt::Pack));
    }
}
