use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use stow_store::{ObjectKind, ObjectReader, ObjectWalk, StoredObject};
use stow_types::{ContentHasher, ObjectId};
use tracing::debug;

use crate::bitmap::BitmapIndex;
use crate::config::PackConfig;
use crate::description::PackSource;
use crate::entry::{PackEntry, RawEntry};
use crate::error::{PackError, PackResult};
use crate::index::PackIndex;
use crate::membership::{ObjectIdSet, UnionSet};
use crate::progress::ProgressMonitor;
use crate::stats::PackStatistics;

pub(crate) const PACK_MAGIC: &[u8; 4] = b"STWP";
pub(crate) const PACK_VERSION: u32 = 1;

/// Builds one pack file.
///
/// Objects enter the writer either through [`prepare_pack`], which walks
/// the closure of a want set minus a have set, or one at a time through
/// [`add_object`] / [`add_raw`]. Objects contained in any excluded set are
/// never added, and each id is added at most once.
///
/// [`prepare_pack`]: PackWriter::prepare_pack
/// [`add_object`]: PackWriter::add_object
/// [`add_raw`]: PackWriter::add_raw
pub struct PackWriter {
    config: PackConfig,
    tag_targets: HashSet<ObjectId>,
    excludes: UnionSet,
    entries: Vec<PackEntry>,
    ids: HashSet<ObjectId>,
    stats: PackStatistics,
    bitmap_eligible: bool,
    index: Option<PackIndex>,
}

impl PackWriter {
    pub fn new(config: PackConfig) -> Self {
        Self {
            config,
            tag_targets: HashSet::new(),
            excludes: UnionSet::new(),
            entries: Vec::new(),
            ids: HashSet::new(),
            stats: PackStatistics::default(),
            bitmap_eligible: false,
            index: None,
        }
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// Objects to place first in the pack and to consider for bitmaps.
    pub fn set_tag_targets(&mut self, targets: impl IntoIterator<Item = ObjectId>) {
        self.tag_targets = targets.into_iter().collect();
    }

    /// Never add objects contained in `set`.
    pub fn exclude_objects(&mut self, set: Arc<dyn ObjectIdSet>) {
        self.excludes.push(set);
    }

    pub fn is_excluded(&self, id: &ObjectId) -> bool {
        self.excludes.contains(id)
    }

    /// Add every object reachable from `want` but not from `have`.
    ///
    /// A want object that cannot be read fails the whole preparation.
    pub fn prepare_pack(
        &mut self,
        reader: &dyn ObjectReader,
        want: &HashSet<ObjectId>,
        have: &HashSet<ObjectId>,
        pm: &mut dyn ProgressMonitor,
    ) -> PackResult<()> {
        let mut walk = ObjectWalk::new(reader);
        let mut have: Vec<ObjectId> = have.iter().copied().collect();
        have.sort();
        for id in &have {
            walk.mark_uninteresting(*id)?;
        }
        let mut want: Vec<ObjectId> = want.iter().copied().collect();
        want.sort();
        for id in want {
            walk.mark_start(id);
        }

        pm.begin_task("Counting objects", None);
        while let Some((id, object)) = walk.next_object()? {
            if pm.is_cancelled() {
                pm.end_task();
                return Err(PackError::Cancelled);
            }
            if self.add_object(id, object) {
                pm.update(1);
            }
        }
        pm.end_task();
        self.bitmap_eligible = have.is_empty();
        debug!(objects = self.entries.len(), "prepared pack");
        Ok(())
    }

    /// Queue an object. Returns `false` if it was excluded or already queued.
    pub fn add_object(&mut self, id: ObjectId, object: StoredObject) -> bool {
        if !self.admit(id) {
            return false;
        }
        self.entries.push(PackEntry::Full { id, object });
        true
    }

    /// Queue a pre-encoded entry. Returns `false` if excluded or already queued.
    pub fn add_raw(&mut self, raw: RawEntry) -> bool {
        if !self.admit(raw.id) {
            return false;
        }
        self.entries.push(PackEntry::Raw(raw));
        true
    }

    fn admit(&mut self, id: ObjectId) -> bool {
        self.index = None;
        !self.excludes.contains(&id) && self.ids.insert(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.ids.contains(id)
    }

    pub fn object_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted ids of the queued objects.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.ids.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Name of the pack this writer would produce for `source`.
    ///
    /// Identical content from the same source always yields the same name.
    pub fn compute_name(&self, source: PackSource) -> String {
        let ids = self.object_ids();
        let hash = ContentHasher::PACK.hash_parts(
            std::iter::once(source.tag().as_bytes())
                .chain(ids.iter().map(|id| id.as_bytes().as_slice())),
        );
        format!("pack-{}-{}", hash.to_hex(), source.tag())
    }

    /// Serialize the queued objects into pack bytes and an index.
    ///
    /// Tag targets are written first; the remaining objects keep the order
    /// in which they were added.
    pub fn write_pack(&mut self) -> PackResult<(Vec<u8>, PackIndex)> {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&i| !self.tag_targets.contains(&self.entries[i].id()));

        let mut pack_data = Vec::new();
        let mut index_entries = Vec::with_capacity(self.entries.len());
        let mut stats = PackStatistics::default();

        pack_data.extend_from_slice(PACK_MAGIC);
        pack_data.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack_data.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        for i in order {
            let entry = &self.entries[i];
            let offset = pack_data.len() as u64;
            let (size, compressed, crc) = match entry {
                PackEntry::Full { object, .. } => {
                    let compressed =
                        zstd::encode_all(object.data.as_slice(), self.config.compression_level)
                            .map_err(|e| PackError::CompressionFailed(e.to_string()))?;
                    let crc = crc32fast::hash(&compressed);
                    (object.size, compressed, crc)
                }
                PackEntry::Raw(raw) => (raw.size, raw.compressed.clone(), raw.crc32),
            };

            pack_data.push(entry.kind().type_byte());
            encode_varint(&mut pack_data, size);
            encode_varint(&mut pack_data, compressed.len() as u64);
            pack_data.extend_from_slice(&compressed);

            index_entries.push((entry.id(), crc, offset));
            stats.record(entry.kind(), entry.is_reused());
        }

        let checksum = *blake3::hash(&pack_data).as_bytes();
        pack_data.extend_from_slice(&checksum);

        let index = PackIndex::build(index_entries, checksum);
        stats.pack_bytes = pack_data.len() as u64;
        stats.index_bytes = (8 + 256 * 4 + index.object_count() * (32 + 4 + 8) + 32) as u64;
        self.stats = stats;
        self.index = Some(index.clone());
        debug!(
            objects = index.object_count(),
            bytes = pack_data.len(),
            "wrote pack"
        );
        Ok((pack_data, index))
    }

    /// Whether a bitmap index will be produced for this pack.
    pub fn will_write_bitmap(&self) -> bool {
        self.config.build_bitmaps && self.bitmap_eligible
    }

    /// Build the bitmap index for the pack last produced by [`write_pack`].
    ///
    /// Returns `None` when bitmaps are disabled, when the pack was not
    /// written from a complete closure, or when no tag-target commit is in
    /// the pack.
    ///
    /// [`write_pack`]: PackWriter::write_pack
    pub fn write_bitmap_index(&mut self) -> PackResult<Option<Vec<u8>>> {
        if !self.will_write_bitmap() {
            return Ok(None);
        }
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| PackError::Internal("bitmap requested before pack was written".into()))?;

        let mut links = HashMap::with_capacity(self.entries.len());
        let mut commits = Vec::new();
        for entry in &self.entries {
            if let PackEntry::Full { id, object } = entry {
                links.insert(*id, object.links()?);
                if object.kind == ObjectKind::Commit && self.tag_targets.contains(id) {
                    commits.push(*id);
                }
            }
        }
        commits.sort();
        commits.truncate(self.config.bitmap_commit_limit);
        if commits.is_empty() {
            return Ok(None);
        }

        let bitmap = BitmapIndex::build(index, &commits, &links);
        let bytes = bitmap.to_bytes()?;
        self.stats.bitmap_bytes = bytes.len() as u64;
        self.stats.bitmap_commits = bitmap.commit_count() as u64;
        Ok(Some(bytes))
    }

    /// Statistics of the last [`write_pack`](PackWriter::write_pack).
    pub fn statistics(&self) -> &PackStatistics {
        &self.stats
    }
}

/// Encode a u64 as a variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a variable-length integer. Returns (value, bytes_consumed).
pub(crate) fn decode_varint(data: &[u8]) -> PackResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        if shift >= 64 {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "varint overflow".into(),
            });
        }
    }
    Err(PackError::CorruptEntry {
        offset: 0,
        reason: "truncated varint".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelFlag, NullProgressMonitor, TracingProgressMonitor};
    use crate::reader::PackReader;
    use proptest::prelude::*;
    use stow_store::{Blob, Commit, EntryMode, InMemoryObjectStore, ObjectStore, Tree, TreeEntry};

    struct Repo {
        store: InMemoryObjectStore,
        blob: ObjectId,
        tree: ObjectId,
        c1: ObjectId,
        c2: ObjectId,
    }

    fn repo() -> Repo {
        let store = InMemoryObjectStore::new();
        let blob = store.write(&Blob::new(b"content".to_vec()).to_stored_object()).unwrap();
        let tree = store
            .write(
                &Tree::new(vec![TreeEntry::new(EntryMode::Regular, "file", blob)])
                    .to_stored_object()
                    .unwrap(),
            )
            .unwrap();
        let commit = |parents: Vec<ObjectId>, message: &str| Commit {
            tree,
            parents,
            author: "A".into(),
            message: message.into(),
            timestamp: 0,
        };
        let c1 = store.write(&commit(vec![], "one").to_stored_object().unwrap()).unwrap();
        let c2 = store.write(&commit(vec![c1], "two").to_stored_object().unwrap()).unwrap();
        Repo {
            store,
            blob,
            tree,
            c1,
            c2,
        }
    }

    #[test]
    fn prepare_walks_full_closure() {
        let r = repo();
        let mut writer = PackWriter::new(PackConfig::default());
        writer
            .prepare_pack(&r.store, &[r.c2].into(), &HashSet::new(), &mut NullProgressMonitor)
            .unwrap();
        assert_eq!(writer.object_count(), 4);
        for id in [r.c1, r.c2, r.tree, r.blob] {
            assert!(writer.contains(&id));
        }
        assert!(writer.will_write_bitmap());
    }

    #[test]
    fn have_set_bounds_walk() {
        let r = repo();
        let mut writer = PackWriter::new(PackConfig::default());
        writer
            .prepare_pack(&r.store, &[r.c2].into(), &[r.c1].into(), &mut NullProgressMonitor)
            .unwrap();
        assert_eq!(writer.object_ids(), vec![r.c2]);
        assert!(!writer.will_write_bitmap());
    }

    #[test]
    fn excluded_objects_never_added() {
        let r = repo();
        let mut writer = PackWriter::new(PackConfig::default());
        writer.exclude_objects(Arc::new(HashSet::from([r.blob, r.tree])));
        writer
            .prepare_pack(&r.store, &[r.c1].into(), &HashSet::new(), &mut NullProgressMonitor)
            .unwrap();
        assert_eq!(writer.object_ids(), vec![r.c1]);
        let obj = r.store.read(&r.blob).unwrap().unwrap();
        assert!(!writer.add_object(r.blob, obj));
    }

    #[test]
    fn cancellation_aborts_prepare() {
        let r = repo();
        let flag = CancelFlag::new();
        flag.cancel();
        let mut pm = TracingProgressMonitor::new().with_cancel_flag(flag);
        let mut writer = PackWriter::new(PackConfig::default());
        let err = writer
            .prepare_pack(&r.store, &[r.c2].into(), &HashSet::new(), &mut pm)
            .unwrap_err();
        assert!(matches!(err, PackError::Cancelled));
    }

    #[test]
    fn missing_want_fails() {
        let r = repo();
        let mut writer = PackWriter::new(PackConfig::default());
        let err = writer
            .prepare_pack(
                &r.store,
                &[ObjectId::from_bytes(b"nowhere")].into(),
                &HashSet::new(),
                &mut NullProgressMonitor,
            )
            .unwrap_err();
        assert!(matches!(err, PackError::Store(_)));
    }

    #[test]
    fn tag_targets_written_first() {
        let r = repo();
        let mut writer = PackWriter::new(PackConfig::default());
        writer.set_tag_targets([r.c2]);
        writer
            .prepare_pack(&r.store, &[r.c2].into(), &HashSet::new(), &mut NullProgressMonitor)
            .unwrap();
        let (_, index) = writer.write_pack().unwrap();
        let (offset, _) = index.lookup(&r.c2).unwrap();
        assert_eq!(offset, 12);
    }

    #[test]
    fn names_depend_on_content_and_source() {
        let r = repo();
        let mut a = PackWriter::new(PackConfig::default());
        let mut b = PackWriter::new(PackConfig::default());
        a.prepare_pack(&r.store, &[r.c2].into(), &HashSet::new(), &mut NullProgressMonitor)
            .unwrap();
        // Same objects, different discovery order.
        for id in [r.blob, r.c1, r.tree, r.c2] {
            b.add_object(id, r.store.read(&id).unwrap().unwrap());
        }
        assert_eq!(a.compute_name(PackSource::Gc), b.compute_name(PackSource::Gc));
        assert_ne!(
            a.compute_name(PackSource::Gc),
            a.compute_name(PackSource::UnreachableGarbage)
        );
        assert!(a.compute_name(PackSource::Gc).ends_with("-gc"));
    }

    #[test]
    fn raw_entries_are_copied_verbatim() {
        let r = repo();
        let mut source = PackWriter::new(PackConfig::default());
        source.add_object(r.blob, r.store.read(&r.blob).unwrap().unwrap());
        let (bytes, index) = source.write_pack().unwrap();
        let reader = PackReader::from_bytes(bytes, index).unwrap();
        let raw = reader.read_raw(&r.blob).unwrap().unwrap();

        let mut writer = PackWriter::new(PackConfig::default());
        assert!(writer.add_raw(raw.clone()));
        assert!(!writer.add_raw(raw.clone()));
        let (bytes, index) = writer.write_pack().unwrap();
        assert_eq!(writer.statistics().reused_objects, 1);
        let copy = PackReader::from_bytes(bytes, index).unwrap();
        assert_eq!(copy.read_raw(&r.blob).unwrap().unwrap(), raw);
        assert_eq!(copy.read_object(&r.blob).unwrap().unwrap().data, b"content");
    }

    #[test]
    fn bitmap_written_for_tag_target_commits() {
        let r = repo();
        let mut writer = PackWriter::new(PackConfig::default());
        writer.set_tag_targets([r.c2]);
        writer
            .prepare_pack(&r.store, &[r.c2].into(), &HashSet::new(), &mut NullProgressMonitor)
            .unwrap();
        assert!(matches!(writer.write_bitmap_index(), Err(PackError::Internal(_))));
        let (_, index) = writer.write_pack().unwrap();
        let bytes = writer.write_bitmap_index().unwrap().unwrap();
        let bitmap = BitmapIndex::from_bytes(&bytes).unwrap();
        assert!(bitmap.matches(&index));
        assert_eq!(bitmap.reachable(&index, &r.c2).unwrap().len(), 4);
        assert_eq!(writer.statistics().bitmap_commits, 1);
    }

    #[test]
    fn bitmaps_can_be_disabled() {
        let r = repo();
        let config = PackConfig {
            build_bitmaps: false,
            ..PackConfig::default()
        };
        let mut writer = PackWriter::new(config);
        writer.set_tag_targets([r.c2]);
        writer
            .prepare_pack(&r.store, &[r.c2].into(), &HashSet::new(), &mut NullProgressMonitor)
            .unwrap();
        writer.write_pack().unwrap();
        assert!(writer.write_bitmap_index().unwrap().is_none());
    }

    #[test]
    fn statistics_count_kinds() {
        let r = repo();
        let mut writer = PackWriter::new(PackConfig::default());
        writer
            .prepare_pack(&r.store, &[r.c2].into(), &HashSet::new(), &mut NullProgressMonitor)
            .unwrap();
        let (bytes, index) = writer.write_pack().unwrap();
        let stats = writer.statistics();
        assert_eq!(stats.objects_of(ObjectKind::Commit), 2);
        assert_eq!(stats.objects_of(ObjectKind::Tree), 1);
        assert_eq!(stats.objects_of(ObjectKind::Blob), 1);
        assert_eq!(stats.pack_bytes, bytes.len() as u64);
        assert_eq!(stats.index_bytes, index.to_bytes().len() as u64);
    }

    #[test]
    fn varint_boundaries() {
        for value in [0u64, 42, 127, 128, 1_000_000, u64::MAX] {
            let mut buf = Vec::new();
            encode_varint(&mut buf, value);
            assert_eq!(decode_varint(&buf).unwrap(), (value, buf.len()));
        }
    }

    #[test]
    fn decode_varint_truncated() {
        let err = decode_varint(&[0x80]).unwrap_err();
        assert!(matches!(err, PackError::CorruptEntry { .. }));
    }

    proptest! {
        #[test]
        fn every_added_object_reads_back(blobs in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..256), 1..20)
        ) {
            let mut writer = PackWriter::new(PackConfig::default());
            let mut expected = HashMap::new();
            for data in blobs {
                let obj = Blob::new(data).to_stored_object();
                let id = obj.compute_id();
                writer.add_object(id, obj.clone());
                expected.insert(id, obj);
            }
            let (bytes, index) = writer.write_pack().unwrap();
            let reader = PackReader::from_bytes(bytes, index).unwrap();
            prop_assert_eq!(reader.object_count(), expected.len());
            for (id, obj) in expected {
                prop_assert_eq!(reader.read_object(&id).unwrap(), Some(obj));
            }
        }
    }
}
