use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use stow_pack::{
    NullProgressMonitor, ObjectDatabase, PackConfig, PackDescription, PackStatistics,
    ProgressMonitor, INDEX_VERSION,
};
use stow_refs::RefDatabase;
use stow_types::ObjectId;
use tracing::{info, warn};

use crate::config::{GcConfig, PruneExpire};
use crate::context::{LastRepack, RunContext};
use crate::error::{GcError, GcResult};
use crate::prune::{prune_loose, prune_packed, PruneScope};
use crate::repack::{RepackOutcome, Repacker};
use crate::stats::RepoStatistics;

/// Repacks and prunes one repository.
///
/// A collector is reusable: configuration stays in place between calls, and
/// the refs seen by the last successful repack let later prunes skip
/// history that repack already packed.
pub struct GarbageCollector {
    objects: Arc<dyn ObjectDatabase>,
    refs: Arc<dyn RefDatabase>,
    config: GcConfig,
    index_file: Option<PathBuf>,
    progress: Box<dyn ProgressMonitor + Send>,
    last_repack: Option<LastRepack>,
    source_packs: Vec<PackDescription>,
    new_packs: Vec<PackDescription>,
    new_pack_statistics: Vec<PackStatistics>,
}

impl GarbageCollector {
    pub fn new(objects: Arc<dyn ObjectDatabase>, refs: Arc<dyn RefDatabase>) -> Self {
        Self {
            objects,
            refs,
            config: GcConfig::default(),
            index_file: None,
            progress: Box::new(NullProgressMonitor),
            last_repack: None,
            source_packs: Vec::new(),
            new_packs: Vec::new(),
            new_pack_statistics: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: GcConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Staging index whose uncommitted content must survive collection.
    pub fn set_index_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.index_file = Some(path.into());
        self
    }

    /// Monitor used by [`repack`](Self::repack) and [`gc`](Self::gc).
    pub fn set_progress_monitor(&mut self, pm: Box<dyn ProgressMonitor + Send>) -> &mut Self {
        self.progress = pm;
        self
    }

    pub fn set_pack_config(&mut self, pack: PackConfig) -> &mut Self {
        self.config.pack = pack;
        self
    }

    pub fn set_coalesce_garbage_limit(&mut self, limit: u64) -> &mut Self {
        self.config.coalesce_garbage_limit = limit;
        self
    }

    pub fn set_prune_expire(&mut self, expire: PruneExpire) -> &mut Self {
        self.config.prune_expire = expire;
        self
    }

    // ---- Repacking ----

    /// Rewrite the pack set: live objects into fresh packs, unreachable
    /// objects of rebuilt packs into a garbage pack.
    ///
    /// Returns `false` if another writer changed the pack set during the
    /// run. Nothing is installed in that case and the caller may retry.
    pub fn pack(&mut self, pm: &mut dyn ProgressMonitor) -> GcResult<bool> {
        let version = self.config.pack.index_version;
        if version != INDEX_VERSION {
            return Err(GcError::UnsupportedIndexVersion(version));
        }

        let ctx = RunContext::capture(
            self.objects.as_ref(),
            self.refs.as_ref(),
            self.index_file.as_deref(),
            self.config.coalesce_garbage_limit,
            Utc::now(),
        )?;
        self.source_packs = ctx.packs_before.clone();
        self.new_packs.clear();
        self.new_pack_statistics.clear();

        pm.start(3);
        let report =
            Repacker::new(self.objects.as_ref(), &ctx, self.config.pack.clone()).run(pm)?;

        if report.outcome == RepackOutcome::Raced {
            warn!(
                packs = ctx.packs_before.len(),
                "pack set changed during repack, nothing installed"
            );
            return Ok(false);
        }

        self.new_packs = report.new_packs;
        self.new_pack_statistics = report.statistics;
        self.last_repack = Some(LastRepack::from(&ctx));
        let loose_removed = prune_packed(self.objects.as_ref())?;
        info!(
            outcome = ?report.outcome,
            source_packs = self.source_packs.len(),
            new_packs = self.new_packs.len(),
            retired = report.retired.len(),
            loose_removed,
            "repack complete"
        );
        Ok(true)
    }

    /// [`pack`](Self::pack) with the configured progress monitor, treating
    /// a concurrent pack set change as an error.
    pub fn repack(&mut self) -> GcResult<Vec<PackDescription>> {
        let mut pm = std::mem::replace(&mut self.progress, Box::new(NullProgressMonitor));
        let result = self.pack(&mut *pm);
        self.progress = pm;
        if result? {
            Ok(self.new_packs.clone())
        } else {
            Err(GcError::ConcurrentModification)
        }
    }

    // ---- Pruning ----

    /// Delete expired, unreachable loose objects. Objects in `keep` are
    /// never deleted. Returns how many were deleted.
    pub fn prune(&mut self, keep: &HashSet<ObjectId>) -> GcResult<usize> {
        self.clear_caches();
        let now = Utc::now();
        let Some(cutoff) = self.config.prune_expire.cutoff(now) else {
            info!(expire = %self.config.prune_expire, "pruning disabled");
            return Ok(0);
        };
        let pruned = prune_loose(
            self.objects.as_ref(),
            self.refs.as_ref(),
            PruneScope {
                cutoff,
                keep,
                last_repack: self.last_repack.as_ref(),
                index_file: self.index_file.as_deref(),
            },
        )?;
        info!(pruned, cutoff = %cutoff, "prune complete");
        Ok(pruned)
    }

    /// Delete loose objects that a pack already holds.
    pub fn prune_packed(&mut self) -> GcResult<usize> {
        self.clear_caches();
        let removed = prune_packed(self.objects.as_ref())?;
        info!(removed, "prune-packed complete");
        Ok(removed)
    }

    /// Move loose refs into packed storage. Returns how many refs moved.
    pub fn pack_refs(&mut self) -> GcResult<usize> {
        let packed = self.refs.pack_refs()?;
        info!(packed, "packed refs");
        Ok(packed)
    }

    /// Pack refs, repack, then prune with an empty keep set.
    pub fn gc(&mut self) -> GcResult<Vec<PackDescription>> {
        self.pack_refs()?;
        let new_packs = self.repack()?;
        self.prune(&HashSet::new())?;
        Ok(new_packs)
    }

    // ---- Inspection ----

    pub fn statistics(&self) -> GcResult<RepoStatistics> {
        self.clear_caches();
        RepoStatistics::collect(self.objects.as_ref(), self.refs.as_ref())
    }

    /// Drop cached refs and packs so the next read sees other writers.
    fn clear_caches(&self) {
        self.refs.clear_cache();
        self.objects.clear_cache();
    }

    /// The pack set the last repack started from.
    pub fn source_packs(&self) -> &[PackDescription] {
        &self.source_packs
    }

    /// Packs written by the last repack.
    pub fn new_packs(&self) -> &[PackDescription] {
        &self.new_packs
    }

    /// Writer statistics, one per entry of [`new_packs`](Self::new_packs).
    pub fn new_pack_statistics(&self) -> &[PackStatistics] {
        &self.new_pack_statistics
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("config", &self.config)
            .field("index_file", &self.index_file)
            .field("source_packs", &self.source_packs.len())
            .field("new_packs", &self.new_packs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone};
    use proptest::prelude::*;
    use stow_index::Index;
    use stow_pack::{
        CancelFlag, InMemoryObjectDatabase, ObjectDirectory, PackExt, PackSource,
        TracingProgressMonitor,
    };
    use stow_refs::{InMemoryRefDatabase, PersonIdent};
    use stow_store::{
        Blob, Commit, EntryMode, ObjectReader, ObjectStore, ObjectWalk, StoredObject, Tree,
        TreeEntry,
    };

    fn who() -> PersonIdent {
        PersonIdent::new("gc", "gc@example.com", Utc::now())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// Write a commit holding one file, loose.
    fn commit(store: &dyn ObjectStore, content: &[u8], parents: Vec<ObjectId>) -> ObjectId {
        let blob = store.write(&Blob::new(content.to_vec()).to_stored_object()).unwrap();
        let tree = Tree::new(vec![TreeEntry::new(EntryMode::Regular, "file", blob)]);
        let tree = store.write(&tree.to_stored_object().unwrap()).unwrap();
        let c = Commit {
            tree,
            parents,
            author: "a".into(),
            message: String::from_utf8_lossy(content).into_owned(),
            timestamp: 0,
        };
        store.write(&c.to_stored_object().unwrap()).unwrap()
    }

    fn closure(reader: &dyn ObjectReader, tip: ObjectId) -> HashSet<ObjectId> {
        let mut walk = ObjectWalk::new(reader);
        walk.mark_start(tip);
        walk.collect_ids().unwrap()
    }

    struct Repo {
        objects: Arc<InMemoryObjectDatabase>,
        refs: Arc<InMemoryRefDatabase>,
    }

    impl Repo {
        fn new() -> Self {
            Self {
                objects: Arc::new(InMemoryObjectDatabase::new()),
                refs: Arc::new(InMemoryRefDatabase::new()),
            }
        }

        fn gc(&self) -> GarbageCollector {
            GarbageCollector::new(self.objects.clone(), self.refs.clone())
        }

        fn commit(&self, content: &[u8], parents: Vec<ObjectId>) -> ObjectId {
            commit(self.objects.loose_store(), content, parents)
        }

        fn point(&self, name: &str, id: ObjectId) {
            self.refs.update_ref(name, id, &who(), "update").unwrap();
        }

        fn backdate_loose(&self, secs: i64) {
            for id in self.objects.loose_store().all_ids() {
                self.objects.loose_store().set_modified(&id, at(secs));
            }
        }
    }

    // ---- Test 1: heads only ----

    #[test]
    fn branches_share_one_pack() {
        let repo = Repo::new();
        let a = repo.commit(b"a", vec![]);
        let b = repo.commit(b"b", vec![a]);
        repo.point("refs/heads/main", a);
        repo.point("refs/heads/feature", b);

        let mut gc = repo.gc();
        let new_packs = gc.repack().unwrap();
        assert_eq!(new_packs.len(), 1);
        assert_eq!(new_packs[0].source(), PackSource::Gc);
        assert_eq!(new_packs[0].object_count(), 6);
        assert_eq!(gc.new_pack_statistics().len(), 1);
        assert!(gc.source_packs().is_empty());

        // Every loose copy is now redundant.
        assert!(repo.objects.loose_store().is_empty());
        for id in closure(&*repo.objects, b) {
            assert!(repo.objects.read(&id).unwrap().is_some());
        }
    }

    // ---- Test 2: deleted branch kept alive by its reflog ----

    #[test]
    fn deleted_branch_survives_through_reflog() {
        let repo = Repo::new();
        let a = repo.commit(b"a", vec![]);
        let b = repo.commit(b"b", vec![a]);
        repo.point("refs/heads/main", a);
        repo.point("refs/heads/feature", b);
        repo.refs.delete_ref("refs/heads/feature").unwrap();
        repo.backdate_loose(0);

        let mut gc = repo.gc();
        gc.set_prune_expire(PruneExpire::Now);
        assert_eq!(gc.prune(&HashSet::new()).unwrap(), 0);
        assert!(repo.objects.read(&b).unwrap().is_some());

        let new_packs = gc.gc().unwrap();
        assert_eq!(new_packs.len(), 2);
        let rest = &new_packs[1];
        assert_eq!(rest.object_count(), 3);
        let packs = repo.objects.packs().unwrap();
        let rest_pack = packs.iter().find(|p| p.name() == rest.name()).unwrap();
        assert!(rest_pack.reader.contains(&b));
        assert!(!rest_pack.reader.contains(&a));
        assert!(repo.objects.loose_store().read(&b).unwrap().is_none());
        assert!(repo.objects.read(&b).unwrap().is_some());
    }

    // ---- Test 3: garbage coalescing on disk ----

    fn noise(seed: &[u8], len: usize) -> Vec<u8> {
        let mut out = vec![0; len];
        blake3::Hasher::new()
            .update(seed)
            .finalize_xof()
            .fill(&mut out);
        out
    }

    #[test]
    fn small_garbage_packs_are_coalesced() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Arc::new(ObjectDirectory::open(tmp.path()).unwrap());
        let refs = Arc::new(InMemoryRefDatabase::new());

        let small = Blob::new(noise(b"small", 10 << 10)).to_stored_object();
        let large = Blob::new(noise(b"large", 10 << 20)).to_stored_object();
        let leftover = Blob::new(noise(b"leftover", 1 << 10)).to_stored_object();
        let small_pack = dir.insert_pack(&[small.clone()], PackSource::UnreachableGarbage).unwrap();
        let large_pack = dir.insert_pack(&[large.clone()], PackSource::UnreachableGarbage).unwrap();
        dir.insert_pack(&[leftover.clone()], PackSource::Insert).unwrap();
        assert!(large_pack.file_size(PackExt::Pack) >= 1 << 20);

        let mut gc = GarbageCollector::new(dir.clone(), refs);
        gc.set_coalesce_garbage_limit(1 << 20);
        let new_packs = gc.repack().unwrap();
        assert_eq!(new_packs.len(), 1);
        let garbage = &new_packs[0];
        assert_eq!(garbage.source(), PackSource::UnreachableGarbage);
        assert_eq!(garbage.object_count(), 2);

        assert!(!dir.pack_file(&small_pack, PackExt::Pack).exists());
        assert!(dir.pack_file(&large_pack, PackExt::Pack).exists());
        assert!(dir.pack_file(garbage, PackExt::Pack).exists());
        for obj in [&small, &large, &leftover] {
            assert_eq!(dir.read(&obj.compute_id()).unwrap().as_ref(), Some(obj));
        }
    }

    #[test]
    fn zero_limit_leaves_garbage_packs_alone() {
        let repo = Repo::new();
        let junk = Blob::new(b"junk".to_vec()).to_stored_object();
        let before = repo
            .objects
            .insert_pack(&[junk], PackSource::UnreachableGarbage)
            .unwrap();

        let mut gc = repo.gc();
        gc.set_coalesce_garbage_limit(0);
        assert!(gc.repack().unwrap().is_empty());
        assert_eq!(repo.objects.pack_names(), vec![before.name().to_string()]);
    }

    // ---- Test 4: race with a concurrent writer ----

    /// Inserts a pack the first time a task begins, as a concurrent
    /// writer would.
    struct ConcurrentInsert {
        objects: Arc<InMemoryObjectDatabase>,
        fired: bool,
    }

    impl ProgressMonitor for ConcurrentInsert {
        fn start(&mut self, _total_tasks: usize) {}
        fn begin_task(&mut self, _title: &str, _total_work: Option<u64>) {
            if !self.fired {
                self.fired = true;
                let racer = Blob::new(b"racer".to_vec()).to_stored_object();
                self.objects.insert_pack(&[racer], PackSource::Receive).unwrap();
            }
        }
        fn update(&mut self, _completed: u64) {}
        fn end_task(&mut self) {}
        fn is_cancelled(&self) -> bool {
            false
        }
    }

    #[test]
    fn concurrent_insert_is_rejected() {
        let repo = Repo::new();
        let a = repo.commit(b"a", vec![]);
        repo.point("refs/heads/main", a);
        repo.objects
            .insert_pack(&[Blob::new(b"old".to_vec()).to_stored_object()], PackSource::Insert)
            .unwrap();
        let before = repo.objects.pack_names();

        let mut pm = ConcurrentInsert {
            objects: repo.objects.clone(),
            fired: false,
        };
        let mut gc = repo.gc();
        assert!(!gc.pack(&mut pm).unwrap());

        let after = repo.objects.pack_names();
        assert_eq!(after.len(), before.len() + 1);
        assert!(before.iter().all(|n| after.contains(n)));
        assert!(repo.objects.loose_store().read(&a).unwrap().is_some());
    }

    #[test]
    fn repack_reports_race_as_error() {
        let repo = Repo::new();
        let a = repo.commit(b"a", vec![]);
        repo.point("refs/heads/main", a);
        let mut gc = repo.gc();
        gc.set_progress_monitor(Box::new(ConcurrentInsert {
            objects: repo.objects.clone(),
            fired: false,
        }));
        assert!(matches!(gc.repack(), Err(GcError::ConcurrentModification)));
        assert!(gc.new_packs().is_empty());
    }

    // ---- Test 5: idempotence ----

    #[test]
    fn second_pack_writes_nothing() {
        let repo = Repo::new();
        let a = repo.commit(b"a", vec![]);
        let b = repo.commit(b"b", vec![a]);
        repo.point("refs/heads/main", b);
        repo.point("refs/tags/v1", a);
        repo.objects
            .insert_pack(&[Blob::new(b"junk".to_vec()).to_stored_object()], PackSource::Insert)
            .unwrap();

        let mut gc = repo.gc();
        assert!(gc.pack(&mut NullProgressMonitor).unwrap());
        assert_eq!(gc.new_packs().len(), 2);
        let names = repo.objects.pack_names();

        assert!(gc.pack(&mut NullProgressMonitor).unwrap());
        assert!(gc.new_packs().is_empty());
        assert_eq!(gc.source_packs().len(), names.len());
        assert_eq!(repo.objects.pack_names(), names);
    }

    // ---- Test 6: prune boundary ----

    #[test]
    fn object_at_cutoff_is_not_pruned() {
        let repo = Repo::new();
        let edge = repo
            .objects
            .loose_store()
            .write(&Blob::new(b"edge".to_vec()).to_stored_object())
            .unwrap();
        let older = repo
            .objects
            .loose_store()
            .write(&Blob::new(b"older".to_vec()).to_stored_object())
            .unwrap();
        repo.objects.loose_store().set_modified(&edge, at(1_000));
        repo.objects.loose_store().set_modified(&older, at(999));

        let mut gc = repo.gc();
        gc.set_prune_expire(PruneExpire::At(at(1_000)));
        assert_eq!(gc.prune(&HashSet::new()).unwrap(), 1);
        assert!(repo.objects.read(&edge).unwrap().is_some());
        assert!(repo.objects.read(&older).unwrap().is_none());
    }

    #[test]
    fn never_expire_prunes_nothing() {
        let repo = Repo::new();
        repo.commit(b"dangling", vec![]);
        repo.backdate_loose(0);
        let mut gc = repo.gc();
        gc.set_prune_expire(PruneExpire::Never);
        assert_eq!(gc.prune(&HashSet::new()).unwrap(), 0);
        assert_eq!(repo.objects.loose_store().len(), 3);
    }

    #[test]
    fn fresh_objects_survive_default_expiry() {
        let repo = Repo::new();
        repo.commit(b"dangling", vec![]);
        let mut gc = repo.gc();
        assert_eq!(gc.prune(&HashSet::new()).unwrap(), 0);
        let old = Utc::now() - Duration::weeks(3);
        for id in repo.objects.loose_store().all_ids() {
            repo.objects.loose_store().set_modified(&id, old);
        }
        assert_eq!(gc.prune(&HashSet::new()).unwrap(), 3);
    }

    // ---- Test 7: keep packs ----

    #[test]
    fn keep_pack_is_never_rewritten() {
        let repo = Repo::new();
        let a = repo.commit(b"a", vec![]);
        let tree = Commit::from_stored_object(&repo.objects.read(&a).unwrap().unwrap())
            .unwrap()
            .tree;
        let kept_objects: Vec<StoredObject> = [a, tree]
            .iter()
            .map(|id| repo.objects.read(id).unwrap().unwrap())
            .collect();
        let kept = repo.objects.insert_pack(&kept_objects, PackSource::Receive).unwrap();
        assert!(repo.objects.mark_keep(kept.name()));
        repo.point("refs/heads/main", a);

        let mut gc = repo.gc();
        let new_packs = gc.repack().unwrap();
        assert_eq!(new_packs.len(), 1);
        // Only the blob is left for the heads pack.
        assert_eq!(new_packs[0].object_count(), 1);
        assert!(repo.objects.pack_names().contains(&kept.name().to_string()));
        for id in closure(&*repo.objects, a) {
            assert!(repo.objects.read(&id).unwrap().is_some());
        }
    }

    // ---- Test 8: cancellation ----

    #[test]
    fn cancelled_run_installs_nothing() {
        let repo = Repo::new();
        let a = repo.commit(b"a", vec![]);
        repo.point("refs/heads/main", a);
        repo.objects
            .insert_pack(&[Blob::new(b"x".to_vec()).to_stored_object()], PackSource::Insert)
            .unwrap();
        let before = repo.objects.pack_names();

        let flag = CancelFlag::new();
        flag.cancel();
        let mut pm = TracingProgressMonitor::new().with_cancel_flag(flag);
        let mut gc = repo.gc();
        assert!(matches!(gc.pack(&mut pm), Err(GcError::Cancelled)));
        assert_eq!(repo.objects.pack_names(), before);
        assert!(repo.objects.loose_store().read(&a).unwrap().is_some());
    }

    // ---- Test 9: configuration ----

    #[test]
    fn unsupported_index_version_is_rejected() {
        let repo = Repo::new();
        let mut gc = repo.gc();
        gc.set_pack_config(PackConfig {
            index_version: INDEX_VERSION + 1,
            ..PackConfig::default()
        });
        assert!(matches!(
            gc.pack(&mut NullProgressMonitor),
            Err(GcError::UnsupportedIndexVersion(v)) if v == INDEX_VERSION + 1
        ));
    }

    #[test]
    fn collector_keeps_its_config() {
        let repo = Repo::new();
        let config =
            GcConfig::from_toml_str("coalesce_garbage_limit = 7\nprune_expire = \"now\"").unwrap();
        let gc = repo.gc().with_config(config.clone());
        assert_eq!(gc.config(), &config);
    }

    // ---- Test 10: staged index content ----

    #[test]
    fn staged_content_survives_prune_and_repack() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = Repo::new();
        let a = repo.commit(b"a", vec![]);
        repo.point("refs/heads/main", a);
        repo.refs.link_symbolic("HEAD", "refs/heads/main").unwrap();

        let store: Arc<dyn ObjectStore> = Arc::new(stow_store::InMemoryObjectStore::new());
        let mut index = Index::new(store);
        index
            .stage_file("new.txt", b"work in progress", EntryMode::Regular)
            .unwrap();
        let staged = index.get("new.txt").unwrap().object_id;
        repo.objects
            .loose_store()
            .write(&Blob::new(b"work in progress".to_vec()).to_stored_object())
            .unwrap();
        let index_path = tmp.path().join("index");
        index.save(&index_path).unwrap();
        repo.backdate_loose(0);

        let mut gc = repo.gc();
        gc.set_index_file(&index_path);
        gc.set_prune_expire(PruneExpire::Now);
        assert_eq!(gc.prune(&HashSet::new()).unwrap(), 0);
        assert!(repo.objects.read(&staged).unwrap().is_some());

        let new_packs = gc.repack().unwrap();
        assert_eq!(new_packs.len(), 2);
        assert!(repo.objects.read(&staged).unwrap().is_some());
    }

    // ---- Test 11: statistics and ref packing ----

    #[test]
    fn gc_packs_refs_and_reports_statistics() {
        let repo = Repo::new();
        let a = repo.commit(b"a", vec![]);
        repo.point("refs/heads/main", a);
        repo.point("refs/tags/v1", a);

        let mut gc = repo.gc();
        let before = gc.statistics().unwrap();
        assert_eq!(before.loose_objects, 3);
        assert_eq!(before.loose_refs, 2);

        gc.gc().unwrap();
        let after = gc.statistics().unwrap();
        assert_eq!(after.loose_objects, 0);
        assert_eq!(after.pack_files, 1);
        assert_eq!(after.packed_objects, 3);
        assert_eq!(after.loose_refs, 0);
        assert_eq!(after.packed_refs, 2);
    }

    // ---- Test 12: another handle writes between runs ----

    #[test]
    fn prune_sees_packs_written_by_another_handle() {
        let tmp = tempfile::tempdir().unwrap();
        let a = Arc::new(ObjectDirectory::open(tmp.path()).unwrap());
        let refs = Arc::new(InMemoryRefDatabase::new());
        let c1 = commit(a.loose_store(), b"one", vec![]);
        refs.update_ref("refs/heads/main", c1, &who(), "one").unwrap();

        let mut gc = GarbageCollector::new(a.clone(), refs.clone());
        gc.repack().unwrap();
        let before = gc.statistics().unwrap();
        assert_eq!(before.pack_files, 1);

        // A second process adds C2 as a pack and moves main onto it.
        let b = ObjectDirectory::open(tmp.path()).unwrap();
        let blob = Blob::new(b"two".to_vec()).to_stored_object();
        let tree = Tree::new(vec![TreeEntry::new(EntryMode::Regular, "file", blob.compute_id())])
            .to_stored_object()
            .unwrap();
        let c2 = Commit {
            tree: tree.compute_id(),
            parents: vec![c1],
            author: "a".into(),
            message: "two".into(),
            timestamp: 0,
        }
        .to_stored_object()
        .unwrap();
        let c2_id = c2.compute_id();
        b.insert_pack(&[blob, tree, c2], PackSource::Receive).unwrap();
        refs.update_ref("refs/heads/main", c2_id, &who(), "two").unwrap();

        let junk = a
            .loose_store()
            .write(&Blob::new(b"junk".to_vec()).to_stored_object())
            .unwrap();
        a.loose_store().touch(&junk, at(0)).unwrap();

        gc.set_prune_expire(PruneExpire::Now);
        assert_eq!(gc.prune(&HashSet::new()).unwrap(), 1);
        assert!(a.read(&junk).unwrap().is_none());
        for id in closure(&*a, c2_id) {
            assert!(a.read(&id).unwrap().is_some());
        }
        assert_eq!(gc.statistics().unwrap().pack_files, 2);
    }

    // ---- Property: no duplication, no loss ----

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn repack_keeps_every_reachable_object_once(
            parents in prop::collection::vec(prop::option::of(0usize..8), 1..10),
            heads in prop::collection::vec(0usize..10, 0..4),
            others in prop::collection::vec(0usize..10, 0..4),
            garbage in 0usize..3,
        ) {
            let repo = Repo::new();
            let mut commits: Vec<ObjectId> = Vec::new();
            for (i, parent) in parents.iter().enumerate() {
                let parents = parent
                    .filter(|_| !commits.is_empty())
                    .map(|p| vec![commits[p % commits.len()]])
                    .unwrap_or_default();
                commits.push(repo.commit(format!("c{i}").as_bytes(), parents));
            }
            for (i, h) in heads.iter().enumerate() {
                repo.point(&format!("refs/heads/h{i}"), commits[h % commits.len()]);
            }
            for (i, o) in others.iter().enumerate() {
                repo.point(&format!("refs/remotes/origin/o{i}"), commits[o % commits.len()]);
            }
            for g in 0..garbage {
                repo.objects
                    .insert_pack(
                        &[Blob::new(format!("garbage {g}").into_bytes()).to_stored_object()],
                        PackSource::Insert,
                    )
                    .unwrap();
            }

            let reachable: HashSet<ObjectId> = repo
                .refs
                .all_refs()
                .unwrap()
                .values()
                .filter_map(|r| r.object_id())
                .flat_map(|tip| closure(&*repo.objects, tip))
                .collect();

            let mut gc = repo.gc();
            gc.repack().unwrap();

            let packs = repo.objects.packs().unwrap();
            let mut seen = HashSet::new();
            for pack in packs.iter().filter(|p| gc.new_packs().iter().any(|d| d.name() == p.name())) {
                for id in pack.reader.object_ids() {
                    prop_assert!(seen.insert(*id), "{} packed twice", id.short_hex());
                }
            }
            for id in &reachable {
                prop_assert!(repo.objects.read(id).unwrap().is_some());
            }
        }
    }
}
