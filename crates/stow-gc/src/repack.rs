//! The pass runner: writes the heads, rest and garbage packs of one repack
//! and swaps them in for the packs they replace.
//!
//! Passes run in order and each one excludes what the earlier ones packed,
//! so no object lands in two new packs. Kept packs are excluded from every
//! pass. A pass whose result is identical to an existing pack reuses that
//! pack instead of writing a copy.

use std::collections::HashSet;
use std::sync::Arc;

use stow_pack::{
    CommitOutcome, ObjectDatabase, ObjectIdSet, PackConfig, PackDescription, PackFiles,
    PackSource, PackStatistics, PackTransaction, PackWriter, ProgressMonitor, INDEX_VERSION,
};
use tracing::debug;

use crate::context::RunContext;
use crate::error::{GcError, GcResult};

/// How a repack ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepackOutcome {
    /// The new pack set is installed.
    Committed,
    /// Every pass matched an existing pack and nothing needed retiring.
    UpToDate,
    /// Another writer changed the pack set first. Nothing was installed.
    Raced,
}

/// Everything a repack produced.
#[derive(Clone, Debug)]
pub struct RepackReport {
    pub outcome: RepackOutcome,
    /// Packs written by this run, in pass order.
    pub new_packs: Vec<PackDescription>,
    /// Writer statistics, parallel to `new_packs`.
    pub statistics: Vec<PackStatistics>,
    /// Packs removed by the commit.
    pub retired: Vec<PackDescription>,
}

/// Runs the passes of one repack against a captured [`RunContext`].
pub struct Repacker<'a> {
    objects: &'a dyn ObjectDatabase,
    ctx: &'a RunContext,
    pack_config: PackConfig,
    exclusions: Vec<Arc<dyn ObjectIdSet>>,
    reused: HashSet<String>,
    new_packs: Vec<PackDescription>,
    statistics: Vec<PackStatistics>,
}

impl<'a> Repacker<'a> {
    pub fn new(
        objects: &'a dyn ObjectDatabase,
        ctx: &'a RunContext,
        pack_config: PackConfig,
    ) -> Self {
        let exclusions = ctx
            .plan
            .keep
            .iter()
            .map(|p| Arc::new(p.reader.index().clone()) as Arc<dyn ObjectIdSet>)
            .collect();
        Self {
            objects,
            ctx,
            pack_config,
            exclusions,
            reused: HashSet::new(),
            new_packs: Vec::new(),
            statistics: Vec::new(),
        }
    }

    /// Write every pass inside one transaction and commit it.
    ///
    /// Any error rolls the transaction back before it is returned.
    pub fn run(mut self, pm: &mut dyn ProgressMonitor) -> GcResult<RepackReport> {
        let objects = self.objects;
        let mut tx = objects
            .begin_transaction(&self.ctx.packs_before)
            .map_err(GcError::from_pack)?;

        if let Err(e) = self.write_passes(&mut *tx, pm) {
            debug!(error = %e, "repack failed, rolling back");
            tx.rollback();
            return Err(e);
        }

        let retired: Vec<PackDescription> = self
            .ctx
            .plan
            .rebuild
            .iter()
            .filter(|p| !self.reused.contains(p.name()))
            .map(|p| p.description.clone())
            .collect();

        let outcome = if self.new_packs.is_empty() && retired.is_empty() {
            tx.rollback();
            RepackOutcome::UpToDate
        } else {
            match tx.commit(&retired).map_err(GcError::from_pack)? {
                CommitOutcome::Committed => RepackOutcome::Committed,
                CommitOutcome::Raced => RepackOutcome::Raced,
            }
        };
        debug!(
            outcome = ?outcome,
            written = self.new_packs.len(),
            reused = self.reused.len(),
            retired = retired.len(),
            "repack finished"
        );
        Ok(RepackReport {
            outcome,
            new_packs: self.new_packs,
            statistics: self.statistics,
            retired,
        })
    }

    fn write_passes(
        &mut self,
        tx: &mut dyn PackTransaction,
        pm: &mut dyn ProgressMonitor,
    ) -> GcResult<()> {
        let ctx = self.ctx;
        let classification = &ctx.classification;

        check_cancelled(pm)?;
        if !classification.heads.is_empty() {
            self.pack_reachable(tx, pm, &classification.heads, &HashSet::new())?;
        }

        check_cancelled(pm)?;
        if !classification.non_heads.is_empty() {
            self.pack_reachable(tx, pm, &classification.non_heads, &classification.heads)?;
        }

        check_cancelled(pm)?;
        if self.objects.supports_garbage_packs() && !ctx.plan.rebuild.is_empty() {
            self.pack_garbage(tx, pm)?;
        }
        Ok(())
    }

    fn new_writer(&self, config: PackConfig) -> PackWriter {
        let mut writer = PackWriter::new(config);
        for set in &self.exclusions {
            writer.exclude_objects(Arc::clone(set));
        }
        writer
    }

    /// Pack everything reachable from `want` and not from `have`.
    fn pack_reachable(
        &mut self,
        tx: &mut dyn PackTransaction,
        pm: &mut dyn ProgressMonitor,
        want: &HashSet<stow_types::ObjectId>,
        have: &HashSet<stow_types::ObjectId>,
    ) -> GcResult<()> {
        let mut writer = self.new_writer(self.pack_config.clone());
        writer.set_tag_targets(self.ctx.classification.tag_targets.iter().copied());
        writer
            .prepare_pack(self.objects.reader(), want, have, pm)
            .map_err(GcError::from_pack)?;
        self.finish_pass(tx, writer, PackSource::Gc)
    }

    /// Copy every object of the rebuilt packs that no other pack holds.
    ///
    /// Entries are reused as stored, without recompression.
    fn pack_garbage(
        &mut self,
        tx: &mut dyn PackTransaction,
        pm: &mut dyn ProgressMonitor,
    ) -> GcResult<()> {
        let config = PackConfig {
            build_bitmaps: false,
            reuse_objects: true,
            ..self.pack_config.clone()
        };
        let mut writer = self.new_writer(config);
        for pack in &self.ctx.plan.untouched {
            writer.exclude_objects(Arc::new(pack.reader.index().clone()));
        }

        pm.begin_task("Finding garbage", Some(self.ctx.plan.rebuild_objects()));
        for pack in &self.ctx.plan.rebuild {
            for id in pack.reader.object_ids() {
                if pm.is_cancelled() {
                    pm.end_task();
                    return Err(GcError::Cancelled);
                }
                pm.update(1);
                if writer.is_excluded(id) || writer.contains(id) {
                    continue;
                }
                if let Some(raw) = pack.reader.read_raw(id).map_err(GcError::from_pack)? {
                    writer.add_raw(raw);
                }
            }
        }
        pm.end_task();
        self.finish_pass(tx, writer, PackSource::UnreachableGarbage)
    }

    fn finish_pass(
        &mut self,
        tx: &mut dyn PackTransaction,
        mut writer: PackWriter,
        source: PackSource,
    ) -> GcResult<()> {
        if writer.is_empty() {
            debug!(source = source.tag(), "pass found nothing to pack");
            return Ok(());
        }

        let name = writer.compute_name(source);
        if let Some(existing) = self.ctx.existing_pack(&name) {
            debug!(pack = %name, "pack already up to date");
            self.exclusions.push(Arc::new(existing.reader.index().clone()));
            self.reused.insert(name);
            return Ok(());
        }

        let (pack, index) = writer.write_pack().map_err(GcError::from_pack)?;
        let bitmap = writer.write_bitmap_index().map_err(GcError::from_pack)?;
        let files = PackFiles {
            pack,
            index: index.to_bytes(),
            bitmap,
        };
        let mut description = PackDescription::new(name, source);
        files.describe(&mut description);
        description.set_object_count(index.object_count() as u64);
        description.set_index_version(INDEX_VERSION);
        description.set_statistics(writer.statistics().clone());

        tx.write_pack(&description, files).map_err(GcError::from_pack)?;
        debug!(pack = %description, stats = %writer.statistics(), "staged pack");
        self.exclusions.push(Arc::new(index));
        self.statistics.push(writer.statistics().clone());
        self.new_packs.push(description);
        Ok(())
    }
}

fn check_cancelled(pm: &dyn ProgressMonitor) -> GcResult<()> {
    if pm.is_cancelled() {
        Err(GcError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stow_pack::{InMemoryObjectDatabase, NullProgressMonitor};
    use stow_refs::{InMemoryRefDatabase, PersonIdent};
    use stow_store::{Blob, ObjectReader, ObjectStore};
    use stow_types::ObjectId;

    fn who() -> PersonIdent {
        PersonIdent::new("gc", "gc@example.com", Utc::now())
    }

    fn capture(db: &InMemoryObjectDatabase, refs: &InMemoryRefDatabase) -> RunContext {
        RunContext::capture(db, refs, None, u64::MAX, Utc::now()).unwrap()
    }

    fn blob(db: &InMemoryObjectDatabase, data: &[u8]) -> ObjectId {
        db.loose_store()
            .write(&Blob::new(data.to_vec()).to_stored_object())
            .unwrap()
    }

    #[test]
    fn heads_and_rest_are_disjoint() {
        let db = InMemoryObjectDatabase::new();
        let refs = InMemoryRefDatabase::new();
        let a = blob(&db, b"a");
        let b = blob(&db, b"b");
        refs.update_ref("refs/heads/main", a, &who(), "c").unwrap();
        refs.update_ref("refs/tags/t", a, &who(), "c").unwrap();
        refs.update_ref("refs/remotes/origin/x", b, &who(), "c").unwrap();

        let ctx = capture(&db, &refs);
        let report = Repacker::new(&db, &ctx, PackConfig::default())
            .run(&mut NullProgressMonitor)
            .unwrap();
        assert_eq!(report.outcome, RepackOutcome::Committed);
        assert_eq!(report.new_packs.len(), 2);
        assert_eq!(report.statistics.len(), 2);
        assert_eq!(report.new_packs[0].object_count(), 1);
        assert_eq!(report.new_packs[1].object_count(), 1);

        let packs = db.packs().unwrap();
        let holding_a = packs.iter().filter(|p| p.reader.contains(&a)).count();
        assert_eq!(holding_a, 1);
    }

    #[test]
    fn second_run_reuses_existing_packs() {
        let db = InMemoryObjectDatabase::new();
        let refs = InMemoryRefDatabase::new();
        let a = blob(&db, b"a");
        refs.update_ref("refs/heads/main", a, &who(), "c").unwrap();

        let ctx = capture(&db, &refs);
        Repacker::new(&db, &ctx, PackConfig::default())
            .run(&mut NullProgressMonitor)
            .unwrap();
        let before = db.pack_names();

        let ctx = capture(&db, &refs);
        let report = Repacker::new(&db, &ctx, PackConfig::default())
            .run(&mut NullProgressMonitor)
            .unwrap();
        assert_eq!(report.outcome, RepackOutcome::UpToDate);
        assert!(report.new_packs.is_empty());
        assert!(report.retired.is_empty());
        assert_eq!(db.pack_names(), before);
    }

    #[test]
    fn garbage_pass_skips_kept_objects() {
        let db = InMemoryObjectDatabase::new();
        let refs = InMemoryRefDatabase::new();
        let kept = Blob::new(b"kept".to_vec()).to_stored_object();
        let junk = Blob::new(b"junk".to_vec()).to_stored_object();
        let keep = db.insert_pack(&[kept.clone()], PackSource::Insert).unwrap();
        db.mark_keep(keep.name());
        db.insert_pack(&[kept.clone(), junk.clone()], PackSource::Insert)
            .unwrap();

        let ctx = capture(&db, &refs);
        let report = Repacker::new(&db, &ctx, PackConfig::default())
            .run(&mut NullProgressMonitor)
            .unwrap();
        assert_eq!(report.outcome, RepackOutcome::Committed);
        assert_eq!(report.new_packs.len(), 1);
        let garbage = &report.new_packs[0];
        assert_eq!(garbage.source(), PackSource::UnreachableGarbage);
        assert_eq!(garbage.object_count(), 1);
        assert_eq!(garbage.statistics().unwrap().reused_objects, 1);

        let names = db.pack_names();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n == keep.name()));
        assert!(db.read(&kept.compute_id()).unwrap().is_some());
        assert!(db.read(&junk.compute_id()).unwrap().is_some());
    }

    #[test]
    fn garbage_pass_disabled_drops_unreachable_packs() {
        let db = InMemoryObjectDatabase::new().with_garbage_packs(false);
        let refs = InMemoryRefDatabase::new();
        let junk = Blob::new(b"junk".to_vec()).to_stored_object();
        db.insert_pack(&[junk.clone()], PackSource::Insert).unwrap();

        let ctx = capture(&db, &refs);
        let report = Repacker::new(&db, &ctx, PackConfig::default())
            .run(&mut NullProgressMonitor)
            .unwrap();
        assert_eq!(report.outcome, RepackOutcome::Committed);
        assert!(report.new_packs.is_empty());
        assert_eq!(report.retired.len(), 1);
        assert!(db.pack_names().is_empty());
        assert_eq!(db.read(&junk.compute_id()).unwrap(), None);
    }

    #[test]
    fn empty_repository_is_up_to_date() {
        let db = InMemoryObjectDatabase::new();
        let refs = InMemoryRefDatabase::new();
        let ctx = capture(&db, &refs);
        let report = Repacker::new(&db, &ctx, PackConfig::default())
            .run(&mut NullProgressMonitor)
            .unwrap();
        assert_eq!(report.outcome, RepackOutcome::UpToDate);
    }

    #[test]
    fn missing_head_object_fails_and_rolls_back() {
        let db = InMemoryObjectDatabase::new();
        let refs = InMemoryRefDatabase::new();
        let present = blob(&db, b"present");
        db.insert_pack(&[Blob::new(b"packed".to_vec()).to_stored_object()], PackSource::Insert)
            .unwrap();
        refs.update_ref("refs/heads/main", ObjectId::from_bytes(b"nowhere"), &who(), "c")
            .unwrap();
        refs.update_ref("refs/heads/other", present, &who(), "c").unwrap();
        let before = db.pack_names();

        let ctx = capture(&db, &refs);
        let err = Repacker::new(&db, &ctx, PackConfig::default())
            .run(&mut NullProgressMonitor)
            .unwrap_err();
        assert!(matches!(err, GcError::Pack(_)), "{err:?}");
        assert_eq!(db.pack_names(), before);
    }
}
