//! Garbage collection for stow repositories.
//!
//! A [`GarbageCollector`] rewrites the pack set of an
//! [`ObjectDatabase`](stow_pack::ObjectDatabase) and deletes loose objects
//! that nothing can reach anymore.
//!
//! # Repacking
//!
//! One repack snapshots the refs and the current packs, then writes up to
//! three packs inside a single pack transaction:
//!
//! 1. **heads**: everything reachable from `refs/heads/*`
//! 2. **rest**: everything else still live (other refs, reflog entries,
//!    staged index content) not already in the heads pack
//! 3. **garbage**: unreachable objects of the rebuilt packs, copied as
//!    stored so a concurrent writer that is about to reference them does
//!    not lose them
//!
//! The transaction commits only if the pack set is still the one the
//! snapshot saw. Kept packs are neither rebuilt nor retired, and garbage
//! packs at or above the coalesce limit are left in place.
//!
//! # Pruning
//!
//! Loose objects older than the prune expiry are deleted unless a walk from
//! the refs that moved since the last repack, or from recent reflog
//! entries, reaches them.

pub mod classify;
pub mod coalesce;
pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod prune;
pub mod repack;
pub mod stats;

pub use classify::Classification;
pub use coalesce::{should_rebuild, RebuildPlan};
pub use collector::GarbageCollector;
pub use config::{GcConfig, PruneExpire, DEFAULT_COALESCE_GARBAGE_LIMIT};
pub use context::{LastRepack, RunContext};
pub use error::{GcError, GcResult};
pub use prune::PruneScope;
pub use repack::{RepackOutcome, RepackReport, Repacker};
pub use stats::RepoStatistics;
