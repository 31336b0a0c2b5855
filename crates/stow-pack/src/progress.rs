//! Progress reporting and cooperative cancellation for long-running passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Receives progress from pack writing and garbage collection.
///
/// `is_cancelled` is polled between units of work. Returning `true` makes
/// the current operation abort and discard anything not yet committed.
pub trait ProgressMonitor {
    /// Announce the number of tasks that will follow.
    fn start(&mut self, total_tasks: usize);
    /// Begin a named task; `total_work` is `None` when unknown.
    fn begin_task(&mut self, title: &str, total_work: Option<u64>);
    /// Report `completed` more units of work on the current task.
    fn update(&mut self, completed: u64);
    fn end_task(&mut self);
    fn is_cancelled(&self) -> bool;
}

/// Shared cancellation switch.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Discards all progress. Never cancelled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgressMonitor;

impl ProgressMonitor for NullProgressMonitor {
    fn start(&mut self, _total_tasks: usize) {}
    fn begin_task(&mut self, _title: &str, _total_work: Option<u64>) {}
    fn update(&mut self, _completed: u64) {}
    fn end_task(&mut self) {}
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Forwards task boundaries to `tracing` at debug level.
#[derive(Debug, Default)]
pub struct TracingProgressMonitor {
    task: Option<String>,
    done: u64,
    cancel: Option<CancelFlag>,
}

impl TracingProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report cancellation whenever `flag` is set.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Units of work reported on the current (or last) task.
    pub fn completed(&self) -> u64 {
        self.done
    }
}

impl ProgressMonitor for TracingProgressMonitor {
    fn start(&mut self, total_tasks: usize) {
        debug!(total_tasks, "progress started");
    }

    fn begin_task(&mut self, title: &str, total_work: Option<u64>) {
        debug!(task = title, total = ?total_work, "task started");
        self.task = Some(title.to_string());
        self.done = 0;
    }

    fn update(&mut self, completed: u64) {
        self.done += completed;
    }

    fn end_task(&mut self) {
        if let Some(task) = self.task.take() {
            debug!(task = %task, done = self.done, "task finished");
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}
