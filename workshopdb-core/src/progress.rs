//! Structured progress events
//!
//! The engine never prints. It emits `{phase, done, total}` events through
//! an injectable sink so any consumer (CLI, log file, GUI) can format them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pipeline phase a progress counter belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Crawling,
    Diffing,
    Fetching,
    AttachingDeps,
    Writing,
}

/// A single progress report from the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Counter update for one phase, e.g. crawl `[page/pages]`
    Phase {
        phase: SyncPhase,
        done: u64,
        total: u64,
    },
    /// Incremental-mode classification summary
    Summary { new: u64, changed: u64, deleted: u64 },
}

/// Receives progress events
///
/// Implementations must be cheap; the engine calls this between network
/// round trips on its own worker.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Default sink so the engine is usable headlessly
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Cooperative cancellation flag
///
/// Checked between crawl pages and between fetch/attach batches. A
/// cancelled run fails with [`SyncError::Cancelled`] before anything is
/// written.
///
/// [`SyncError::Cancelled`]: crate::error::SyncError::Cancelled
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();

        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
