//! Progress reporting interface for the worker pool.
//!
//! The sink is concurrency-safe; workers and the writer submit increments
//! through it. High-load mode throttles UI updates when many already-done
//! items are discovered at once, so resumption over a large existing output
//! does not flood the event loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Concurrency-safe progress sink.
pub trait ProgressSink: Send + Sync {
    /// Set or re-target the total item count.
    fn set_total(&self, total: u64);

    /// Record `delta` completed items.
    fn inc(&self, delta: u64);

    /// Enter high-load mode: throttle per-item UI updates.
    fn set_high_load(&self);

    /// Update the auxiliary message (e.g. the formatted ETA).
    fn set_message(&self, _message: &str) {}

    /// Remove/close the progress display.
    fn finish(&self);
}

/// No-op sink for tests and the bulk router's silent pre-checks.
#[derive(Debug, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_high_load(&self) {}
    fn finish(&self) {}
}

/// Recording sink asserting pool behavior in tests.
#[derive(Debug, Default)]
pub struct CountingProgress {
    /// Completed items recorded through [`ProgressSink::inc`].
    pub completed: AtomicU64,
    /// Last total seen.
    pub total: AtomicU64,
    /// Whether high-load mode was entered.
    pub high_load: AtomicBool,
    /// Whether the display was finished.
    pub finished: AtomicBool,
}

impl ProgressSink for CountingProgress {
    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    fn inc(&self, delta: u64) {
        self.completed.fetch_add(delta, Ordering::SeqCst);
    }

    fn set_high_load(&self) {
        self.high_load.store(true, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}
