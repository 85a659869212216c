//! Ordered-concurrent per-cue processing.
//!
//! The [`pool`] module hosts the supervisor (producer, N workers, single
//! ordered writer, first-error capture); [`dedup`] provides the resumption
//! fingerprint check; [`eta`] the estimators consulted by the writer;
//! [`item`] the processed-item model and row writer; [`progress`] the
//! concurrency-safe progress sink.

pub mod dedup;
pub mod eta;
pub mod item;
pub mod pool;
pub mod progress;

pub use dedup::DuplicateChecker;
pub use eta::{EtaProvider, EtaResult, SimpleEta, StatisticalEta};
pub use item::{ProcessedItem, RowWriter, TabularRowWriter};
pub use pool::{CueProcessor, PoolOutcome, TaskCounters, WorkerPool};
pub use progress::{NoopProgress, ProgressSink};
