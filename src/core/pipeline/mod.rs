//! Task pipeline: mode-gated orchestration of the processing stages.
//!
//! [`task`] hosts the per-file executor; [`outputs`] the artifact registry
//! and container merger; [`intermediary`] the retention-policy file manager;
//! [`bulk`] the directory router. The handler and telemetry interfaces are
//! defined here: both are owned by the hosting program and passed in, so
//! nothing in the pipeline reaches for process-wide state.

use crate::core::worker::progress::{NoopProgress, ProgressSink};
use std::path::PathBuf;
use std::sync::Arc;

pub mod bulk;
pub mod intermediary;
pub mod outputs;
pub mod task;

pub use bulk::BulkRouter;
pub use intermediary::IntermediaryManager;
pub use outputs::{MergeResult, Merger, OutputKind, OutputRecord, OutputRegistry};
pub use task::{Task, TaskConfig, TaskMode, TaskReport};

/// Host-application handler passed into every task.
///
/// `output_file_path` is a required method; hosts without an override
/// return `None`.
pub trait TaskHandler: Send + Sync {
    /// The progress sink for this task's worker pool.
    fn progress(&self) -> Arc<dyn ProgressSink>;

    /// Optional override for the tabular output file location.
    fn output_file_path(&self) -> Option<PathBuf>;

    /// Ask the user whether speech-to-text should proceed even though
    /// CC/dubtitle artifacts already exist. A synchronous prompt; `false`
    /// stops the run.
    fn confirm_stt_replacement(&self, message: &str) -> bool;
}

/// Handler with no UI: silent progress, no path override, always confirms.
#[derive(Debug, Default)]
pub struct NoopHandler;

impl TaskHandler for NoopHandler {
    fn progress(&self) -> Arc<dyn ProgressSink> {
        Arc::new(NoopProgress)
    }

    fn output_file_path(&self) -> Option<PathBuf> {
        None
    }

    fn confirm_stt_replacement(&self, _message: &str) -> bool {
        true
    }
}

/// Side-channel sink for phase-boundary state snapshots (crash reporting).
/// Not part of the processing contract.
pub trait TelemetrySink: Send + Sync {
    /// Record a named snapshot at a phase boundary.
    fn snapshot(&self, phase: &str, detail: &str);
}

/// Telemetry sink that drops everything.
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn snapshot(&self, _phase: &str, _detail: &str) {}
}
