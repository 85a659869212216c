//! Bulk routing: walk a directory tree, pre-check each container, and run
//! one task per file sequentially.
//!
//! `.media` subdirectories are outputs of earlier runs and are skipped.
//! An abort-task failure logs and moves on to the next file; abort-all and
//! cancellation stop the run.

use crate::Result;
use crate::config::Config as AppConfig;
use crate::core::media::probe::MediaProbe;
use crate::core::pipeline::task::{Task, TaskConfig};
use crate::core::pipeline::{TaskHandler, TelemetrySink};
use crate::core::scanner::{CandidateScanner, CandidateSource};
use crate::core::media::FfmpegDriver;
use crate::core::subtitle::SubtitleDocument;
use crate::error::{ErrorBehavior, SubLingoError};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Container extensions the router considers.
const CONTAINER_EXTENSIONS: [&str; 6] = ["mp4", "mkv", "avi", "mov", "m4v", "webm"];

/// One enqueued task with its pre-counted items.
#[derive(Debug)]
pub struct QueuedTask {
    /// The per-file task configuration.
    pub config: TaskConfig,
    /// Filtered item count when it could be determined up front.
    pub item_count: Option<usize>,
}

/// Summary of a bulk run.
#[derive(Debug, Default)]
pub struct BulkReport {
    /// Tasks that completed.
    pub succeeded: usize,
    /// Tasks that failed with abort-task and were skipped.
    pub failed: usize,
    /// Files rejected by the integrity pre-check.
    pub rejected: usize,
}

/// Directory-tree task router.
pub struct BulkRouter {
    app: AppConfig,
    handler: Arc<dyn TaskHandler>,
    telemetry: Arc<dyn TelemetrySink>,
    factory: Arc<crate::services::factory::ProviderFactory>,
}

impl BulkRouter {
    /// Create a router sharing the hosting program's handler, telemetry,
    /// and provider factory.
    pub fn new(
        app: AppConfig,
        handler: Arc<dyn TaskHandler>,
        telemetry: Arc<dyn TelemetrySink>,
        factory: Arc<crate::services::factory::ProviderFactory>,
    ) -> Self {
        Self {
            app,
            handler,
            telemetry,
            factory,
        }
    }

    /// Enumerate candidate containers under `root`, skipping `.media`
    /// output directories.
    pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.ends_with(".media")))
        });
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default();
            if CONTAINER_EXTENSIONS.contains(&ext.as_str()) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Build the task queue: integrity pre-check, subtitle location, item
    /// counting.
    pub async fn build_queue(
        &self,
        root: &Path,
        template: &TaskConfig,
        cancel: &CancellationToken,
    ) -> Result<(Vec<QueuedTask>, usize)> {
        let probe = MediaProbe::new(self.app.binaries.probe.clone());
        let scanner = CandidateScanner::new(FfmpegDriver::new(self.app.binaries.transmuxer.clone()));
        let mut queue = Vec::new();
        let mut rejected = 0usize;

        for path in Self::discover(root)? {
            if cancel.is_cancelled() {
                return Err(SubLingoError::Canceled);
            }
            let info = match probe.probe(&path, cancel).await {
                Ok(info) => info,
                Err(SubLingoError::Canceled) => return Err(SubLingoError::Canceled),
                Err(e) => {
                    warn!("integrity pre-check failed for {}: {}", path.display(), e);
                    rejected += 1;
                    continue;
                }
            };

            // Locate the target subtitle now so unmatchable files fail fast.
            let item_count = match &template.target_language {
                Some(target) => {
                    match scanner
                        .scan(&path, &info)
                        .and_then(|c| scanner.select(&c, target, template.native_language.as_ref()))
                    {
                        Ok(selection) => count_items(&selection.target.source),
                        Err(e) => {
                            warn!("skipping {}: {}", path.display(), e);
                            rejected += 1;
                            continue;
                        }
                    }
                }
                None => None,
            };

            let mut config = template.clone();
            config.media_path = path;
            queue.push(QueuedTask { config, item_count });
        }
        Ok((queue, rejected))
    }

    /// Walk `root` and run one task per container sequentially with an
    /// aggregated progress bar.
    pub async fn run(
        &self,
        root: &Path,
        template: &TaskConfig,
        cancel: &CancellationToken,
    ) -> Result<BulkReport> {
        let (queue, rejected) = self.build_queue(root, template, cancel).await?;
        let mut report = BulkReport {
            rejected,
            ..Default::default()
        };

        let progress = self.handler.progress();
        progress.set_total(queue.len() as u64);

        for queued in queue {
            if cancel.is_cancelled() {
                return Err(SubLingoError::Canceled);
            }
            let path = queued.config.media_path.clone();
            let mut task = Task::new(
                queued.config,
                self.app.clone(),
                Arc::clone(&self.handler),
                Arc::clone(&self.telemetry),
                Arc::clone(&self.factory),
            );
            match task.execute(cancel).await {
                Ok(task_report) => {
                    info!(
                        "{}: {} written, {} skipped",
                        path.display(),
                        task_report.written,
                        task_report.skipped
                    );
                    report.succeeded += 1;
                }
                Err(e) if e.is_canceled() => return Err(e),
                Err(e) => match e.behavior() {
                    ErrorBehavior::AbortAll => return Err(e),
                    _ => {
                        warn!("{}: {}", path.display(), e.user_friendly_message());
                        report.failed += 1;
                    }
                },
            }
            progress.inc(1);
        }
        progress.finish();
        Ok(report)
    }
}

/// Count filtered items for a standalone candidate; embedded tracks are
/// counted after extraction by the task itself.
fn count_items(source: &CandidateSource) -> Option<usize> {
    match source {
        CandidateSource::Standalone(path) => {
            SubtitleDocument::open(path).ok().map(|doc| doc.item_count())
        }
        CandidateSource::Embedded { .. } => None,
    }
}
