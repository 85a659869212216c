//! Ordered-concurrent worker pool.
//!
//! One producer feeds a capacity-1 work channel, N workers process cues out
//! of order, and a single writer emits processed items in strictly ascending
//! cue index using a waiting-room reorder buffer. Resumption skips cues
//! whose fingerprint already exists in the tabular output; a first-error
//! capture cancels the whole pool on the first fatal failure.
//!
//! Every channel send and receive is selected against the pool's cancel
//! token so no task blocks after cancellation.

use crate::Result;
use crate::core::subtitle::{Cue, format_timestamp};
use crate::core::worker::dedup::DuplicateChecker;
use crate::core::worker::eta::EtaProvider;
use crate::core::worker::item::{ProcessedItem, RowWriter};
use crate::core::worker::progress::ProgressSink;
use crate::error::SubLingoError;
use async_trait::async_trait;
use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Per-task counters injected into the pool.
#[derive(Debug, Default)]
pub struct TaskCounters {
    /// Live total after skip-set deductions.
    pub total: AtomicUsize,
    /// Items actually processed and written this run.
    pub processed: AtomicUsize,
}

/// The per-cue work a mode performs.
#[async_trait]
pub trait CueProcessor: Send + Sync {
    /// Produce the artifacts for one cue. Implementations must honor the
    /// cancel token in any subprocess or provider call they make.
    async fn process(
        &self,
        index: usize,
        cue: &Cue,
        cancel: &CancellationToken,
    ) -> Result<ProcessedItem>;
}

/// Outcome summary of one pool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOutcome {
    /// Rows emitted this run.
    pub written: usize,
    /// Cues skipped through the resumption fingerprint.
    pub skipped: usize,
    /// Items flagged already-done by the processor.
    pub already_done: usize,
}

/// Ordered-concurrent supervisor over per-cue processing.
pub struct WorkerPool {
    workers: usize,
    progress: Arc<dyn ProgressSink>,
}

impl WorkerPool {
    /// Create a pool with an explicit worker count.
    pub fn new(workers: usize, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            workers: workers.max(1),
            progress,
        }
    }

    /// Run the pool over an ordered cue stream.
    ///
    /// `dedup` is `None` in Condense mode (the fingerprint check is
    /// bypassed); `writer` is `None` when no tabular output is produced.
    pub async fn run(
        &self,
        cues: Vec<Cue>,
        processor: Arc<dyn CueProcessor>,
        dedup: Option<DuplicateChecker>,
        mut writer: Option<Box<dyn RowWriter>>,
        mut eta: Box<dyn EtaProvider>,
        counters: Arc<TaskCounters>,
        cancel: &CancellationToken,
    ) -> Result<PoolOutcome> {
        let total = cues.len();
        counters.total.store(total, Ordering::SeqCst);
        self.progress.set_total(total as u64);
        eta.start(total);

        if total == 0 {
            if let Some(w) = writer.as_mut() {
                w.flush()?;
            }
            self.progress.finish();
            return Ok(PoolOutcome {
                written: 0,
                skipped: 0,
                already_done: 0,
            });
        }

        let pool_cancel = cancel.child_token();
        let first_error: Arc<Mutex<Option<SubLingoError>>> = Arc::new(Mutex::new(None));
        let skip_set: Arc<Mutex<HashSet<usize>>> = Arc::new(Mutex::new(HashSet::new()));

        let (work_tx, work_rx) = mpsc::channel::<(usize, Cue)>(1);
        let (result_tx, mut result_rx) = mpsc::channel::<ProcessedItem>(self.workers);
        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

        // Producer: resumption check, then ordered dispatch.
        let producer = {
            let pool_cancel = pool_cancel.clone();
            let skip_set = Arc::clone(&skip_set);
            let counters = Arc::clone(&counters);
            let progress = Arc::clone(&self.progress);
            tokio::spawn(async move {
                let mut skipped = 0usize;
                for (index, cue) in cues.into_iter().enumerate() {
                    if let Some(checker) = dedup.as_ref() {
                        let fingerprint = format_timestamp(cue.start);
                        if checker.contains(&fingerprint) {
                            // Many consecutive hits flood the UI; throttle it.
                            progress.set_high_load();
                            skip_set.lock().unwrap().insert(index);
                            let live = counters.total.fetch_sub(1, Ordering::SeqCst) - 1;
                            progress.set_total(live as u64);
                            skipped += 1;
                            continue;
                        }
                    }
                    tokio::select! {
                        _ = pool_cancel.cancelled() => break,
                        sent = work_tx.send((index, cue)) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                skipped
            })
        };

        // Workers: pull, process, push; first error wins and cancels.
        let mut worker_handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let processor = Arc::clone(&processor);
            let pool_cancel = pool_cancel.clone();
            let first_error = Arc::clone(&first_error);
            worker_handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = work_rx.lock().await;
                        tokio::select! {
                            _ = pool_cancel.cancelled() => None,
                            job = rx.recv() => job,
                        }
                    };
                    let Some((index, cue)) = job else { break };

                    match processor.process(index, &cue, &pool_cancel).await {
                        Ok(item) => {
                            tokio::select! {
                                _ = pool_cancel.cancelled() => break,
                                sent = result_tx.send(item) => {
                                    if sent.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            let mut slot = first_error.lock().unwrap();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            drop(slot);
                            pool_cancel.cancel();
                            break;
                        }
                    }
                }
            }));
        }
        drop(result_tx);

        // Writer: strictly ascending emission through the waiting room.
        let mut waiting: BTreeMap<usize, ProcessedItem> = BTreeMap::new();
        let mut next_index = 0usize;
        let mut written = 0usize;
        let mut already_done = 0usize;
        let mut last_live = total;

        let advance_over_skips = |next_index: &mut usize, skips: &HashSet<usize>| {
            while skips.contains(next_index) {
                *next_index += 1;
            }
        };

        while let Some(item) = result_rx.recv().await {
            let live = counters.total.load(Ordering::SeqCst);
            if live != last_live {
                eta.retarget(live);
                last_live = live;
            }

            {
                let skips = skip_set.lock().unwrap();
                advance_over_skips(&mut next_index, &skips);
            }

            if item.index == next_index {
                self.emit(
                    item,
                    &mut writer,
                    &mut written,
                    &mut already_done,
                    &counters,
                    eta.as_mut(),
                )?;
                next_index += 1;
                // Drain any in-order arrivals parked earlier.
                loop {
                    {
                        let skips = skip_set.lock().unwrap();
                        advance_over_skips(&mut next_index, &skips);
                    }
                    match waiting.remove(&next_index) {
                        Some(parked) => {
                            self.emit(
                                parked,
                                &mut writer,
                                &mut written,
                                &mut already_done,
                                &counters,
                                eta.as_mut(),
                            )?;
                            next_index += 1;
                        }
                        None => break,
                    }
                }
            } else {
                waiting.insert(item.index, item);
            }
        }

        // Channel closed: drain the waiting room in index order.
        for (_, item) in std::mem::take(&mut waiting) {
            self.emit(
                item,
                &mut writer,
                &mut written,
                &mut already_done,
                &counters,
                eta.as_mut(),
            )?;
        }

        if let Some(w) = writer.as_mut() {
            w.flush()?;
        }
        self.progress.finish();

        let skipped = producer.await.unwrap_or(0);
        futures::future::join_all(worker_handles).await;

        if cancel.is_cancelled() {
            debug!("canceled by user");
            return Err(SubLingoError::Canceled);
        }
        if let Some(err) = first_error.lock().unwrap().take() {
            return Err(err);
        }

        Ok(PoolOutcome {
            written,
            skipped,
            already_done,
        })
    }

    fn emit(
        &self,
        item: ProcessedItem,
        writer: &mut Option<Box<dyn RowWriter>>,
        written: &mut usize,
        already_done: &mut usize,
        counters: &TaskCounters,
        eta: &mut dyn EtaProvider,
    ) -> Result<()> {
        if item.already_done {
            // Counted optimistically at startup; settle the books now.
            *already_done += 1;
            let live = counters.total.fetch_sub(1, Ordering::SeqCst) - 1;
            self.progress.set_total(live as u64);
            return Ok(());
        }
        if let Some(w) = writer.as_mut() {
            w.write_row(&item)?;
        }
        *written += 1;
        counters.processed.fetch_add(1, Ordering::SeqCst);
        self.progress.inc(1);
        if let Some(result) = eta.update(*written) {
            self.progress.set_message(&format!(
                "ETA {:.0}s (±{:.0}s)",
                result.estimate.as_secs_f64(),
                (result.upper - result.lower).as_secs_f64() / 2.0
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::worker::eta::SimpleEta;
    use crate::core::worker::progress::CountingProgress;
    use std::time::Duration;

    fn cues(n: usize) -> Vec<Cue> {
        (0..n)
            .map(|i| Cue {
                start: Duration::from_secs(1 + 3 * i as u64),
                end: Duration::from_secs(3 + 3 * i as u64),
                lines: vec![format!("line {}", i)],
                style: None,
            })
            .collect()
    }

    /// Processor completing after a per-index jittered delay so completion
    /// order differs from dispatch order.
    struct JitterProcessor;

    #[async_trait]
    impl CueProcessor for JitterProcessor {
        async fn process(
            &self,
            index: usize,
            cue: &Cue,
            _cancel: &CancellationToken,
        ) -> Result<ProcessedItem> {
            let delay = (index * 7) % 13;
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            Ok(ProcessedItem {
                index,
                start_time: format_timestamp(cue.start),
                foreign_current: cue.text(),
                ..Default::default()
            })
        }
    }

    /// Row writer recording emitted indices.
    struct RecordingWriter {
        indices: Arc<Mutex<Vec<usize>>>,
    }

    impl RowWriter for RecordingWriter {
        fn write_row(&mut self, item: &ProcessedItem) -> Result<()> {
            self.indices.lock().unwrap().push(item.index);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn recording() -> (Box<dyn RowWriter>, Arc<Mutex<Vec<usize>>>) {
        let indices = Arc::new(Mutex::new(Vec::new()));
        (
            Box::new(RecordingWriter {
                indices: Arc::clone(&indices),
            }),
            indices,
        )
    }

    #[tokio::test]
    async fn test_output_strictly_ascending() {
        let progress = Arc::new(CountingProgress::default());
        let pool = WorkerPool::new(4, progress);
        let (writer, indices) = recording();
        let outcome = pool
            .run(
                cues(40),
                Arc::new(JitterProcessor),
                None,
                Some(writer),
                Box::new(SimpleEta::new()),
                Arc::new(TaskCounters::default()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.written, 40);
        let emitted = indices.lock().unwrap().clone();
        assert_eq!(emitted, (0..40).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_skip_set_complement() {
        let progress = Arc::new(CountingProgress::default());
        let pool = WorkerPool::new(3, progress.clone());
        // pre-seed fingerprints for cues 1 and 3 (starts at 4s and 10s)
        let dedup = DuplicateChecker::from_content(
            "a\t00:00:04,000\tx\nb\t00:00:10,000\ty\n",
            "\t",
        );
        let (writer, indices) = recording();
        let counters = Arc::new(TaskCounters::default());
        let outcome = pool
            .run(
                cues(5),
                Arc::new(JitterProcessor),
                Some(dedup),
                Some(writer),
                Box::new(SimpleEta::new()),
                Arc::clone(&counters),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.written, 3);
        let emitted = indices.lock().unwrap().clone();
        assert_eq!(emitted, vec![0, 2, 4]);
        // live total collapsed by the two skips
        assert_eq!(counters.total.load(Ordering::SeqCst), 3);
        assert!(progress.high_load.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_all_cues_already_processed() {
        let progress = Arc::new(CountingProgress::default());
        let pool = WorkerPool::new(2, progress);
        let dedup = DuplicateChecker::from_content(
            "a\t00:00:01,000\t\nb\t00:00:04,000\t\nc\t00:00:07,000\t\n",
            "\t",
        );
        let (writer, indices) = recording();
        let counters = Arc::new(TaskCounters::default());
        let outcome = pool
            .run(
                cues(3),
                Arc::new(JitterProcessor),
                Some(dedup),
                Some(writer),
                Box::new(SimpleEta::new()),
                Arc::clone(&counters),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.written, 0);
        assert_eq!(outcome.skipped, 3);
        assert!(indices.lock().unwrap().is_empty());
        assert_eq!(counters.total.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_cues_terminates_immediately() {
        let progress = Arc::new(CountingProgress::default());
        let pool = WorkerPool::new(2, progress.clone());
        let outcome = pool
            .run(
                Vec::new(),
                Arc::new(JitterProcessor),
                None,
                None,
                Box::new(SimpleEta::new()),
                Arc::new(TaskCounters::default()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.written, 0);
        assert!(progress.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_single_worker_degrades_gracefully() {
        let progress = Arc::new(CountingProgress::default());
        let pool = WorkerPool::new(1, progress);
        let (writer, indices) = recording();
        let outcome = pool
            .run(
                cues(10),
                Arc::new(JitterProcessor),
                None,
                Some(writer),
                Box::new(SimpleEta::new()),
                Arc::new(TaskCounters::default()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.written, 10);
        assert_eq!(indices.lock().unwrap().clone(), (0..10).collect::<Vec<_>>());
    }

    /// Processor failing on one index.
    struct FailingProcessor {
        fail_at: usize,
    }

    #[async_trait]
    impl CueProcessor for FailingProcessor {
        async fn process(
            &self,
            index: usize,
            cue: &Cue,
            _cancel: &CancellationToken,
        ) -> Result<ProcessedItem> {
            if index == self.fail_at {
                return Err(SubLingoError::provider("mock", "boom"));
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(ProcessedItem {
                index,
                start_time: format_timestamp(cue.start),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_first_error_cancels_pool() {
        let progress = Arc::new(CountingProgress::default());
        let pool = WorkerPool::new(4, progress);
        let err = pool
            .run(
                cues(50),
                Arc::new(FailingProcessor { fail_at: 5 }),
                None,
                None,
                Box::new(SimpleEta::new()),
                Arc::new(TaskCounters::default()),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubLingoError::Provider { .. }));
    }

    #[tokio::test]
    async fn test_external_cancellation_returns_canceled() {
        let progress = Arc::new(CountingProgress::default());
        let pool = WorkerPool::new(2, progress);
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });

        let err = pool
            .run(
                cues(1000),
                Arc::new(JitterProcessor),
                None,
                None,
                Box::new(SimpleEta::new()),
                Arc::new(TaskCounters::default()),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(err.is_canceled());
    }

    /// Processor marking even indices already-done.
    struct AlreadyDoneProcessor;

    #[async_trait]
    impl CueProcessor for AlreadyDoneProcessor {
        async fn process(
            &self,
            index: usize,
            cue: &Cue,
            _cancel: &CancellationToken,
        ) -> Result<ProcessedItem> {
            Ok(ProcessedItem {
                index,
                start_time: format_timestamp(cue.start),
                already_done: index % 2 == 0,
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_already_done_items_not_written() {
        let progress = Arc::new(CountingProgress::default());
        let pool = WorkerPool::new(3, progress);
        let (writer, indices) = recording();
        let counters = Arc::new(TaskCounters::default());
        let outcome = pool
            .run(
                cues(10),
                Arc::new(AlreadyDoneProcessor),
                None,
                Some(writer),
                Box::new(SimpleEta::new()),
                Arc::clone(&counters),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.already_done, 5);
        assert_eq!(outcome.written, 5);
        let emitted = indices.lock().unwrap().clone();
        assert_eq!(emitted, vec![1, 3, 5, 7, 9]);
        assert_eq!(counters.total.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_rerun_with_dedup_produces_no_duplicates() {
        // First run writes rows; a second run over the same output skips all.
        let progress = Arc::new(CountingProgress::default());
        let pool = WorkerPool::new(2, progress);

        let temp = tempfile::TempDir::new().unwrap();
        let out = temp.path().join("out.tsv");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&out)
            .unwrap();
        let writer = Box::new(crate::core::worker::item::TabularRowWriter::new(
            std::io::BufWriter::new(file),
            "\t",
        ));
        let dedup = DuplicateChecker::from_file(&out, "\t").unwrap();
        pool.run(
            cues(4),
            Arc::new(JitterProcessor),
            Some(dedup),
            Some(writer),
            Box::new(SimpleEta::new()),
            Arc::new(TaskCounters::default()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let first = std::fs::read_to_string(&out).unwrap();
        assert_eq!(first.lines().count(), 4);

        let file = std::fs::OpenOptions::new().append(true).open(&out).unwrap();
        let writer = Box::new(crate::core::worker::item::TabularRowWriter::new(
            std::io::BufWriter::new(file),
            "\t",
        ));
        let dedup = DuplicateChecker::from_file(&out, "\t").unwrap();
        let outcome = pool
            .run(
                cues(4),
                Arc::new(JitterProcessor),
                Some(dedup),
                Some(writer),
                Box::new(SimpleEta::new()),
                Arc::new(TaskCounters::default()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.skipped, 4);
        assert_eq!(outcome.written, 0);
        let second = std::fs::read_to_string(&out).unwrap();
        assert_eq!(second, first);
    }
}
