//! Batched execution of scanned work items.
//!
//! The work list is cut into fixed-size batches that run one after another.
//! Within a batch, directory items are created in order on the calling thread
//! and file items are handed to a small pool of scoped worker threads. Every
//! dispatched file settles before the next batch starts, so progress is
//! accounted for on a single thread and always in dispatch order.

use std::thread;

use crossbeam_channel::{bounded, unbounded};
use tracing::{debug, error};

use crate::error::EngineError;
use crate::fs_ops;
use crate::job::JobOptions;
use crate::model::{CancelFlag, Operation, TransferJob, TransferOutcome, WorkItem};
use crate::progress::ProgressReporter;
use crate::transfer::{transfer_with_retry, FileTransfer, RetryPolicy};

/// How the batch phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRun {
    /// Every batch settled
    Completed,
    /// Cancellation stopped dispatch before the work list was exhausted
    Cancelled,
}

/// Drive all of the job's work items through the worker pool.
///
/// Per-item failures are reported through `reporter` and counted in
/// `job.failed_count`; they never stop the run.
///
/// # Errors
/// Returns `EngineError::WorkerPanicked` if a worker thread panics, and any
/// error that is not scoped to a single item (see
/// [`EngineError::is_item_error`]) once the batch it surfaced in has settled.
pub fn run_batches(
    job: &mut TransferJob,
    options: &JobOptions,
    transfer: &dyn FileTransfer,
    reporter: &ProgressReporter<'_>,
) -> Result<BatchRun, EngineError> {
    let items = std::mem::take(&mut job.items);
    let result = drive(job, &items, options, transfer, reporter);
    job.items = items;
    result
}

fn drive(
    job: &mut TransferJob,
    items: &[WorkItem],
    options: &JobOptions,
    transfer: &dyn FileTransfer,
    reporter: &ProgressReporter<'_>,
) -> Result<BatchRun, EngineError> {
    let batch_size = options.batch_size.max(1);

    for (batch_index, batch) in items.chunks(batch_size).enumerate() {
        if job.cancel.is_cancelled() {
            debug!(job_id = %job.id, batch = batch_index, "cancelled before batch");
            return Ok(BatchRun::Cancelled);
        }
        debug!(job_id = %job.id, batch = batch_index, items = batch.len(), "starting batch");

        let mut files = Vec::with_capacity(batch.len());
        for item in batch {
            if !item.is_dir {
                files.push(item);
                continue;
            }
            match fs_ops::create_directory(&item.destination_path) {
                Ok(()) => {}
                Err(e) if e.is_item_error() => {
                    error!(job_id = %job.id, error = %e, "directory creation failed");
                    reporter.error(&e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        let settled = run_file_batch(
            &files,
            job.operation,
            &job.cancel,
            transfer,
            &options.retry,
            options.workers,
        )?;

        debug!(
            job_id = %job.id,
            batch = batch_index,
            failed = settled.outcomes.iter().filter(|o| !o.is_success()).count(),
            "batch settled"
        );
        for outcome in settled.outcomes {
            if let TransferOutcome::Failure(reason) = outcome {
                job.failed_count += 1;
                reporter.error(&reason);
            }
            reporter.item_settled(job);
        }

        if let Some(e) = settled.fatal {
            return Err(e);
        }
        if settled.interrupted {
            debug!(job_id = %job.id, batch = batch_index, "cancelled during dispatch");
            return Ok(BatchRun::Cancelled);
        }
    }

    Ok(BatchRun::Completed)
}

/// Outcomes of one batch's file items, in dispatch order.
struct SettledBatch {
    outcomes: Vec<TransferOutcome>,
    /// Cancellation stopped dispatch before every file was handed out
    interrupted: bool,
    /// First error that is not scoped to its item
    fatal: Option<EngineError>,
}

fn run_file_batch(
    files: &[&WorkItem],
    operation: Operation,
    cancel: &CancelFlag,
    transfer: &dyn FileTransfer,
    retry: &RetryPolicy,
    workers: usize,
) -> Result<SettledBatch, EngineError> {
    if files.is_empty() {
        return Ok(SettledBatch {
            outcomes: Vec::new(),
            interrupted: false,
            fatal: None,
        });
    }

    let workers = workers.clamp(1, files.len());
    let (work_tx, work_rx) = bounded::<(usize, &WorkItem)>(workers);
    let (done_tx, done_rx) = unbounded::<(usize, Result<(), EngineError>)>();

    let mut dispatched = 0;
    let mut interrupted = false;

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let work_rx = work_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for (index, item) in work_rx.iter() {
                        let result = transfer_with_retry(transfer, item, operation, retry);
                        if let Err(e) = &result {
                            error!(src = %item.source_path.display(), error = %e, "transfer failed after retries");
                        }
                        if done_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        // Only the workers hold receivers now, so dispatch fails fast if they all die
        drop(work_rx);

        for (index, item) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            if work_tx.send((index, *item)).is_err() {
                break;
            }
            dispatched += 1;
        }
        drop(work_tx);

        let mut panicked = false;
        for handle in handles {
            panicked |= handle.join().is_err();
        }
        if panicked {
            Err(EngineError::WorkerPanicked)
        } else {
            Ok(())
        }
    })?;
    drop(done_tx);

    let mut slots: Vec<Option<Result<(), EngineError>>> =
        (0..dispatched).map(|_| None).collect();
    for (index, result) in done_rx.iter() {
        slots[index] = Some(result);
    }

    let mut outcomes = Vec::with_capacity(dispatched);
    let mut fatal = None;
    for (index, result) in slots.into_iter().enumerate() {
        match result {
            Some(Ok(())) => outcomes.push(TransferOutcome::Success),
            Some(Err(e)) if e.is_item_error() => outcomes.push(TransferOutcome::Failure(format!(
                "Error transferring {}: {}",
                files[index].source_path.display(),
                e
            ))),
            Some(Err(e)) => {
                if fatal.is_none() {
                    fatal = Some(e);
                }
            }
            None => {}
        }
    }

    Ok(SettledBatch {
        outcomes,
        interrupted,
        fatal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::create_job;
    use crate::progress::{ProgressCallback, RecordingProgress, TransferEvent};
    use std::collections::HashMap;
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn options(batch_size: usize, workers: usize) -> JobOptions {
        JobOptions {
            batch_size,
            workers,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
            },
            ..JobOptions::default()
        }
    }

    fn job_with_files(root: &Path, names: &[&str]) -> TransferJob {
        let src = root.join("src");
        let dst = root.join("dst");
        let mut job = create_job(&src, &dst, &["*.skip"], "copy").expect("Failed to create job");
        job.items.push(WorkItem::directory(src.clone(), dst.clone()));
        for name in names {
            job.items.push(WorkItem::file(src.join(name), dst.join(name)));
        }
        job.total_count = job.file_count();
        job
    }

    /// Fails the first `failures[name]` attempts for each file, then succeeds.
    struct FlakyTransfer {
        failures: HashMap<PathBuf, usize>,
        attempts: Mutex<HashMap<PathBuf, usize>>,
    }

    impl FlakyTransfer {
        fn new(failures: &[(&Path, usize)]) -> Self {
            FlakyTransfer {
                failures: failures.iter().map(|(p, n)| (p.to_path_buf(), *n)).collect(),
                attempts: Mutex::new(HashMap::new()),
            }
        }

        fn attempts(&self, path: &Path) -> usize {
            self.attempts.lock().unwrap().get(path).copied().unwrap_or(0)
        }
    }

    impl FileTransfer for FlakyTransfer {
        fn transfer(&self, item: &WorkItem, _operation: Operation) -> Result<(), EngineError> {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(item.source_path.clone()).or_insert(0);
            *count += 1;
            let allowed_failures = self.failures.get(&item.source_path).copied().unwrap_or(0);
            if *count <= allowed_failures {
                return Err(EngineError::WriteError {
                    path: item.destination_path.clone(),
                    source: io::Error::new(io::ErrorKind::Other, "device busy"),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_item_succeeding_on_third_attempt_reports_no_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut job = job_with_files(temp_dir.path(), &["a.txt"]);
        let target = job.items[1].source_path.clone();
        let transfer = FlakyTransfer::new(&[(&target, 2)]);

        let recorder = RecordingProgress::default();
        let reporter = ProgressReporter::new(Some(&recorder as &dyn ProgressCallback));
        let run = run_batches(&mut job, &options(100, 4), &transfer, &reporter).expect("Batch run failed");

        assert_eq!(run, BatchRun::Completed);
        assert_eq!(transfer.attempts(&target), 3);
        assert_eq!(job.processed_count, 1);
        assert_eq!(job.failed_count, 0);
        assert_eq!(recorder.events(), vec![TransferEvent::Progress(100)]);
    }

    #[test]
    fn test_exhausted_item_reports_one_error_and_job_continues() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut job = job_with_files(temp_dir.path(), &["bad.txt", "good.txt"]);
        let bad = job.items[1].source_path.clone();
        let good = job.items[2].source_path.clone();
        let transfer = FlakyTransfer::new(&[(&bad, usize::MAX)]);

        let recorder = RecordingProgress::default();
        let reporter = ProgressReporter::new(Some(&recorder as &dyn ProgressCallback));
        let run = run_batches(&mut job, &options(100, 2), &transfer, &reporter).expect("Batch run failed");

        assert_eq!(run, BatchRun::Completed);
        assert_eq!(transfer.attempts(&bad), 3);
        assert_eq!(transfer.attempts(&good), 1);
        assert_eq!(job.failed_count, 1);
        assert_eq!(job.processed_count, 2);

        let events = recorder.events();
        let errors: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, TransferEvent::Error(_)))
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], TransferEvent::Error(msg) if msg.contains("bad.txt")));
        assert_eq!(events.last(), Some(&TransferEvent::Progress(100)));
    }

    #[test]
    fn test_progress_is_monotonic_across_batches() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let names: Vec<String> = (0..7).map(|i| format!("f{}.txt", i)).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let mut job = job_with_files(temp_dir.path(), &refs);
        let transfer = FlakyTransfer::new(&[]);

        let recorder = RecordingProgress::default();
        let reporter = ProgressReporter::new(Some(&recorder as &dyn ProgressCallback));
        run_batches(&mut job, &options(3, 2), &transfer, &reporter).expect("Batch run failed");

        let percents: Vec<u8> = recorder
            .events()
            .into_iter()
            .filter_map(|e| match e {
                TransferEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(percents.len(), 7);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.iter().filter(|p| **p == 100).count(), 1);
        assert_eq!(*percents.last().unwrap(), 100);
    }

    /// Tracks how many transfers run at the same time.
    struct SlowTransfer {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FileTransfer for SlowTransfer {
        fn transfer(&self, _item: &WorkItem, _operation: Operation) -> Result<(), EngineError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_worker_pool_bounds_concurrency() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let names: Vec<String> = (0..12).map(|i| format!("f{}.txt", i)).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let mut job = job_with_files(temp_dir.path(), &refs);
        let transfer = SlowTransfer {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };

        let reporter = ProgressReporter::new(None);
        run_batches(&mut job, &options(100, 3), &transfer, &reporter).expect("Batch run failed");

        assert!(transfer.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(job.processed_count, 12);
    }

    /// Requests cancellation from inside the first transfer.
    struct CancellingTransfer {
        cancel: CancelFlag,
        calls: AtomicUsize,
    }

    impl FileTransfer for CancellingTransfer {
        fn transfer(&self, _item: &WorkItem, _operation: Operation) -> Result<(), EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cancel.cancel();
            Ok(())
        }
    }

    #[test]
    fn test_cancellation_stops_next_batch() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut job = job_with_files(temp_dir.path(), &["a.txt", "b.txt", "c.txt"]);
        let transfer = CancellingTransfer {
            cancel: job.cancel.clone(),
            calls: AtomicUsize::new(0),
        };

        // Directory item plus one file per batch
        let reporter = ProgressReporter::new(None);
        let run = run_batches(&mut job, &options(2, 1), &transfer, &reporter).expect("Batch run failed");

        assert_eq!(run, BatchRun::Cancelled);
        assert_eq!(transfer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(job.processed_count, 1);
        assert_eq!(job.items.len(), 4, "work items are restored after the run");
    }

    #[test]
    fn test_directory_creation_failure_is_reported_and_skipped() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").expect("Failed to write file");

        let mut job = job_with_files(temp_dir.path(), &["a.txt"]);
        job.items
            .insert(1, WorkItem::directory(temp_dir.path().join("src/sub"), blocker.join("sub")));
        let transfer = FlakyTransfer::new(&[]);

        let recorder = RecordingProgress::default();
        let reporter = ProgressReporter::new(Some(&recorder as &dyn ProgressCallback));
        let run = run_batches(&mut job, &options(100, 4), &transfer, &reporter).expect("Batch run failed");

        assert_eq!(run, BatchRun::Completed);
        let events = recorder.events();
        assert!(matches!(&events[0], TransferEvent::Error(msg) if msg.contains("Error creating directory")));
        assert_eq!(events.last(), Some(&TransferEvent::Progress(100)));
    }

    struct PanickingTransfer;

    impl FileTransfer for PanickingTransfer {
        fn transfer(&self, _item: &WorkItem, _operation: Operation) -> Result<(), EngineError> {
            panic!("worker exploded");
        }
    }

    #[test]
    fn test_worker_panic_becomes_engine_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut job = job_with_files(temp_dir.path(), &["a.txt", "b.txt"]);

        let reporter = ProgressReporter::new(None);
        let result = run_batches(&mut job, &options(100, 2), &PanickingTransfer, &reporter);

        assert!(matches!(result, Err(EngineError::WorkerPanicked)));
    }

    /// Rejects one file with an error that is not scoped to its item.
    struct RejectingTransfer {
        rejected: PathBuf,
    }

    impl FileTransfer for RejectingTransfer {
        fn transfer(&self, item: &WorkItem, _operation: Operation) -> Result<(), EngineError> {
            if item.source_path == self.rejected {
                return Err(EngineError::InvalidPath {
                    path: item.source_path.clone(),
                    reason: "rejected by transfer".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_job_level_error_stops_after_batch_settles() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut job = job_with_files(temp_dir.path(), &["a.txt", "bad.txt", "c.txt", "d.txt"]);
        let transfer = RejectingTransfer {
            rejected: temp_dir.path().join("src/bad.txt"),
        };

        let recorder = RecordingProgress::default();
        let reporter = ProgressReporter::new(Some(&recorder as &dyn ProgressCallback));
        let result = run_batches(&mut job, &options(4, 2), &transfer, &reporter);

        assert!(matches!(result, Err(EngineError::InvalidPath { .. })));
        // Siblings in the same batch still settle; nothing is counted as an item failure
        assert_eq!(job.processed_count, 2);
        assert_eq!(job.failed_count, 0);
        assert!(!recorder
            .events()
            .iter()
            .any(|e| matches!(e, TransferEvent::Error(_))));
    }
}
