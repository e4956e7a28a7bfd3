//! Job orchestration module.
//!
//! This module provides the main job lifecycle functions:
//! - Creating a job from source/destination paths, ignore patterns and an operation
//! - Planning a job (scanning the source tree)
//! - Running a job (scan, batched transfer, cleanup) synchronously
//! - Spawning a job on a background thread and controlling it through a [`JobHandle`]

use std::path::Path;
use std::thread::{self, JoinHandle};

use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver};
use tracing::{error, info};
use uuid::Uuid;

use crate::batch::{self, BatchRun};
use crate::checksums::ChecksumAlgorithm;
use crate::cleanup;
use crate::error::EngineError;
use crate::ignore::IgnoreRules;
use crate::model::{CancelFlag, JobOutcome, JobReport, JobState, Operation, TransferJob};
use crate::progress::{
    ChannelProgress, ProgressCallback, ProgressReporter, TransferEvent, STATUS_CLEANUP,
    STATUS_SCANNING,
};
use crate::scan::{self, DEFAULT_MAX_DEPTH};
use crate::transfer::{FileTransfer, FsTransfer, RetryPolicy};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_WORKERS: usize = 4;

/// Tunables for a job run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOptions {
    /// Work items per batch
    pub batch_size: usize,
    /// Concurrent file transfers within a batch
    pub workers: usize,
    /// Scan depth limit, in path components below the source root
    pub max_depth: usize,
    /// Per-file retry schedule
    pub retry: RetryPolicy,
    /// Verify copies with this algorithm
    pub verify: Option<ChecksumAlgorithm>,
}

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
            max_depth: DEFAULT_MAX_DEPTH,
            retry: RetryPolicy::default(),
            verify: None,
        }
    }
}

impl JobOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_verify(mut self, verify: Option<ChecksumAlgorithm>) -> Self {
        self.verify = verify;
        self
    }
}

/// Create a new transfer job.
///
/// The operation is validated before anything else and no filesystem access
/// happens here; a missing source surfaces when the job runs.
///
/// # Errors
/// `EngineError::InvalidOperation` for anything but `copy`/`move`,
/// `EngineError::InvalidPath` for empty paths or a destination spelled the
/// same as the source, and
/// `EngineError::InvalidPatterns` if the ignore rules cannot be compiled.
pub fn create_job<P, Q, I, S>(
    source: P,
    destination: Q,
    ignore_patterns: I,
    operation: &str,
) -> Result<TransferJob, EngineError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let operation: Operation = operation.parse()?;
    let source = source.as_ref();
    let destination = destination.as_ref();

    if source.as_os_str().is_empty() {
        return Err(EngineError::InvalidPath {
            path: source.to_path_buf(),
            reason: "Source path is empty".to_string(),
        });
    }
    if destination.as_os_str().is_empty() {
        return Err(EngineError::InvalidPath {
            path: destination.to_path_buf(),
            reason: "Destination path is empty".to_string(),
        });
    }
    if source == destination {
        return Err(EngineError::InvalidPath {
            path: destination.to_path_buf(),
            reason: "Destination is the source directory".to_string(),
        });
    }

    Ok(TransferJob {
        id: Uuid::new_v4(),
        operation,
        source_root: source.to_path_buf(),
        destination_root: destination.to_path_buf(),
        rules: IgnoreRules::new(ignore_patterns)?,
        items: Vec::new(),
        state: JobState::Idle,
        processed_count: 0,
        total_count: 0,
        failed_count: 0,
        removed_dirs: 0,
        cancel: CancelFlag::new(),
        created_at: Utc::now(),
        start_time: None,
        end_time: None,
    })
}

/// Plan a job by scanning the source tree.
///
/// Populates `job.items` and fixes `job.total_count`.
///
/// # Returns
/// `true` if the scan was cut short by cancellation
pub fn plan_job(job: &mut TransferJob, max_depth: usize) -> Result<bool, EngineError> {
    if job.state != JobState::Idle {
        return Err(EngineError::NotIdle { state: job.state });
    }

    job.state = JobState::Scanning;
    let result = scan::scan(job, max_depth)?;
    job.items = result.items;
    job.total_count = job.file_count();

    Ok(result.cancelled)
}

/// Run a job with the filesystem transfer.
///
/// See [`run_job_with`].
pub fn run_job(
    job: &mut TransferJob,
    options: &JobOptions,
    progress_callback: Option<&dyn ProgressCallback>,
) -> JobOutcome {
    let transfer = FsTransfer::new(options.verify);
    run_job_with(job, options, &transfer, progress_callback)
}

/// Run a job to a terminal state on the current thread.
///
/// Scans, transfers in batches, and for moves removes emptied source
/// directories. Individual item failures are reported through the callback
/// and do NOT stop the job. A job-level failure is reported once through
/// `on_error`; `on_finished` is only invoked for a completed run.
pub fn run_job_with(
    job: &mut TransferJob,
    options: &JobOptions,
    transfer: &dyn FileTransfer,
    progress_callback: Option<&dyn ProgressCallback>,
) -> JobOutcome {
    if job.state != JobState::Idle {
        return JobOutcome::Failed(EngineError::NotIdle { state: job.state });
    }

    let mut reporter = ProgressReporter::new(progress_callback);
    job.start_time = Some(Utc::now());
    info!(
        job_id = %job.id,
        src = %job.source_root.display(),
        dst = %job.destination_root.display(),
        operation = %job.operation,
        "starting transfer job"
    );

    let outcome = match execute(job, options, transfer, &mut reporter) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(job_id = %job.id, error = %e, "transfer job failed");
            reporter.error(&e.to_string());
            JobOutcome::Failed(e)
        }
    };

    job.state = match outcome {
        JobOutcome::Completed => JobState::Completed,
        JobOutcome::Cancelled => JobState::Cancelled,
        JobOutcome::Failed(_) => JobState::Failed,
    };
    job.end_time = Some(Utc::now());
    info!(
        job_id = %job.id,
        state = ?job.state,
        processed = job.processed_count,
        total = job.total_count,
        failed = job.failed_count,
        "transfer job ended"
    );

    outcome
}

fn execute(
    job: &mut TransferJob,
    options: &JobOptions,
    transfer: &dyn FileTransfer,
    reporter: &mut ProgressReporter<'_>,
) -> Result<JobOutcome, EngineError> {
    reporter.status(STATUS_SCANNING);
    let scan_cancelled = plan_job(job, options.max_depth)?;
    if scan_cancelled || job.cancel.is_cancelled() {
        return Ok(JobOutcome::Cancelled);
    }
    if job.total_count == 0 {
        return Err(EngineError::NothingToTransfer);
    }

    job.state = JobState::BatchProcessing;
    if batch::run_batches(job, options, transfer, reporter)? == BatchRun::Cancelled {
        return Ok(JobOutcome::Cancelled);
    }
    if job.cancel.is_cancelled() {
        return Ok(JobOutcome::Cancelled);
    }

    if job.operation == Operation::Move {
        job.state = JobState::Cleanup;
        reporter.status(STATUS_CLEANUP);
        job.removed_dirs = cleanup::remove_empty_dirs(&job.source_root);
    }

    reporter.finished();
    Ok(JobOutcome::Completed)
}

/// A job running on its own background thread.
///
/// Notifications arrive on [`JobHandle::events`]; the channel closes when the
/// job thread ends.
pub struct JobHandle {
    id: Uuid,
    cancel: CancelFlag,
    events: Receiver<TransferEvent>,
    thread: JoinHandle<JobReport>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the job to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn events(&self) -> &Receiver<TransferEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the job thread ends.
    pub fn wait(self) -> JobReport {
        match self.thread.join() {
            Ok(report) => report,
            Err(_) => JobReport {
                id: self.id,
                outcome: JobOutcome::Failed(EngineError::WorkerPanicked),
                processed: 0,
                total: 0,
                failed: 0,
                removed_dirs: 0,
                started_at: None,
                finished_at: Some(Utc::now()),
            },
        }
    }
}

/// Run a job on a background thread with the filesystem transfer.
pub fn spawn_job(job: TransferJob, options: JobOptions) -> JobHandle {
    let transfer = FsTransfer::new(options.verify);
    spawn_job_with(job, options, Box::new(transfer))
}

/// Run a job on a background thread with a custom transfer implementation.
pub fn spawn_job_with(
    mut job: TransferJob,
    options: JobOptions,
    transfer: Box<dyn FileTransfer>,
) -> JobHandle {
    let (tx, rx) = unbounded();
    let id = job.id;
    let cancel = job.cancel.clone();

    let thread = thread::spawn(move || {
        let progress = ChannelProgress::new(tx);
        let outcome = run_job_with(
            &mut job,
            &options,
            transfer.as_ref(),
            Some(&progress as &dyn ProgressCallback),
        );
        JobReport::from_job(&job, outcome)
    });

    JobHandle {
        id,
        cancel,
        events: rx,
        thread,
    }
}
