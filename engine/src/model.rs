//! Core data model for transfer jobs.
//!
//! This module defines the main data structures for representing transfer operations:
//! - TransferJob: the entire copy/move operation
//! - WorkItem: a single "create this directory" or "transfer this file" unit
//! - Operation, JobState, JobOutcome: enums controlling and describing a run
//! - CancelFlag: the cooperative cancellation signal shared with the caller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EngineError;
use crate::ignore::IgnoreRules;

/// Represents a single transfer job (one copy or move invocation).
///
/// `processed_count` only ever grows and never exceeds `total_count`, which is
/// fixed once scanning has completed.
#[derive(Debug)]
pub struct TransferJob {
    /// Unique identifier for this job
    pub id: Uuid,

    /// Copy or Move
    pub operation: Operation,

    /// Root source directory
    pub source_root: PathBuf,

    /// Root destination directory
    pub destination_root: PathBuf,

    /// Normalized ignore rules applied while scanning
    pub rules: IgnoreRules,

    /// Scanned work items, in traversal order
    pub items: Vec<WorkItem>,

    /// Current job state
    pub state: JobState,

    /// Settled file items so far
    pub processed_count: usize,

    /// Number of file items produced by the scan
    pub total_count: usize,

    /// Items whose transfer failed and was reported individually
    pub failed_count: usize,

    /// Directories removed by post-move cleanup
    pub removed_dirs: usize,

    /// Cancellation signal shared with the caller
    pub cancel: CancelFlag,

    /// When job was created
    pub created_at: DateTime<Utc>,

    /// When job execution started
    pub start_time: Option<DateTime<Utc>>,

    /// When job execution ended (any terminal state)
    pub end_time: Option<DateTime<Utc>>,
}

impl TransferJob {
    /// Current progress as a whole percentage, `floor(processed * 100 / total)`.
    pub fn percent(&self) -> u8 {
        if self.total_count == 0 {
            return 0;
        }
        let pct = self.processed_count.min(self.total_count) * 100 / self.total_count;
        pct as u8
    }

    /// Number of file (non-directory) items.
    pub fn file_count(&self) -> usize {
        self.items.iter().filter(|i| !i.is_dir).count()
    }
}

/// A unit of scanned output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Full source path
    pub source_path: PathBuf,

    /// Full destination path
    pub destination_path: PathBuf,

    /// True if this item creates a directory rather than transferring a file
    pub is_dir: bool,
}

impl WorkItem {
    pub fn directory(source_path: PathBuf, destination_path: PathBuf) -> Self {
        WorkItem {
            source_path,
            destination_path,
            is_dir: true,
        }
    }

    pub fn file(source_path: PathBuf, destination_path: PathBuf) -> Self {
        WorkItem {
            source_path,
            destination_path,
            is_dir: false,
        }
    }
}

/// The operation kind for a transfer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Copy files; source remains unchanged
    Copy,
    /// Move files; sources are removed once placed, emptied directories cleaned up
    Move,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Copy => write!(f, "copy"),
            Operation::Move => write!(f, "move"),
        }
    }
}

impl FromStr for Operation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "copy" => Ok(Operation::Copy),
            "move" => Ok(Operation::Move),
            _ => Err(EngineError::InvalidOperation {
                value: s.to_string(),
            }),
        }
    }
}

/// The state of an entire transfer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created, not yet started
    Idle,
    /// Walking the source tree
    Scanning,
    /// Transferring batches
    BatchProcessing,
    /// Removing emptied source directories (move only)
    Cleanup,
    /// Every batch settled without cancellation
    Completed,
    /// Stopped by the cancellation signal
    Cancelled,
    /// Ended by a job-level error
    Failed,
}

impl JobState {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }
}

/// Result of transferring one file item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success,
    Failure(String),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success)
    }
}

/// How a job run ended.
#[derive(Debug)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    Failed(EngineError),
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobOutcome::Cancelled)
    }
}

/// Summary of a finished run, handed back by [`crate::job::JobHandle::wait`].
#[derive(Debug)]
pub struct JobReport {
    pub id: Uuid,
    pub outcome: JobOutcome,
    pub processed: usize,
    pub total: usize,
    pub failed: usize,
    pub removed_dirs: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobReport {
    pub fn from_job(job: &TransferJob, outcome: JobOutcome) -> Self {
        JobReport {
            id: job.id,
            outcome,
            processed: job.processed_count,
            total: job.total_count,
            failed: job.failed_count,
            removed_dirs: job.removed_dirs,
            started_at: job.start_time,
            finished_at: job.end_time,
        }
    }
}

/// Cooperative cancellation signal.
///
/// Cloning shares the underlying flag; the caller sets it from its own thread
/// and the job polls it at scan and dispatch checkpoints.
#[derive(Debug, Clone, Default)]
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
