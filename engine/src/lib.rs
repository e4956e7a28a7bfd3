//! # FilePorta Engine - Batched Copy/Move Library
//!
//! A headless engine for copying or moving a directory tree with
//! gitignore-style exclusions, bounded parallelism and progress reporting.
//! Designed as the foundation for multiple front ends (CLI, automation).
//!
//! ## Overview
//!
//! A job runs through these phases:
//! - Scanning: pre-order traversal of the source tree, pruning ignored paths
//! - Batch processing: directories created in order, files transferred by a
//!   bounded pool of workers with per-file retries
//! - Cleanup (move only): removal of source directories left empty
//!
//! Item failures are reported and skipped; only job-level failures stop a run.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{create_job, spawn_job, JobOptions, TransferEvent};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let job = create_job("/data/project", "/backup/project", ["*.log", "target/"], "copy")?;
//!
//! let handle = spawn_job(job, JobOptions::default().with_workers(8));
//! for event in handle.events() {
//!     if let TransferEvent::Progress(percent) = event {
//!         println!("{}%", percent);
//!     }
//! }
//!
//! let report = handle.wait();
//! println!("{:?}: {}/{} files", report.outcome, report.processed, report.total);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (TransferJob, WorkItem, enums)
//! - **error**: Error types and handling
//! - **ignore**: Ignore pattern normalization and matching
//! - **scan**: Source tree traversal
//! - **batch**: Batched, bounded-parallel execution
//! - **transfer**: Single-file transfer and retry policy
//! - **fs_ops**: Low-level filesystem operations
//! - **cleanup**: Empty directory removal after a move
//! - **job**: Job orchestration (create, plan, run, spawn)
//! - **progress**: Progress callback trait and event channel
//! - **checksums**: Checksum computation and copy verification

pub mod model;
pub mod error;
pub mod ignore;
pub mod scan;
pub mod batch;
pub mod transfer;
pub mod fs_ops;
pub mod cleanup;
pub mod job;
pub mod progress;
pub mod checksums;

// Re-export main types and functions
pub use model::{
    CancelFlag, JobOutcome, JobReport, JobState, Operation, TransferJob, TransferOutcome, WorkItem,
};
pub use error::EngineError;
pub use ignore::{normalize_patterns, IgnoreRules};
pub use job::{
    create_job, plan_job, run_job, run_job_with, spawn_job, spawn_job_with, JobHandle, JobOptions,
};
pub use progress::{ChannelProgress, ProgressCallback, TransferEvent};
pub use transfer::{FileTransfer, FsTransfer, RetryPolicy};
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
