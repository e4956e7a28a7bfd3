//! Error types for the transfer engine.
//!
//! `EngineError` covers both job-level failures (which stop a run) and the
//! per-item failures that the batch runner turns into individual error
//! notifications. Which of the two a variant is depends on where it surfaces,
//! see [`EngineError::is_item_error`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::JobState;

/// Errors raised while building or running a transfer job.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Operation kind was neither `copy` nor `move`
    #[error("Operation must be either 'copy' or 'move' (got '{value}')")]
    InvalidOperation { value: String },

    /// Path is empty or otherwise unusable
    #[error("Invalid path: {} ({reason})", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Job was already planned or run
    #[error("Job must be idle to start; current state: {state:?}")]
    NotIdle { state: JobState },

    /// Ignore patterns could not be compiled into a matcher
    #[error("Failed to compile ignore patterns: {source}")]
    InvalidPatterns { source: globset::Error },

    /// Scanning produced no files once ignore patterns were applied
    #[error("No files to transfer after applying ignore patterns")]
    NothingToTransfer,

    /// Failed to enumerate the source root
    #[error("Failed to enumerate directory {}: {source}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Failed to create a destination directory
    #[error("Error creating directory {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Failed to read from a source file
    #[error("Failed to read file {}: {source}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write to a destination file
    #[error("Failed to write file {}: {source}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Source could not be removed after it was placed at the destination
    #[error("Failed to remove source file {}: {source}", path.display())]
    RemoveFailed { path: PathBuf, source: io::Error },

    /// Source and destination name the same file on disk
    #[error("Source and destination are the same file: {}", path.display())]
    SameFile { path: PathBuf },

    /// Destination content differs from the source after copying
    #[error("Checksum mismatch after copying {}", path.display())]
    VerificationFailed { path: PathBuf },

    /// A transfer worker thread panicked
    #[error("Transfer worker panicked")]
    WorkerPanicked,
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::RemoveFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True for failures scoped to a single work item.
    ///
    /// These are reported through the error notification channel while the
    /// job keeps going; every other variant ends the run.
    pub fn is_item_error(&self) -> bool {
        matches!(
            self,
            Self::DirectoryCreationFailed { .. }
                | Self::ReadError { .. }
                | Self::WriteError { .. }
                | Self::RemoveFailed { .. }
                | Self::SameFile { .. }
                | Self::VerificationFailed { .. }
        )
    }
}
