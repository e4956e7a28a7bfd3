//! Single-file transfer and the retry loop around it.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::checksums::{self, ChecksumAlgorithm};
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{Operation, WorkItem};

/// Moves one file item from its source to its destination.
///
/// Implementations are shared by every worker of a batch, hence `Sync`.
pub trait FileTransfer: Send + Sync {
    fn transfer(&self, item: &WorkItem, operation: Operation) -> Result<(), EngineError>;
}

/// The filesystem implementation of [`FileTransfer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FsTransfer {
    /// Compare digests after each copy
    pub verify: Option<ChecksumAlgorithm>,
}

impl FsTransfer {
    pub fn new(verify: Option<ChecksumAlgorithm>) -> Self {
        FsTransfer { verify }
    }
}

impl FileTransfer for FsTransfer {
    fn transfer(&self, item: &WorkItem, operation: Operation) -> Result<(), EngineError> {
        match operation {
            Operation::Copy => {
                fs_ops::copy_file_with_metadata(&item.source_path, &item.destination_path)?;
                if let Some(algorithm) = self.verify {
                    checksums::verify_copy(&item.source_path, &item.destination_path, algorithm)?;
                }
                Ok(())
            }
            Operation::Move => {
                fs_ops::move_file(&item.source_path, &item.destination_path, self.verify)
            }
        }
    }
}

/// Retry schedule for a single file: `max_attempts` tries, sleeping
/// `initial_delay` after the first failure and doubling each time after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    ///
    /// No delay follows the final attempt; its error is returned as is.
    pub fn run<T, F>(&self, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut(u32) -> Result<T, EngineError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "transfer attempt failed, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Transfer one item under the retry policy.
pub fn transfer_with_retry(
    transfer: &dyn FileTransfer,
    item: &WorkItem,
    operation: Operation,
    retry: &RetryPolicy,
) -> Result<(), EngineError> {
    retry.run(|_| transfer.transfer(item, operation))
}
