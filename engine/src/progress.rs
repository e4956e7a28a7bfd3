//! Progress reporting.
//!
//! This module defines the ProgressCallback trait, which decouples the
//! transfer engine from whatever presents progress to a user. `ChannelProgress`
//! forwards every notification as a [`TransferEvent`] over a channel, which is
//! how a job running on a background thread talks to its caller.

use crossbeam_channel::Sender;
use serde::Serialize;

use crate::model::TransferJob;

pub const STATUS_SCANNING: &str = "Scanning directory...";
pub const STATUS_CLEANUP: &str = "Cleaning up empty directories...";

/// Trait for receiving notifications from a transfer job.
///
/// All methods are called synchronously from the thread running the job.
/// `on_finished` fires at most once per run and only when the run completed
/// without cancellation or a job-level error.
pub trait ProgressCallback: Send {
    /// Called when the job enters a new phase.
    fn on_status(&self, message: &str);

    /// Called after each settled file with the overall percentage.
    fn on_progress(&self, percent: u8);

    /// Called for each failed item, and once for a job-level error.
    fn on_error(&self, message: &str);

    /// Called when the run completed successfully.
    fn on_finished(&self);
}

/// A notification emitted by a running job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum TransferEvent {
    Status(String),
    Progress(u8),
    Error(String),
    Finished,
}

impl TransferEvent {
    /// Replay this event into a callback, e.g. on the receiving end of a channel.
    pub fn dispatch(&self, callback: &dyn ProgressCallback) {
        match self {
            TransferEvent::Status(message) => callback.on_status(message),
            TransferEvent::Progress(percent) => callback.on_progress(*percent),
            TransferEvent::Error(message) => callback.on_error(message),
            TransferEvent::Finished => callback.on_finished(),
        }
    }
}

/// A ProgressCallback implementation that sends events through a channel.
pub struct ChannelProgress {
    sender: Sender<TransferEvent>,
}

impl ChannelProgress {
    pub fn new(sender: Sender<TransferEvent>) -> Self {
        ChannelProgress { sender }
    }
}

// A dropped receiver only means nobody is listening any more.
impl ProgressCallback for ChannelProgress {
    fn on_status(&self, message: &str) {
        let _ = self.sender.send(TransferEvent::Status(message.to_string()));
    }

    fn on_progress(&self, percent: u8) {
        let _ = self.sender.send(TransferEvent::Progress(percent));
    }

    fn on_error(&self, message: &str) {
        let _ = self.sender.send(TransferEvent::Error(message.to_string()));
    }

    fn on_finished(&self) {
        let _ = self.sender.send(TransferEvent::Finished);
    }
}

/// Turns job bookkeeping into callback invocations.
///
/// Owned by the thread that joins batch results; it is the only writer of
/// `processed_count`.
pub struct ProgressReporter<'a> {
    callback: Option<&'a dyn ProgressCallback>,
    finished_sent: bool,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(callback: Option<&'a dyn ProgressCallback>) -> Self {
        ProgressReporter {
            callback,
            finished_sent: false,
        }
    }

    pub fn status(&self, message: &str) {
        if let Some(callback) = self.callback {
            callback.on_status(message);
        }
    }

    pub fn error(&self, message: &str) {
        if let Some(callback) = self.callback {
            callback.on_error(message);
        }
    }

    /// Count one settled file item and emit the new percentage.
    pub fn item_settled(&self, job: &mut TransferJob) -> u8 {
        if job.processed_count < job.total_count {
            job.processed_count += 1;
        }
        let percent = job.percent();
        if let Some(callback) = self.callback {
            callback.on_progress(percent);
        }
        percent
    }

    pub fn finished(&mut self) {
        if self.finished_sent {
            return;
        }
        self.finished_sent = true;
        if let Some(callback) = self.callback {
            callback.on_finished();
        }
    }
}

/// Records every notification, for tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingProgress {
    events: std::sync::Mutex<Vec<TransferEvent>>,
}

#[cfg(test)]
impl RecordingProgress {
    pub(crate) fn events(&self) -> Vec<TransferEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: TransferEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
impl ProgressCallback for RecordingProgress {
    fn on_status(&self, message: &str) {
        self.push(TransferEvent::Status(message.to_string()));
    }

    fn on_progress(&self, percent: u8) {
        self.push(TransferEvent::Progress(percent));
    }

    fn on_error(&self, message: &str) {
        self.push(TransferEvent::Error(message.to_string()));
    }

    fn on_finished(&self) {
        self.push(TransferEvent::Finished);
    }
}
