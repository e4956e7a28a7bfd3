//! End-to-end jobs driven through `spawn_job`.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use engine::{
    create_job, spawn_job, spawn_job_with, EngineError, FileTransfer, FsTransfer, JobOptions,
    JobOutcome, Operation, RetryPolicy, TransferEvent, WorkItem,
};

fn fast_options() -> JobOptions {
    JobOptions::default().with_retry(RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
    })
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, contents).expect("Failed to write file");
}

/// Delegates to the filesystem after a pause, counting started transfers.
struct SlowTransfer {
    started: Arc<AtomicUsize>,
    delay: Duration,
}

impl FileTransfer for SlowTransfer {
    fn transfer(&self, item: &WorkItem, operation: Operation) -> Result<(), EngineError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        FsTransfer::default().transfer(item, operation)
    }
}

#[test]
fn copy_reports_scanning_progress_and_finish_in_order() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let dst = temp_dir.path().join("dst");
    for i in 0..12 {
        write_file(&src.join(format!("dir{}/file{}.txt", i % 3, i)), "payload");
    }
    write_file(&src.join("node_modules/pkg/index.js"), "ignored");

    let job = create_job(&src, &dst, ["node_modules"], "copy").expect("Failed to create job");
    let handle = spawn_job(job, fast_options().with_batch_size(4).with_workers(2));
    let events: Vec<TransferEvent> = handle.events().iter().collect();
    let report = handle.wait();

    assert!(report.outcome.is_completed());
    assert_eq!(report.total, 12);
    assert_eq!(report.processed, 12);
    assert_eq!(report.failed, 0);

    assert_eq!(
        events.first(),
        Some(&TransferEvent::Status("Scanning directory...".to_string()))
    );
    assert_eq!(events.last(), Some(&TransferEvent::Finished));
    assert_eq!(events.iter().filter(|e| **e == TransferEvent::Finished).count(), 1);

    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            TransferEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(percents.len(), 12);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));

    assert!(dst.join("dir0/file0.txt").exists());
    assert!(dst.join("dir2/file11.txt").exists());
    assert!(!dst.join("node_modules").exists());
}

#[test]
fn move_transfers_files_and_prunes_source() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let dst = temp_dir.path().join("dst");
    write_file(&src.join("a/b/c/deep.txt"), "deep");
    write_file(&src.join("a/side.txt"), "side");
    write_file(&src.join("cache/data.bin"), "cached");

    let job = create_job(&src, &dst, ["cache/"], "Move").expect("Failed to create job");
    let handle = spawn_job(job, fast_options());
    let events: Vec<TransferEvent> = handle.events().iter().collect();
    let report = handle.wait();

    assert!(report.outcome.is_completed());
    assert_eq!(fs::read_to_string(dst.join("a/b/c/deep.txt")).unwrap(), "deep");
    assert_eq!(fs::read_to_string(dst.join("a/side.txt")).unwrap(), "side");

    assert!(!src.join("a").exists());
    assert!(src.join("cache/data.bin").exists());
    assert_eq!(report.removed_dirs, 3);

    assert!(events.contains(&TransferEvent::Status(
        "Cleaning up empty directories...".to_string()
    )));
    assert_eq!(events.last(), Some(&TransferEvent::Finished));
}

#[test]
fn cancel_stops_dispatch_and_suppresses_finish() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let dst = temp_dir.path().join("dst");
    for i in 0..20 {
        write_file(&src.join(format!("f{:02}.txt", i)), "x");
    }

    let started = Arc::new(AtomicUsize::new(0));
    let transfer = SlowTransfer {
        started: Arc::clone(&started),
        delay: Duration::from_millis(50),
    };

    let job = create_job(&src, &dst, Vec::<String>::new(), "copy").expect("Failed to create job");
    let handle = spawn_job_with(
        job,
        fast_options().with_batch_size(2).with_workers(1),
        Box::new(transfer),
    );

    // Cancel once the first file has settled
    for event in handle.events() {
        if matches!(event, TransferEvent::Progress(_)) {
            handle.cancel();
            break;
        }
    }
    let remaining: Vec<TransferEvent> = handle.events().iter().collect();
    let report = handle.wait();

    assert!(report.outcome.is_cancelled());
    assert!(!remaining.contains(&TransferEvent::Finished));
    assert!(report.processed < report.total);
    assert!(started.load(Ordering::SeqCst) < 20);
}

#[test]
fn everything_ignored_reports_error_without_finish() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    write_file(&src.join("a.log"), "a");
    write_file(&src.join("logs/b.log"), "b");

    let job = create_job(&src, temp_dir.path().join("dst"), ["*.log"], "copy")
        .expect("Failed to create job");
    let handle = spawn_job(job, fast_options());
    let events: Vec<TransferEvent> = handle.events().iter().collect();
    let report = handle.wait();

    assert!(matches!(report.outcome, JobOutcome::Failed(EngineError::NothingToTransfer)));
    assert_eq!(report.total, 0);
    assert_eq!(
        events,
        vec![
            TransferEvent::Status("Scanning directory...".to_string()),
            TransferEvent::Error("No files to transfer after applying ignore patterns".to_string()),
        ]
    );
}

#[test]
fn invalid_operation_is_rejected_before_any_io() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let dst = temp_dir.path().join("dst");

    let result = create_job(temp_dir.path(), &dst, ["*.tmp"], "delete");

    assert!(matches!(result, Err(EngineError::InvalidOperation { .. })));
    assert!(!dst.exists());
}
