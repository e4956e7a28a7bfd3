//! FilePorta - Command-line interface for the transfer engine.
//!
//! Copies or moves a directory tree, skipping paths that match ignore
//! patterns taken from a settings document and the command line. Progress is
//! drawn on stderr, or emitted as JSON lines on stdout with `--json`.

mod settings;

use chrono::{DateTime, Utc};
use clap::Parser;
use crossbeam_channel::{bounded, select, Receiver};
use engine::{
    create_job,
    job::{DEFAULT_BATCH_SIZE, DEFAULT_WORKERS},
    scan::DEFAULT_MAX_DEPTH,
    spawn_job, ChecksumAlgorithm, JobOptions, JobOutcome, JobReport, ProgressCallback,
    RetryPolicy, TransferEvent,
};
use settings::{Settings, DEFAULT_SETTINGS_FILE};
use std::cell::Cell;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// FilePorta - batched copy/move with ignore patterns
#[derive(Parser, Debug)]
#[command(name = "porta")]
#[command(version)]
#[command(about = "Copy or move a directory tree with ignore patterns and progress tracking")]
struct Args {
    /// Source directory
    #[arg(long, value_name = "PATH")]
    src: PathBuf,

    /// Destination directory
    #[arg(long, value_name = "PATH")]
    dst: PathBuf,

    /// Operation mode: copy or move
    #[arg(long, value_name = "MODE", default_value = "copy")]
    mode: String,

    /// Extra ignore pattern (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    ignore: Vec<String>,

    /// Settings document holding saved ignore patterns
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Merge --ignore patterns into the settings document before running
    #[arg(long)]
    save_ignore: bool,

    /// Work items per batch
    #[arg(long, value_name = "N", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Concurrent file transfers per batch
    #[arg(long, value_name = "N", default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Maximum scan depth below the source root
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Attempts per file before it is reported as failed
    #[arg(long, value_name = "N", default_value_t = 3)]
    retries: u32,

    /// Enable verification after copy (compares checksums)
    #[arg(long)]
    verify: bool,

    /// Checksum algorithm for verification: md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "sha256", requires = "verify")]
    hash: String,

    /// Emit events as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// CLI implementation of ProgressCallback for displaying transfer progress
struct CliProgress {
    json: bool,
    last_percent: Cell<Option<u8>>,
}

impl CliProgress {
    fn new(json: bool) -> Self {
        CliProgress {
            json,
            last_percent: Cell::new(None),
        }
    }

    fn emit_json(&self, event: &TransferEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{}", line);
        }
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn print_progress_bar(percent: u8) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!(
            "[{}{}] {}%",
            "=".repeat(filled),
            " ".repeat(empty),
            percent
        )
    }

    fn print_summary(&self, report: &JobReport) {
        if self.json {
            return;
        }

        eprintln!(
            "Summary: {}/{} files processed, {} failed",
            report.processed, report.total, report.failed
        );
        if report.removed_dirs > 0 {
            eprintln!("Removed {} empty source directories", report.removed_dirs);
        }
        if let (Some(start), Some(end)) = (report.started_at, report.finished_at) {
            eprintln!("Elapsed: {}", Self::format_duration(elapsed_between(start, end)));
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_status(&self, message: &str) {
        if self.json {
            self.emit_json(&TransferEvent::Status(message.to_string()));
        } else {
            eprintln!("{}", message);
        }
    }

    fn on_progress(&self, percent: u8) {
        if self.json {
            self.emit_json(&TransferEvent::Progress(percent));
            return;
        }

        // Only redraw when the percentage moves
        if self.last_percent.replace(Some(percent)) == Some(percent) {
            return;
        }
        eprint!("\rProgress: {}", Self::print_progress_bar(percent));
        let _ = std::io::Write::flush(&mut std::io::stderr());
    }

    fn on_error(&self, message: &str) {
        if self.json {
            self.emit_json(&TransferEvent::Error(message.to_string()));
        } else {
            // Move off the progress bar line
            if self.last_percent.get().is_some() {
                eprintln!();
            }
            eprintln!("Error: {}", message);
        }
    }

    fn on_finished(&self) {
        if self.json {
            self.emit_json(&TransferEvent::Finished);
        } else {
            eprintln!();
            eprintln!("Transfer complete!");
        }
    }
}

fn elapsed_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (end - start).to_std().unwrap_or_default()
}

fn main() {
    let args = Args::parse();
    setup_logging(args.verbose);

    let (interrupt_tx, interrupt_rx) = bounded(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    }) {
        warn!(error = %e, "could not install interrupt handler");
    }

    // Any failure, including cancellation, exits with status 2
    let exit_code = match run_cli(&args, &interrupt_rx) {
        Ok(()) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Install the stderr log subscriber. `RUST_LOG` takes precedence.
fn setup_logging(verbose: bool) {
    let default_filter = if verbose {
        "engine=debug,porta=debug,warn"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Validate arguments, run the job and map its outcome to a result.
///
/// A message on `interrupts` cancels the running job; events are still
/// drained until the job thread ends.
fn run_cli(args: &Args, interrupts: &Receiver<()>) -> Result<(), String> {
    if !args.src.exists() {
        return Err(format!("Source directory does not exist: {}", args.src.display()));
    }

    if !args.src.is_dir() {
        return Err(format!("Source is not a directory: {}", args.src.display()));
    }

    let src_canonical = args
        .src
        .canonicalize()
        .map_err(|e| format!("Cannot resolve source {}: {}", args.src.display(), e))?;
    if args.dst.canonicalize().ok().as_ref() == Some(&src_canonical) {
        return Err(format!(
            "Source and destination are the same directory: {}",
            src_canonical.display()
        ));
    }

    // Parse checksum algorithm if verification is enabled
    let verify = if args.verify {
        match ChecksumAlgorithm::from_name(&args.hash) {
            Some(algo) => Some(algo),
            None => {
                return Err(format!(
                    "Invalid hash algorithm '{}'. Must be 'md5', 'sha256', or 'blake3'",
                    args.hash
                ))
            }
        }
    } else {
        None
    };

    let mut settings = Settings::load(&args.settings)?;
    if args.save_ignore {
        let added = settings.merge_patterns(&args.ignore);
        settings.save(&args.settings)?;
        info!(added, path = %args.settings.display(), "saved ignore patterns");
    }

    let mut patterns = settings.patterns();
    patterns.extend(args.ignore.iter().cloned());
    debug!(?patterns, "effective ignore patterns");

    let job = create_job(&args.src, &args.dst, &patterns, &args.mode)
        .map_err(|e| format!("Job creation failed: {}", e))?;

    if args.verbose && !args.json {
        eprintln!("  Source: {}", job.source_root.display());
        eprintln!("  Destination: {}", job.destination_root.display());
        eprintln!("  Mode: {}", job.operation);
        eprintln!();
    }

    let options = JobOptions::default()
        .with_batch_size(args.batch_size)
        .with_workers(args.workers)
        .with_max_depth(args.max_depth)
        .with_retry(RetryPolicy {
            max_attempts: args.retries.max(1),
            ..RetryPolicy::default()
        })
        .with_verify(verify);

    let progress = CliProgress::new(args.json);
    let handle = spawn_job(job, options);
    let cancel = handle.cancel_flag();
    loop {
        select! {
            recv(handle.events()) -> event => match event {
                Ok(event) => event.dispatch(&progress),
                Err(_) => break,
            },
            recv(interrupts) -> signal => {
                if signal.is_ok() && !cancel.is_cancelled() {
                    eprintln!();
                    eprintln!("Interrupt received, cancelling transfer...");
                    cancel.cancel();
                }
            }
        }
    }
    let report = handle.wait();
    progress.print_summary(&report);

    match report.outcome {
        JobOutcome::Completed if report.failed == 0 => Ok(()),
        JobOutcome::Completed => Err(format!("{} file(s) failed to transfer", report.failed)),
        JobOutcome::Cancelled => Err("Transfer cancelled".to_string()),
        JobOutcome::Failed(e) => Err(format!("Transfer failed: {}", e)),
    }
}
