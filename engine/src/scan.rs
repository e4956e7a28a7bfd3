//! Bounded-depth scanning of the source tree.
//!
//! The scanner walks the source root in pre-order and produces the ordered
//! work list: a directory-creation item for every visited directory, followed
//! by its files, followed by its subdirectories. Ignored directories are
//! pruned together with everything beneath them.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::model::{TransferJob, WorkItem};

/// Default recursion limit, counted in path components below the root.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Work items produced by a scan.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub items: Vec<WorkItem>,
    /// True if the scan stopped early because cancellation was requested
    pub cancelled: bool,
}

impl ScanResult {
    pub fn file_count(&self) -> usize {
        self.items.iter().filter(|i| !i.is_dir).count()
    }
}

/// Scan the job's source tree.
///
/// Directories at `max_depth` still produce their creation item but their
/// contents are not read, so files whose own depth is `max_depth` are the
/// deepest ones transferred.
///
/// # Errors
/// Returns `EngineError::EnumerationFailed` if the source root itself cannot
/// be read. Unreadable subdirectories are logged and skipped.
pub fn scan(job: &TransferJob, max_depth: usize) -> Result<ScanResult, EngineError> {
    scan_until(job, max_depth, &|| job.cancel.is_cancelled())
}

/// Scan, polling `should_stop` at every cancellation checkpoint.
pub(crate) fn scan_until(
    job: &TransferJob,
    max_depth: usize,
    should_stop: &dyn Fn() -> bool,
) -> Result<ScanResult, EngineError> {
    let mut scanner = Scanner {
        job,
        max_depth,
        should_stop,
        result: ScanResult::default(),
    };

    let root = job.source_root.clone();
    match scanner.visit(&root, Path::new(""), 0) {
        Ok(()) | Err(Stop::Cancelled) => {}
        Err(Stop::Failed(e)) => return Err(e),
    }

    debug!(
        job_id = %job.id,
        items = scanner.result.items.len(),
        files = scanner.result.file_count(),
        cancelled = scanner.result.cancelled,
        "scan finished"
    );
    Ok(scanner.result)
}

enum Stop {
    Cancelled,
    Failed(EngineError),
}

struct Scanner<'a> {
    job: &'a TransferJob,
    max_depth: usize,
    should_stop: &'a dyn Fn() -> bool,
    result: ScanResult,
}

impl Scanner<'_> {
    fn visit(&mut self, dir: &Path, rel_path: &Path, depth: usize) -> Result<(), Stop> {
        self.check_cancelled()?;

        if self.job.rules.should_ignore(dir, &self.job.source_root) {
            return Ok(());
        }

        let dest_dir = if rel_path.as_os_str().is_empty() {
            self.job.destination_root.clone()
        } else {
            self.job.destination_root.join(rel_path)
        };
        self.result
            .items
            .push(WorkItem::directory(dir.to_path_buf(), dest_dir.clone()));

        if depth >= self.max_depth {
            return Ok(());
        }

        let (files, subdirs) = match read_children(dir) {
            Ok(children) => children,
            Err(e) if depth == 0 => {
                return Err(Stop::Failed(EngineError::EnumerationFailed {
                    path: dir.to_path_buf(),
                    source: e,
                }))
            }
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "skipping unreadable directory");
                return Ok(());
            }
        };

        for name in files {
            self.check_cancelled()?;

            let src = dir.join(&name);
            if self.job.rules.should_ignore(&src, &self.job.source_root) {
                continue;
            }
            self.result.items.push(WorkItem::file(src, dest_dir.join(&name)));
        }

        let subdirs: Vec<PathBuf> = subdirs
            .into_iter()
            .filter(|name| !self.job.rules.should_ignore(&dir.join(name), &self.job.source_root))
            .collect();

        for name in subdirs {
            self.visit(&dir.join(&name), &rel_path.join(&name), depth + 1)?;
        }

        Ok(())
    }

    fn check_cancelled(&mut self) -> Result<(), Stop> {
        if (self.should_stop)() {
            self.result.cancelled = true;
            return Err(Stop::Cancelled);
        }
        Ok(())
    }
}

/// List a directory's entries as (file names, subdirectory names), each sorted.
///
/// Only regular files are transferred. Symbolic links are classified by
/// their target; links to directories are left out entirely so the walk never
/// follows them. FIFOs, sockets and device nodes are skipped.
fn read_children(dir: &Path) -> std::io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = PathBuf::from(entry.file_name());

        if file_type.is_dir() {
            subdirs.push(name);
        } else if file_type.is_file() {
            files.push(name);
        } else if file_type.is_symlink() {
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => files.push(name),
                Ok(meta) if meta.is_dir() => {
                    debug!(path = %entry.path().display(), "not following directory symlink");
                }
                Ok(_) => {
                    warn!(path = %entry.path().display(), "skipping symlink to special file");
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "skipping dangling symlink");
                }
            }
        } else {
            warn!(path = %entry.path().display(), "skipping special file");
        }
    }

    files.sort();
    subdirs.sort();
    Ok((files, subdirs))
}
