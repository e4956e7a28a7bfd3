//! Post-move removal of emptied source directories.

use std::fs;
use std::path::Path;

use tracing::debug;

/// Remove every directory under `root` that is empty once its own children
/// have been processed. `root` itself is kept.
///
/// Cleanup is best effort: unreadable directories and failed removals are
/// skipped and the walk carries on with siblings.
///
/// # Returns
/// Number of directories removed
pub fn remove_empty_dirs(root: &Path) -> usize {
    let mut removed = 0;
    prune_children(root, &mut removed);
    debug!(root = %root.display(), removed, "empty directory cleanup finished");
    removed
}

fn prune_children(dir: &Path, removed: &mut usize) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        // file_type() does not follow symlinks
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }

        let path = entry.path();
        prune_children(&path, removed);

        if is_empty_dir(&path) && fs::remove_dir(&path).is_ok() {
            *removed += 1;
        }
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
