//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Copying files with metadata preservation
//! - Moving files (rename, falling back to copy + delete across devices)
//! - Creating destination directories

use std::fs;
use std::io;
use std::path::Path;

use filetime::FileTime;
use tracing::debug;

use crate::checksums::{self, ChecksumAlgorithm};
use crate::error::EngineError;

/// Copy a regular file over `dst`, carrying permissions and timestamps along.
///
/// An existing destination is replaced. The source must be a regular file
/// (symlinks are followed) and must not be the destination itself, otherwise
/// opening the destination for writing would truncate the data being read.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    let read_err = |source| EngineError::ReadError {
        path: src.to_path_buf(),
        source,
    };
    let write_err = |source| EngineError::WriteError {
        path: dst.to_path_buf(),
        source,
    };

    // Stat before opening: opening a FIFO blocks until a writer shows up
    let src_metadata = fs::metadata(src).map_err(read_err)?;
    if !src_metadata.is_file() {
        return Err(read_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    if is_same_file(src, &src_metadata, dst) {
        return Err(EngineError::SameFile {
            path: src.to_path_buf(),
        });
    }

    ensure_parent_dir_exists(dst)?;
    let mut reader = fs::File::open(src).map_err(read_err)?;
    let mut writer = fs::File::create(dst).map_err(write_err)?;
    let bytes_copied = io::copy(&mut reader, &mut writer).map_err(write_err)?;
    drop(writer);

    fs::set_permissions(dst, src_metadata.permissions()).map_err(write_err)?;

    let atime = FileTime::from_last_access_time(&src_metadata);
    let mtime = FileTime::from_last_modification_time(&src_metadata);
    if let Err(e) = filetime::set_file_times(dst, atime, mtime) {
        debug!(path = %dst.display(), error = %e, "could not preserve timestamps");
    }

    Ok(bytes_copied)
}

/// True if `dst` already exists and is the very file described by `src_metadata`.
#[cfg(unix)]
fn is_same_file(_src: &Path, src_metadata: &fs::Metadata, dst: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match fs::metadata(dst) {
        Ok(dst_metadata) => {
            dst_metadata.dev() == src_metadata.dev() && dst_metadata.ino() == src_metadata.ino()
        }
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_same_file(src: &Path, _src_metadata: &fs::Metadata, dst: &Path) -> bool {
    match (fs::canonicalize(src), fs::canonicalize(dst)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Move a file, replacing any existing destination.
///
/// A plain rename is tried first. If that fails (typically because source and
/// destination live on different filesystems) the file is copied, optionally
/// verified, and the source is removed.
pub fn move_file(
    src: &Path,
    dst: &Path,
    verify: Option<ChecksumAlgorithm>,
) -> Result<(), EngineError> {
    ensure_parent_dir_exists(dst)?;

    match fs::rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) => {
            debug!(src = %src.display(), error = %e, "rename failed, copying instead");
        }
    }

    copy_file_with_metadata(src, dst)?;
    if let Some(algorithm) = verify {
        checksums::verify_copy(src, dst, algorithm)?;
    }

    fs::remove_file(src).map_err(|e| EngineError::RemoveFailed {
        path: src.to_path_buf(),
        source: e,
    })
}

/// Create a destination directory and any missing parents.
pub fn create_directory(path: &Path) -> Result<(), EngineError> {
    fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Create the directory `path` will live in, if it is missing.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            create_directory(parent)
        }
        _ => Ok(()),
    }
}
