//! Atomic I/O operations with file locking

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use fs2::FileExt;

use crate::{Error, Result};

/// Retry policy for acquiring the advisory write lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRetry {
    /// First wait between attempts.
    pub initial_interval: Duration,
    /// Give up after this much time has elapsed.
    pub max_elapsed: Duration,
}

impl Default for LockRetry {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(5),
            max_elapsed: Duration::from_secs(2),
        }
    }
}

/// Write content atomically to a file.
///
/// The content goes to a uniquely named temp file in the target directory
/// which is then renamed over the target. Writers to the same target are
/// serialized through an advisory lock on a sibling `.<name>.lock` file, so
/// concurrent writers never interleave partial content.
///
/// The lock file stays next to the target after the write. The rename
/// replaces the target's inode, so a lock held on the target itself would
/// not be seen by the next writer; removing the lock file would race the
/// same way. Tools scanning the directory should skip dot files.
pub fn write_atomic(path: &Path, content: &[u8], retry: LockRetry) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let lock_path = parent.join(format!(".{file_name}.lock"));
    let lock = acquire_lock(&lock_path, retry)?;

    // Same directory keeps the rename on one filesystem
    let temp_path = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    let written = write_temp(&temp_path, content).and_then(|()| {
        fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))
    });

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    FileExt::unlock(&lock).map_err(|_| Error::LockFailed {
        path: path.to_path_buf(),
    })?;

    written
}

fn write_temp(temp_path: &Path, content: &[u8]) -> Result<()> {
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)
        .map_err(|e| Error::io(temp_path, e))?;

    temp_file
        .write_all(content)
        .map_err(|e| Error::io(temp_path, e))?;

    temp_file.sync_all().map_err(|e| Error::io(temp_path, e))
}

fn acquire_lock(lock_path: &Path, retry: LockRetry) -> Result<File> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| Error::io(lock_path, e))?;

    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(retry.initial_interval)
        .with_max_elapsed_time(Some(retry.max_elapsed))
        .build();

    backoff::retry(policy, || {
        FileExt::try_lock_exclusive(&file).map_err(backoff::Error::transient)
    })
    .map_err(|_| {
        tracing::warn!(path = %lock_path.display(), "Timed out waiting for write lock");
        Error::LockFailed {
            path: lock_path.to_path_buf(),
        }
    })?;

    Ok(file)
}

/// Read text content from a file.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Read text content, returning `None` when the file does not exist.
pub fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match read_text(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Create a directory and all of its parents.
///
/// Returns the absolute form of the directory.
pub fn ensure_dir(path: &Path) -> Result<PathBuf> {
    fs::create_dir_all(path).map_err(|e| Error::io(path, e))?;
    Ok(absolute(path))
}

/// Absolute form of a path.
///
/// Existing paths are canonicalized (without UNC prefixes on Windows);
/// missing ones are made absolute against the current directory.
pub fn absolute(path: &Path) -> PathBuf {
    dunce::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
