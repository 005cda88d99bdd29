//! Advisory per-user lock around a full sync job.
//!
//! Prevents a scheduled job and a manual "sync now" from interleaving writes
//! to the same remote calendar. The lock is an exclusive, non-blocking file
//! lock, so it also holds across processes.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::error::SyncError;

/// Held for the lifetime of one job; released on drop.
#[derive(Debug)]
pub struct SyncLock {
    file: File,
    path: PathBuf,
}

impl SyncLock {
    /// Take the lock for `user_id`, failing fast if another job holds it.
    pub fn acquire(dir: &Path, user_id: &str) -> Result<Self, SyncError> {
        fs::create_dir_all(dir)
            .map_err(|e| SyncError::Storage(format!("cannot create {}: {e}", dir.display())))?;

        let path = dir.join(lock_file_name(user_id));
        let file = File::create(&path)
            .map_err(|e| SyncError::Storage(format!("cannot create {}: {e}", path.display())))?;

        file.try_lock_exclusive()
            .map_err(|e| lock_error(user_id, &path, e))?;

        tracing::debug!(path = %path.display(), "sync lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Only contention means another job; any other failure is a storage error.
fn lock_error(user_id: &str, path: &Path, err: io::Error) -> SyncError {
    if err.kind() == fs2::lock_contended_error().kind() {
        SyncError::JobInProgress {
            user: user_id.to_string(),
        }
    } else {
        SyncError::Storage(format!("cannot lock {}: {err}", path.display()))
    }
}

/// File name for a user's lock.
///
/// Percent-encoding keeps distinct ids distinct; `%` becomes `+`, which the
/// encoder never emits on its own.
fn lock_file_name(user_id: &str) -> String {
    let safe = urlencoding::encode(user_id).replace('%', "+");
    format!("sync-{safe}.lock")
}
