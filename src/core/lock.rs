//! core::lock
//!
//! Cross-process exclusive lock for mirror mutations.
//!
//! # Architecture
//!
//! In-process readers and writers of a mirror are arbitrated by the
//! mirror's read/write lock. That does not stop a second server process
//! pointed at the same base path from fetching into the same bare
//! repository at the same time. `MirrorLock` closes that gap with an
//! OS-level advisory lock on `<mirror>.lock`, held for the whole of a
//! clone or fetch.
//!
//! # Invariants
//!
//! - Lock is held for the entire clone-or-open / fetch
//! - Lock is automatically released on drop (RAII pattern)
//! - Acquisition blocks until the other holder releases it
//!
//! # Example
//!
//! ```no_run
//! use commitfs::core::lock::MirrorLock;
//! use std::path::Path;
//!
//! let lock = MirrorLock::acquire(Path::new("/tmp/commitfs/example.com/a/b.git")).unwrap();
//! assert!(lock.is_held());
//! drop(lock);
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use crate::core::paths::MirrorPaths;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Failed to create lock file or its directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),
}

/// An exclusive advisory lock guarding one mirror directory.
#[derive(Debug)]
pub struct MirrorLock {
    path: PathBuf,
    file: Option<File>,
}

impl MirrorLock {
    /// Acquire the lock for `mirror_dir`, blocking until it is free.
    ///
    /// The parent directory of the mirror is created if needed, since the
    /// lock is taken before a first clone.
    ///
    /// # Errors
    ///
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be acquired
    pub fn acquire(mirror_dir: &Path) -> Result<Self, LockError> {
        let path = MirrorPaths::lock_file(mirror_dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LockError::CreateFailed(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        file.lock_exclusive()
            .map_err(|e| LockError::AcquireFailed(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Check if the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MirrorLock {
    fn drop(&mut self) {
        // Best-effort release on drop
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
