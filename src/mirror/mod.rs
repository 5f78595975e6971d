//! mirror
//!
//! Lifecycle of the local bare mirrors that back the filesystem.
//!
//! # State Machine
//!
//! ```text
//! Uninitialized --init(url)--> Open --pull(ref)--> Open
//! ```
//!
//! # Concurrency
//!
//! Each [`Mirror`] carries a shared/exclusive lock:
//!
//! - [`Mirror::init`] and [`Mirror::pull`] take the exclusive side for the
//!   whole clone-or-open / fetch, plus the cross-process
//!   [`MirrorLock`](crate::core::lock::MirrorLock).
//! - [`Mirror::read`] takes the shared side, so reads run concurrently with
//!   each other but never observe a fetch half-way through.
//!
//! The [`registry`] maps normalized remote URLs to mirrors, creating at
//! most one mirror per key.

pub mod registry;

pub use registry::MirrorRegistry;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::lock::{LockError, MirrorLock};
use crate::core::paths::PathError;
use crate::core::types::RefName;
use crate::git::{self, FetchOutcome, Git, GitError};

/// Errors from mirror lifecycle operations.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// `pull` or a read was attempted before `init` succeeded.
    #[error("mirror at {path} is not initialized")]
    NotInitialized { path: PathBuf },

    /// First-time clone failed.
    #[error("failed to clone {url} into {path}: {source}")]
    Clone {
        url: String,
        path: PathBuf,
        #[source]
        source: GitError,
    },

    /// An existing mirror could not be opened.
    #[error("failed to open mirror at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: GitError,
    },

    /// Forced fetch failed; the local ref is unchanged.
    #[error("failed to pull {refname} into {path}: {source}")]
    Pull {
        refname: String,
        path: PathBuf,
        #[source]
        source: GitError,
    },

    /// A read against the object graph failed.
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Where a mirror is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Uninitialized,
    Open,
}

/// What `init` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Mirror was cloned from the remote.
    Cloned,
    /// Mirror already existed on disk and was opened.
    Opened,
    /// Mirror was already open; nothing happened.
    AlreadyOpen,
}

/// One bare mirror of one remote repository.
#[derive(Debug)]
pub struct Mirror {
    git_dir: PathBuf,
    fetch_timeout: Option<Duration>,
    state: RwLock<MirrorState>,
}

impl Mirror {
    /// A mirror stored at `git_dir`, not yet initialized.
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
            fetch_timeout: None,
            state: RwLock::new(MirrorState::Uninitialized),
        }
    }

    /// Bound every clone and fetch by `timeout`.
    ///
    /// Also caps libgit2's process-wide socket timeouts at `timeout`, so a
    /// remote that stalls before sending objects fails too.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        git::limit_socket_timeout(timeout);
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Path of the bare repository.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MirrorState {
        *self.state.read()
    }

    /// Clone `url` if the mirror does not exist on disk, else open it.
    ///
    /// Idempotent: on an open mirror this is a no-op returning
    /// [`InitOutcome::AlreadyOpen`]. Blocks for the duration of a clone.
    ///
    /// # Errors
    ///
    /// - [`MirrorError::Clone`] if the clone fails (nothing is left on disk)
    /// - [`MirrorError::Open`] if an existing directory is not a repository
    /// - [`MirrorError::Lock`] if the cross-process lock cannot be taken
    pub fn init(&self, url: &str) -> Result<InitOutcome, MirrorError> {
        let mut state = self.state.write();
        if *state == MirrorState::Open {
            debug!(path = %self.git_dir.display(), "mirror already open");
            return Ok(InitOutcome::AlreadyOpen);
        }

        let _lock = MirrorLock::acquire(&self.git_dir)?;

        let outcome = if self.git_dir.exists() {
            Git::open_bare(&self.git_dir).map_err(|source| MirrorError::Open {
                path: self.git_dir.clone(),
                source,
            })?;
            info!(path = %self.git_dir.display(), "opened existing mirror");
            InitOutcome::Opened
        } else {
            info!(url, path = %self.git_dir.display(), "cloning mirror");
            Git::clone_bare(url, &self.git_dir, self.deadline()).map_err(|source| {
                MirrorError::Clone {
                    url: url.to_string(),
                    path: self.git_dir.clone(),
                    source,
                }
            })?;
            info!(url, path = %self.git_dir.display(), "cloned mirror");
            InitOutcome::Cloned
        };

        *state = MirrorState::Open;
        Ok(outcome)
    }

    /// Force-fetch `refname` from the remote, overwriting the local ref.
    ///
    /// "Already up to date" is a success. Blocks for the duration of the
    /// fetch while holding the exclusive lock.
    ///
    /// # Errors
    ///
    /// - [`MirrorError::NotInitialized`] before a successful `init`
    /// - [`MirrorError::Pull`] if the fetch fails; the local ref is unchanged
    pub fn pull(&self, refname: &RefName) -> Result<FetchOutcome, MirrorError> {
        let state = self.state.write();
        if *state != MirrorState::Open {
            return Err(self.not_initialized());
        }

        let _lock = MirrorLock::acquire(&self.git_dir)?;
        let git = Git::open_bare(&self.git_dir)?;
        let outcome = git
            .force_fetch(refname, self.deadline())
            .map_err(|source| MirrorError::Pull {
                refname: refname.to_string(),
                path: self.git_dir.clone(),
                source,
            })?;

        if outcome.is_up_to_date() {
            debug!(refname = %refname, path = %self.git_dir.display(), "already up to date");
        } else {
            info!(
                refname = %refname,
                previous = ?outcome.previous.as_ref().map(|h| h.short(12).to_string()),
                current = ?outcome.current.as_ref().map(|h| h.short(12).to_string()),
                "ref updated"
            );
        }
        Ok(outcome)
    }

    /// Run a read against the object graph under the shared lock.
    ///
    /// # Errors
    ///
    /// - [`MirrorError::NotInitialized`] before a successful `init`
    /// - [`MirrorError::Git`] for any error from `f` or from opening
    pub fn read<T, F>(&self, f: F) -> Result<T, MirrorError>
    where
        F: FnOnce(&Git) -> Result<T, GitError>,
    {
        let state = self.state.read();
        if *state != MirrorState::Open {
            return Err(self.not_initialized());
        }

        let git = Git::open_bare(&self.git_dir)?;
        let result = f(&git)?;
        drop(state);
        Ok(result)
    }

    fn deadline(&self) -> Option<Instant> {
        self.fetch_timeout.map(|t| Instant::now() + t)
    }

    fn not_initialized(&self) -> MirrorError {
        MirrorError::NotInitialized {
            path: self.git_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn starts_uninitialized() {
        let mirror = Mirror::new("/nonexistent/m.git");
        assert_eq!(mirror.state(), MirrorState::Uninitialized);
    }

    #[test]
    fn read_before_init_fails() {
        let mirror = Mirror::new("/nonexistent/m.git");
        let result = mirror.read(|git| git.log_head());
        assert!(matches!(result, Err(MirrorError::NotInitialized { .. })));
    }

    #[test]
    fn pull_before_init_fails() {
        let mirror = Mirror::new("/nonexistent/m.git");
        let refname = RefName::new("refs/heads/main").unwrap();
        assert!(matches!(
            mirror.pull(&refname),
            Err(MirrorError::NotInitialized { .. })
        ));
    }

    #[test]
    fn failed_clone_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let git_dir = temp.path().join("m.git");
        let mirror = Mirror::new(&git_dir);

        let missing = temp.path().join("no-such-remote");
        let result = mirror.init(missing.to_str().unwrap());
        assert!(matches!(result, Err(MirrorError::Clone { .. })));
        assert_eq!(mirror.state(), MirrorState::Uninitialized);
        assert!(!git_dir.exists());
    }

    #[test]
    fn existing_non_repository_fails_to_open() {
        let temp = TempDir::new().unwrap();
        let git_dir = temp.path().join("m.git");
        std::fs::create_dir_all(&git_dir).unwrap();

        let mirror = Mirror::new(&git_dir);
        assert!(matches!(
            mirror.init("https://example.invalid/a/b"),
            Err(MirrorError::Open { .. })
        ));
    }
}
