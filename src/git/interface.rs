//! git::interface
//!
//! Git interface implementation using git2.
//!
//! This module provides the **single doorway** to all Git operations in
//! commitfs. All object-graph reads and all mirror mutations flow through
//! [`Git`], which returns strong types and normalizes errors into typed
//! failure categories.
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: No repository at the given path
//! - [`GitError::CommitNotFound`]: Commit hash does not resolve to a commit
//! - [`GitError::PathNotFound`]: Path does not exist in a commit's tree
//! - [`GitError::NotAFile`]: Path exists but has no blob content
//! - [`GitError::RefNotFound`]: Remote did not advertise the requested ref
//! - [`GitError::Timeout`]: A network transfer passed its deadline or a
//!   socket timed out
//!
//! # Example
//!
//! ```ignore
//! use commitfs::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open_bare(Path::new("/tmp/commitfs/example.com/a/b.git"))?;
//! for hash in git.log_head()? {
//!     println!("{}", hash.short(7));
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::types::{BranchName, CommitHash, FileMode, RefName, TypeError};

/// Remote name used for every mirror.
const ORIGIN: &str = "origin";

/// Fetch refspec that mirrors every remote branch onto a local branch.
const MIRROR_REFSPEC: &str = "+refs/heads/*:refs/heads/*";

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// No repository at the given path.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Commit does not exist in the object graph.
    #[error("commit not found: {commit}")]
    CommitNotFound {
        /// The commit that was not found
        commit: String,
    },

    /// Path does not exist in the commit's tree.
    #[error("path {path:?} not found at commit {commit}")]
    PathNotFound {
        /// The commit whose tree was searched
        commit: String,
        /// The repository-relative path
        path: String,
    },

    /// Path exists but is not backed by a blob.
    #[error("path {path:?} at commit {commit} is not a file")]
    NotAFile {
        /// The commit whose tree was searched
        commit: String,
        /// The repository-relative path
        path: String,
    },

    /// The remote does not have the requested ref.
    #[error("ref not found on remote: {refname}")]
    RefNotFound {
        /// The ref that was requested
        refname: String,
    },

    /// A network transfer passed its deadline.
    #[error("{operation} timed out")]
    Timeout {
        /// What was running (`clone`, `fetch refs/heads/main`)
        operation: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    fn internal(context: &str, err: git2::Error) -> Self {
        GitError::Internal {
            message: format!("{}: {}", context, err.message()),
        }
    }

    /// Classify a transfer error. A callback abort, a socket timeout or any
    /// failure after the deadline counts as the deadline firing.
    fn transfer(operation: &str, err: git2::Error, deadline: Option<Instant>) -> Self {
        let expired = deadline.is_some_and(|d| Instant::now() >= d);
        if expired || matches!(err.code(), git2::ErrorCode::User | git2::ErrorCode::Timeout) {
            GitError::Timeout {
                operation: operation.to_string(),
            }
        } else {
            GitError::internal(operation, err)
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        GitError::Internal {
            message: err.to_string(),
        }
    }
}

/// Timestamps of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// The commit hash
    pub hash: CommitHash,
    /// Author timestamp
    pub author_time: DateTime<Utc>,
    /// Committer timestamp
    pub commit_time: DateTime<Utc>,
}

/// A tree entry located by path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    /// Translated mode
    pub mode: FileMode,
    /// Blob length for content-bearing modes
    pub size: Option<u64>,
}

/// Result of a forced fetch of one ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Local target before the fetch
    pub previous: Option<CommitHash>,
    /// Local target after the fetch
    pub current: Option<CommitHash>,
}

impl FetchOutcome {
    /// Whether the fetch left the ref where it was.
    pub fn is_up_to_date(&self) -> bool {
        self.previous == self.current
    }
}

/// What a tree walk should do after visiting an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    /// Keep going (descending into the entry if it is a tree).
    Continue,
    /// Do not descend into this entry.
    SkipSubtree,
}

/// The Git interface.
///
/// This is the **single point of interaction** with Git. No other module
/// imports `git2`.
///
/// A `Git` wraps a `git2::Repository`, which is not `Sync`. Callers that
/// share a mirror across threads open one `Git` per operation under the
/// mirror's lock rather than sharing a handle.
pub struct Git {
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Opening and Cloning
    // =========================================================================

    /// Open an existing bare mirror.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if `path` is not a repository
    pub fn open_bare(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open_bare(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Ok(Self { repo })
    }

    /// Clone `url` into a new bare mirror at `path`.
    ///
    /// Every remote branch is mapped onto a local branch of the same name
    /// (`+refs/heads/*:refs/heads/*`), and `HEAD` follows the remote's
    /// default branch. On failure the partially written directory is
    /// removed so a later attempt starts from scratch.
    ///
    /// # Errors
    ///
    /// - [`GitError::Timeout`] if `deadline` passes during the transfer
    /// - [`GitError::Internal`] for any other clone failure
    pub fn clone_bare(url: &str, path: &Path, deadline: Option<Instant>) -> Result<Self, GitError> {
        let result = Self::clone_bare_inner(url, path, deadline);
        if result.is_err() {
            let _ = std::fs::remove_dir_all(path);
        }
        result
    }

    fn clone_bare_inner(
        url: &str,
        path: &Path,
        deadline: Option<Instant>,
    ) -> Result<Self, GitError> {
        let repo = git2::Repository::init_bare(path)
            .map_err(|e| GitError::internal(&format!("init {}", path.display()), e))?;

        {
            let mut remote = repo
                .remote_with_fetch(ORIGIN, url, MIRROR_REFSPEC)
                .map_err(|e| GitError::internal("create remote", e))?;

            let mut options = fetch_options(deadline);
            remote
                .fetch::<&str>(&[], Some(&mut options), Some("commitfs: clone"))
                .map_err(|e| GitError::transfer("clone", e, deadline))?;

            // The advertised default branch stays available after the
            // fetch disconnects.
            let default_branch = remote
                .default_branch()
                .ok()
                .and_then(|buf| buf.as_str().map(String::from));
            if let Some(name) = default_branch {
                repo.set_head(&name)
                    .map_err(|e| GitError::internal("set HEAD", e))?;
            }
        }

        Ok(Self { repo })
    }

    /// Path to the bare repository directory.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Force-fetch `refname` from origin onto the local ref of the same name.
    ///
    /// Non-fast-forward updates are accepted. A fetch that changes nothing
    /// is a success; check [`FetchOutcome::is_up_to_date`].
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if origin does not advertise `refname`
    /// - [`GitError::Timeout`] if `deadline` passes during the transfer
    /// - [`GitError::Internal`] for any other fetch failure
    pub fn force_fetch(
        &self,
        refname: &RefName,
        deadline: Option<Instant>,
    ) -> Result<FetchOutcome, GitError> {
        let operation = format!("fetch {}", refname);
        let previous = self.try_resolve_ref(refname.as_str())?;

        let mut remote = self
            .repo
            .find_remote(ORIGIN)
            .map_err(|e| GitError::internal("find remote origin", e))?;
        let mut options = fetch_options(deadline);
        remote
            .fetch(
                &[refname.force_refspec()],
                Some(&mut options),
                Some("commitfs: refresh"),
            )
            .map_err(|e| GitError::transfer(&operation, e, deadline))?;

        // The advertised ref list stays available after the fetch disconnects.
        let advertised = remote
            .list()
            .map_err(|e| GitError::internal(&operation, e))?
            .iter()
            .any(|head| head.name() == refname.as_str());
        if !advertised {
            return Err(GitError::RefNotFound {
                refname: refname.to_string(),
            });
        }

        let current = self.try_resolve_ref(refname.as_str())?;
        Ok(FetchOutcome { previous, current })
    }

    /// Resolve a ref to the commit it targets, or `None` if absent.
    pub fn try_resolve_ref(&self, refname: &str) -> Result<Option<CommitHash>, GitError> {
        let reference = match self.repo.find_reference(refname) {
            Ok(r) => r,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(GitError::internal(refname, e)),
        };
        let commit = reference
            .peel_to_commit()
            .map_err(|e| GitError::internal(refname, e))?;
        Ok(Some(CommitHash::new(commit.id().to_string())?))
    }

    // =========================================================================
    // History and Branches
    // =========================================================================

    /// Commits reachable from `HEAD`, most recent first.
    ///
    /// An unborn `HEAD` (empty mirror) yields an empty list.
    pub fn log_head(&self) -> Result<Vec<CommitHash>, GitError> {
        let mut revwalk = self
            .repo
            .revwalk()
            .map_err(|e| GitError::internal("revwalk", e))?;
        revwalk
            .set_sorting(git2::Sort::TIME)
            .map_err(|e| GitError::internal("revwalk", e))?;

        match revwalk.push_head() {
            Ok(()) => {}
            Err(e)
                if matches!(
                    e.code(),
                    git2::ErrorCode::UnbornBranch | git2::ErrorCode::NotFound
                ) =>
            {
                return Ok(Vec::new());
            }
            Err(e) => return Err(GitError::internal("HEAD", e)),
        }

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid.map_err(|e| GitError::internal("traversing history", e))?;
            commits.push(CommitHash::new(oid.to_string())?);
        }
        Ok(commits)
    }

    /// Every local branch and the commit it targets.
    ///
    /// Branches whose names are not valid UTF-8 or do not peel to a commit
    /// are skipped.
    pub fn local_branches(&self) -> Result<Vec<(BranchName, CommitHash)>, GitError> {
        let branches = self
            .repo
            .branches(Some(git2::BranchType::Local))
            .map_err(|e| GitError::internal("listing branches", e))?;

        let mut result = Vec::new();
        for branch in branches {
            let (branch, _) = branch.map_err(|e| GitError::internal("listing branches", e))?;
            let name = match branch.name().ok().flatten().map(BranchName::new) {
                Some(Ok(name)) => name,
                _ => continue,
            };
            let commit = match branch.get().peel_to_commit() {
                Ok(commit) => commit,
                Err(_) => continue,
            };
            result.push((name, CommitHash::new(commit.id().to_string())?));
        }
        Ok(result)
    }

    // =========================================================================
    // Trees and Blobs
    // =========================================================================

    /// Timestamps of a commit.
    ///
    /// # Errors
    ///
    /// - [`GitError::CommitNotFound`] if the commit doesn't exist
    pub fn commit_info(&self, hash: &CommitHash) -> Result<CommitInfo, GitError> {
        let commit = self.find_commit(hash)?;
        let author_time = to_utc(commit.author().when());
        let commit_time = to_utc(commit.committer().when());
        Ok(CommitInfo {
            hash: hash.clone(),
            author_time,
            commit_time,
        })
    }

    /// Locate `path` in the commit's tree.
    ///
    /// `path` is repository-relative with no leading slash and must not be
    /// empty; the root tree has no entry of its own.
    ///
    /// # Errors
    ///
    /// - [`GitError::CommitNotFound`] if the commit doesn't exist
    /// - [`GitError::PathNotFound`] if the tree has no such entry
    pub fn find_entry(&self, hash: &CommitHash, path: &str) -> Result<EntryInfo, GitError> {
        let tree = self.find_tree(hash)?;
        let entry = tree
            .get_path(Path::new(path))
            .map_err(|e| self.path_error(hash, path, e))?;

        let mode = FileMode::from_git(entry.filemode() as u32);
        let size = if mode.has_content() {
            let odb = self
                .repo
                .odb()
                .map_err(|e| GitError::internal("object database", e))?;
            let (size, _) = odb
                .read_header(entry.id())
                .map_err(|e| GitError::internal(&format!("blob for {path:?}"), e))?;
            Some(size as u64)
        } else {
            None
        };

        Ok(EntryInfo { mode, size })
    }

    /// Visit every entry of the commit's tree in pre-order.
    ///
    /// `visit` receives the entry's full repository-relative path and its
    /// mode; returning [`Walk::SkipSubtree`] for a tree prunes it.
    pub fn walk_tree<F>(&self, hash: &CommitHash, mut visit: F) -> Result<(), GitError>
    where
        F: FnMut(&str, FileMode) -> Walk,
    {
        let tree = self.find_tree(hash)?;
        tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
            let name = String::from_utf8_lossy(entry.name_bytes());
            let full = format!("{root}{name}");
            match visit(&full, FileMode::from_git(entry.filemode() as u32)) {
                Walk::Continue => git2::TreeWalkResult::Ok,
                Walk::SkipSubtree => git2::TreeWalkResult::Skip,
            }
        })
        .map_err(|e| GitError::internal(&format!("walking tree of {hash}"), e))
    }

    /// Read the complete content of the blob at `path`.
    ///
    /// # Errors
    ///
    /// - [`GitError::CommitNotFound`] if the commit doesn't exist
    /// - [`GitError::PathNotFound`] if the tree has no such entry
    /// - [`GitError::NotAFile`] if the entry is not a blob
    pub fn read_file(&self, hash: &CommitHash, path: &str) -> Result<Vec<u8>, GitError> {
        let tree = self.find_tree(hash)?;
        let entry = tree
            .get_path(Path::new(path))
            .map_err(|e| self.path_error(hash, path, e))?;

        if entry.kind() != Some(git2::ObjectType::Blob) {
            return Err(GitError::NotAFile {
                commit: hash.to_string(),
                path: path.to_string(),
            });
        }

        let blob = self
            .repo
            .find_blob(entry.id())
            .map_err(|e| GitError::internal(&format!("blob for {path:?}"), e))?;
        Ok(blob.content().to_vec())
    }

    fn find_commit(&self, hash: &CommitHash) -> Result<git2::Commit<'_>, GitError> {
        let oid = git2::Oid::from_str(hash.as_str())
            .map_err(|e| GitError::internal(hash.as_str(), e))?;
        self.repo.find_commit(oid).map_err(|e| match e.code() {
            git2::ErrorCode::NotFound => GitError::CommitNotFound {
                commit: hash.to_string(),
            },
            _ => GitError::internal(hash.as_str(), e),
        })
    }

    fn find_tree(&self, hash: &CommitHash) -> Result<git2::Tree<'_>, GitError> {
        self.find_commit(hash)?
            .tree()
            .map_err(|e| GitError::internal(&format!("tree of {hash}"), e))
    }

    fn path_error(&self, hash: &CommitHash, path: &str, err: git2::Error) -> GitError {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::PathNotFound {
                commit: hash.to_string(),
                path: path.to_string(),
            },
            _ => GitError::internal(&format!("{path:?} at {hash}"), err),
        }
    }
}

/// Lowest socket timeout handed to libgit2 so far, in milliseconds.
static SOCKET_TIMEOUT_MS: Mutex<Option<i32>> = Mutex::new(None);

/// Bound every connect, socket read and socket write libgit2 makes.
///
/// Progress callbacks only run once objects flow, so a remote that accepts
/// the connection and then stalls during ref negotiation is caught here
/// instead. libgit2 keeps these timeouts process-wide; the lowest value
/// requested wins.
pub fn limit_socket_timeout(timeout: Duration) {
    let ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX).max(1);
    let mut current = SOCKET_TIMEOUT_MS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if (*current).is_some_and(|set| set <= ms) {
        return;
    }
    // SAFETY: every write goes through SOCKET_TIMEOUT_MS, and libgit2 only
    // reads the two ints when a stream connects or polls.
    let applied = unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(ms)
            .and_then(|()| git2::opts::set_server_timeout_in_milliseconds(ms))
    };
    if applied.is_ok() {
        *current = Some(ms);
    }
}

/// Fetch options whose transfer aborts once `deadline` has passed.
fn fetch_options<'cb>(deadline: Option<Instant>) -> git2::FetchOptions<'cb> {
    let mut callbacks = git2::RemoteCallbacks::new();
    if let Some(deadline) = deadline {
        callbacks.transfer_progress(move |_| Instant::now() < deadline);
        callbacks.sideband_progress(move |_| Instant::now() < deadline);
    }
    let mut options = git2::FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

fn to_utc(time: git2::Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.seconds(), 0).unwrap_or(DateTime::UNIX_EPOCH)
}
