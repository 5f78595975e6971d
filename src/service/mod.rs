//! service
//!
//! Read-only resolution queries against one repository.
//!
//! # Design
//!
//! [`ResolutionService`] is the seam between the filesystem adapter and the
//! object graph. It is implemented by:
//!
//! - [`GitResolutionService`], which reads a local [`Mirror`](crate::mirror::Mirror)
//! - [`RemoteService`](crate::transport::RemoteService), which forwards
//!   each call to a server over the wire
//! - [`mock::MockService`], an in-memory fake for tests
//!
//! so the adapter never knows whether the service is colocated.
//!
//! Every failure is a [`Status`]: `NotFound`, `Internal` or
//! `Unimplemented`, each carrying a message with the operation, commit and
//! path involved. Calls are single bounded attempts; nothing here retries.

mod git;
pub mod mock;

pub use git::GitResolutionService;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{BranchName, CommitHash, FileMode};
use crate::git::GitError;
use crate::mirror::MirrorError;

/// Structured failure of a resolution call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Unknown commit, branch or path.
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O failure, object-graph corruption or transport failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// Operation intentionally not provided by this deployment.
    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

impl Status {
    /// Classify a mirror failure raised while running `operation`.
    pub fn from_mirror(operation: &str, err: MirrorError) -> Self {
        let message = format!("{operation}: {err}");
        match err {
            MirrorError::Git(git) if is_missing(&git) => Status::NotFound(message),
            MirrorError::Pull { source, .. } if is_missing(&source) => Status::NotFound(message),
            _ => Status::Internal(message),
        }
    }

    /// The message carried by this status.
    pub fn message(&self) -> &str {
        match self {
            Status::NotFound(m) | Status::Internal(m) | Status::Unimplemented(m) => m,
        }
    }

    /// Whether this is a `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Status::NotFound(_))
    }
}

fn is_missing(err: &GitError) -> bool {
    matches!(
        err,
        GitError::CommitNotFound { .. }
            | GitError::PathNotFound { .. }
            | GitError::NotAFile { .. }
            | GitError::RefNotFound { .. }
    )
}

/// Attributes of one path at one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub mode: FileMode,
    /// Blob length in bytes; zero for directories and other non-blob modes.
    pub size: u64,
    pub author_time: DateTime<Utc>,
    pub commit_time: DateTime<Utc>,
}

/// One direct child of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntryInfo {
    /// Base name; never contains `/`.
    pub name: String,
    pub mode: FileMode,
}

/// Read-only queries against one repository.
///
/// `commit` arguments are passed through as received; implementations
/// report a malformed or unknown hash as [`Status::NotFound`]. `path`
/// arguments are repository-relative and may carry leading or trailing
/// slashes; the empty path (or `/`) is the commit's root tree.
pub trait ResolutionService: Send + Sync {
    /// Commits reachable from `HEAD`, most recent first.
    fn list_commits(&self) -> Result<Vec<CommitHash>, Status>;

    /// Every local branch and the commit it currently targets.
    fn list_branches(&self) -> Result<BTreeMap<BranchName, CommitHash>, Status>;

    /// Mode, size and commit timestamps of `path` at `commit`.
    fn get_attributes(&self, commit: &str, path: &str) -> Result<Attributes, Status>;

    /// Direct children of the directory `path` at `commit`.
    fn list_dir(&self, commit: &str, path: &str) -> Result<Vec<TreeEntryInfo>, Status>;

    /// Complete content of the file `path` at `commit`.
    fn get_file(&self, commit: &str, path: &str) -> Result<Vec<u8>, Status>;
}

impl<T: ResolutionService + ?Sized> ResolutionService for std::sync::Arc<T> {
    fn list_commits(&self) -> Result<Vec<CommitHash>, Status> {
        (**self).list_commits()
    }

    fn list_branches(&self) -> Result<BTreeMap<BranchName, CommitHash>, Status> {
        (**self).list_branches()
    }

    fn get_attributes(&self, commit: &str, path: &str) -> Result<Attributes, Status> {
        (**self).get_attributes(commit, path)
    }

    fn list_dir(&self, commit: &str, path: &str) -> Result<Vec<TreeEntryInfo>, Status> {
        (**self).list_dir(commit, path)
    }

    fn get_file(&self, commit: &str, path: &str) -> Result<Vec<u8>, Status> {
        (**self).get_file(commit, path)
    }
}
