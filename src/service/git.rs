//! service::git
//!
//! [`ResolutionService`] backed by a local bare mirror.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{Attributes, ResolutionService, Status, TreeEntryInfo};
use crate::core::types::{BranchName, CommitHash, FileMode};
use crate::git::Walk;
use crate::mirror::{Mirror, MirrorError};

/// Answers resolution queries from one [`Mirror`].
///
/// Every query runs under the mirror's shared lock, so it observes the
/// mirror either entirely before or entirely after a concurrent pull.
#[derive(Debug, Clone)]
pub struct GitResolutionService {
    mirror: Arc<Mirror>,
}

impl GitResolutionService {
    pub fn new(mirror: Arc<Mirror>) -> Self {
        Self { mirror }
    }

    /// The mirror this service reads.
    pub fn mirror(&self) -> &Arc<Mirror> {
        &self.mirror
    }

    fn fail(&self, operation: &str, commit: &str, path: &str, err: MirrorError) -> Status {
        let status = Status::from_mirror(operation, err);
        match &status {
            Status::NotFound(message) => debug!(operation, commit, path, %message, "not found"),
            other => warn!(operation, commit, path, error = %other, "resolution failed"),
        }
        status
    }
}

/// Validate a commit argument; anything that is not a full hash is unknown.
fn parse_commit(operation: &str, commit: &str) -> Result<CommitHash, Status> {
    CommitHash::new(commit)
        .map_err(|_| Status::NotFound(format!("{operation}: commit {commit:?} not found")))
}

/// Repository-relative form of `path` (no leading or trailing slash).
fn relative(path: &str) -> &str {
    path.trim_matches('/')
}

/// `path` as a directory prefix: one leading and one trailing slash.
fn dir_prefix(path: &str) -> String {
    let inner = relative(path);
    if inner.is_empty() {
        "/".to_string()
    } else {
        format!("/{inner}/")
    }
}

impl ResolutionService for GitResolutionService {
    fn list_commits(&self) -> Result<Vec<CommitHash>, Status> {
        self.mirror
            .read(|git| git.log_head())
            .map_err(|e| self.fail("ListCommits", "", "", e))
    }

    fn list_branches(&self) -> Result<BTreeMap<BranchName, CommitHash>, Status> {
        self.mirror
            .read(|git| git.local_branches())
            .map(|branches| branches.into_iter().collect())
            .map_err(|e| self.fail("ListBranches", "", "", e))
    }

    fn get_attributes(&self, commit: &str, path: &str) -> Result<Attributes, Status> {
        let hash = parse_commit("GetAttributes", commit)?;
        let rel = relative(path);

        self.mirror
            .read(|git| {
                let info = git.commit_info(&hash)?;
                // The root tree has no entry of its own.
                let (mode, size) = if rel.is_empty() {
                    (FileMode::Directory, 0)
                } else {
                    let entry = git.find_entry(&hash, rel)?;
                    (entry.mode, entry.size.unwrap_or(0))
                };
                Ok(Attributes {
                    mode,
                    size,
                    author_time: info.author_time,
                    commit_time: info.commit_time,
                })
            })
            .map_err(|e| self.fail("GetAttributes", commit, path, e))
    }

    fn list_dir(&self, commit: &str, path: &str) -> Result<Vec<TreeEntryInfo>, Status> {
        let hash = parse_commit("ListDir", commit)?;
        let dir = dir_prefix(path);

        self.mirror
            .read(|git| {
                let mut entries = Vec::new();
                git.walk_tree(&hash, |full, mode| {
                    let absolute = format!("/{full}");
                    match absolute.strip_prefix(dir.as_str()) {
                        Some(rest) if !rest.is_empty() && !rest.contains('/') => {
                            entries.push(TreeEntryInfo {
                                name: rest.to_string(),
                                mode,
                            });
                            Walk::SkipSubtree
                        }
                        Some(_) => Walk::SkipSubtree,
                        // Only descend along the path leading to `dir`.
                        None if dir.starts_with(&format!("{absolute}/")) => Walk::Continue,
                        None => Walk::SkipSubtree,
                    }
                })?;
                Ok(entries)
            })
            .map_err(|e| self.fail("ListDir", commit, path, e))
    }

    fn get_file(&self, commit: &str, path: &str) -> Result<Vec<u8>, Status> {
        let hash = parse_commit("GetFile", commit)?;
        let rel = relative(path);

        self.mirror
            .read(|git| git.read_file(&hash, rel))
            .map_err(|e| self.fail("GetFile", commit, path, e))
    }
}
