//! service::mock
//!
//! In-memory resolution service for deterministic testing.
//!
//! # Design
//!
//! The mock stores commits, branches and files in memory, records every
//! call it receives, and can be told to fail every call with a given
//! status. Directories are implied by file paths.
//!
//! # Example
//!
//! ```
//! use commitfs::core::types::{BranchName, CommitHash, FileMode};
//! use commitfs::service::mock::{MockCall, MockService};
//! use commitfs::service::ResolutionService;
//!
//! let hash = CommitHash::new("a".repeat(40)).unwrap();
//! let service = MockService::new()
//!     .with_commit(&hash)
//!     .with_file(&hash, "src/lib.rs", FileMode::Regular, b"fn main() {}")
//!     .with_branch(&BranchName::new("main").unwrap(), &hash);
//!
//! let entries = service.list_dir(hash.as_str(), "/").unwrap();
//! assert_eq!(entries[0].name, "src");
//! assert_eq!(entries[0].mode, FileMode::Directory);
//! assert_eq!(service.calls().len(), 1);
//! assert!(matches!(service.calls()[0], MockCall::ListDir { .. }));
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::{Attributes, ResolutionService, Status, TreeEntryInfo};
use crate::core::types::{BranchName, CommitHash, FileMode};

/// Recorded call for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ListCommits,
    ListBranches,
    GetAttributes { commit: String, path: String },
    ListDir { commit: String, path: String },
    GetFile { commit: String, path: String },
}

#[derive(Debug, Clone)]
struct MockFile {
    mode: FileMode,
    content: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockServiceInner {
    /// Commits, most recent first.
    commits: Vec<CommitHash>,
    branches: BTreeMap<BranchName, CommitHash>,
    /// Files per commit keyed by repository-relative path.
    files: BTreeMap<CommitHash, BTreeMap<String, MockFile>>,
    fail_with: Option<Status>,
    calls: Vec<MockCall>,
}

/// Mock resolution service.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Debug, Clone, Default)]
pub struct MockService {
    inner: Arc<Mutex<MockServiceInner>>,
}

/// Timestamp reported for every mock commit.
pub fn mock_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a commit, newer than every commit added before it.
    pub fn with_commit(self, hash: &CommitHash) -> Self {
        {
            let mut inner = self.lock();
            inner.commits.insert(0, hash.clone());
            inner.files.entry(hash.clone()).or_default();
        }
        self
    }

    /// Add a file (or symlink, or submodule) to a commit.
    pub fn with_file(self, hash: &CommitHash, path: &str, mode: FileMode, content: &[u8]) -> Self {
        self.lock().files.entry(hash.clone()).or_default().insert(
            path.trim_matches('/').to_string(),
            MockFile {
                mode,
                content: content.to_vec(),
            },
        );
        self
    }

    /// Point a branch at a commit.
    pub fn with_branch(self, name: &BranchName, hash: &CommitHash) -> Self {
        self.set_branch(name, hash);
        self
    }

    /// Move a branch after construction.
    pub fn set_branch(&self, name: &BranchName, hash: &CommitHash) {
        self.lock().branches.insert(name.clone(), hash.clone());
    }

    /// Fail every subsequent call with `status`.
    pub fn fail_with(&self, status: Status) {
        self.lock().fail_with = Some(status);
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockServiceInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: MockCall) -> Result<(), Status> {
        let mut inner = self.lock();
        inner.calls.push(call);
        match &inner.fail_with {
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }

    fn files_at(&self, commit: &str) -> Result<BTreeMap<String, MockFile>, Status> {
        let inner = self.lock();
        CommitHash::new(commit)
            .ok()
            .and_then(|hash| inner.files.get(&hash).cloned())
            .ok_or_else(|| Status::NotFound(format!("commit {commit:?} not found")))
    }
}

/// Mode of `path` given a commit's files, with directories implied.
fn mode_of(files: &BTreeMap<String, MockFile>, path: &str) -> Option<FileMode> {
    if path.is_empty() {
        return Some(FileMode::Directory);
    }
    if let Some(file) = files.get(path) {
        return Some(file.mode);
    }
    let prefix = format!("{path}/");
    files
        .keys()
        .any(|k| k.starts_with(&prefix))
        .then_some(FileMode::Directory)
}

impl ResolutionService for MockService {
    fn list_commits(&self) -> Result<Vec<CommitHash>, Status> {
        self.record(MockCall::ListCommits)?;
        Ok(self.lock().commits.clone())
    }

    fn list_branches(&self) -> Result<BTreeMap<BranchName, CommitHash>, Status> {
        self.record(MockCall::ListBranches)?;
        Ok(self.lock().branches.clone())
    }

    fn get_attributes(&self, commit: &str, path: &str) -> Result<Attributes, Status> {
        self.record(MockCall::GetAttributes {
            commit: commit.to_string(),
            path: path.to_string(),
        })?;
        let files = self.files_at(commit)?;
        let rel = path.trim_matches('/');
        let mode = mode_of(&files, rel)
            .ok_or_else(|| Status::NotFound(format!("path {path:?} not found")))?;
        let size = match files.get(rel) {
            Some(file) if mode.has_content() => file.content.len() as u64,
            _ => 0,
        };
        Ok(Attributes {
            mode,
            size,
            author_time: mock_time(),
            commit_time: mock_time(),
        })
    }

    fn list_dir(&self, commit: &str, path: &str) -> Result<Vec<TreeEntryInfo>, Status> {
        self.record(MockCall::ListDir {
            commit: commit.to_string(),
            path: path.to_string(),
        })?;
        let files = self.files_at(commit)?;
        let rel = path.trim_matches('/');
        let prefix = if rel.is_empty() {
            String::new()
        } else {
            format!("{rel}/")
        };

        let mut children: BTreeMap<String, FileMode> = BTreeMap::new();
        for (full, file) in &files {
            let Some(rest) = full.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    children.insert(dir.to_string(), FileMode::Directory);
                }
                None => {
                    children.insert(rest.to_string(), file.mode);
                }
            }
        }
        Ok(children
            .into_iter()
            .map(|(name, mode)| TreeEntryInfo { name, mode })
            .collect())
    }

    fn get_file(&self, commit: &str, path: &str) -> Result<Vec<u8>, Status> {
        self.record(MockCall::GetFile {
            commit: commit.to_string(),
            path: path.to_string(),
        })?;
        let files = self.files_at(commit)?;
        files
            .get(path.trim_matches('/'))
            .filter(|f| f.mode.has_content())
            .map(|f| f.content.clone())
            .ok_or_else(|| Status::NotFound(format!("file {path:?} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(c: char) -> CommitHash {
        CommitHash::new(c.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn commits_are_newest_first() {
        let service = MockService::new().with_commit(&hash('1')).with_commit(&hash('2'));
        let commits = service.list_commits().unwrap();
        assert_eq!(commits, vec![hash('2'), hash('1')]);
    }

    #[test]
    fn branches_move() {
        let main = BranchName::new("main").unwrap();
        let service = MockService::new().with_branch(&main, &hash('1'));
        service.set_branch(&main, &hash('2'));
        assert_eq!(service.list_branches().unwrap()[&main], hash('2'));
    }

    #[test]
    fn directories_are_implied() {
        let h = hash('a');
        let service = MockService::new()
            .with_commit(&h)
            .with_file(&h, "a/b/c.txt", FileMode::Regular, b"x");

        let attrs = service.get_attributes(h.as_str(), "a/b").unwrap();
        assert_eq!(attrs.mode, FileMode::Directory);
        assert_eq!(attrs.size, 0);

        let entries = service.list_dir(h.as_str(), "/a").unwrap();
        assert_eq!(
            entries,
            vec![TreeEntryInfo {
                name: "b".into(),
                mode: FileMode::Directory
            }]
        );
    }

    #[test]
    fn fail_with_applies_to_every_call() {
        let service = MockService::new().with_commit(&hash('a'));
        service.fail_with(Status::Internal("boom".into()));
        assert_eq!(service.list_commits(), Err(Status::Internal("boom".into())));
        assert_eq!(service.calls(), vec![MockCall::ListCommits]);
    }

    #[test]
    fn unknown_commit_is_not_found() {
        let service = MockService::new();
        assert!(matches!(
            service.get_file(hash('b').as_str(), "a.txt"),
            Err(Status::NotFound(_))
        ));
    }
}
