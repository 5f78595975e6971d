//! Shared fixtures for integration tests.
//!
//! Upstream repositories are built with the git CLI so the mirror code is
//! exercised against repositories it did not write itself.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// A non-bare upstream repository with a `main` branch.
pub struct TestRepo {
    dir: TempDir,
    ticks: std::cell::Cell<u32>,
}

impl TestRepo {
    /// Create an empty repository on `main`.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        run_git(dir.path(), &["init", "-q"], 0);
        run_git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"], 0);
        run_git(dir.path(), &["config", "user.email", "test@example.com"], 0);
        run_git(dir.path(), &["config", "user.name", "Test User"], 0);
        run_git(dir.path(), &["config", "commit.gpgsign", "false"], 0);
        Self {
            dir,
            ticks: std::cell::Cell::new(0),
        }
    }

    /// Create a repository with one commit containing `README.md`.
    pub fn with_initial_commit() -> Self {
        let repo = Self::new();
        repo.commit_file("README.md", "# Test Repo\n", "Initial commit");
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The repository as a clone URL.
    pub fn url(&self) -> String {
        self.dir.path().display().to_string()
    }

    /// Write `path` (creating parent directories) and commit it.
    pub fn commit_file(&self, path: &str, content: &str, message: &str) -> String {
        let full = self.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
        self.git(&["add", path]);
        self.commit(message)
    }

    /// Create a symlink `path -> target` and commit it.
    #[cfg(unix)]
    pub fn commit_symlink(&self, path: &str, target: &str, message: &str) -> String {
        let full = self.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::os::unix::fs::symlink(target, full).unwrap();
        self.git(&["add", path]);
        self.commit(message)
    }

    /// Mark `path` executable and commit it.
    pub fn commit_executable(&self, path: &str, content: &str, message: &str) -> String {
        std::fs::write(self.path().join(path), content).unwrap();
        self.git(&["add", path]);
        self.git(&["update-index", "--chmod=+x", path]);
        self.commit(message)
    }

    /// Commit whatever is staged. Each commit gets a later timestamp.
    pub fn commit(&self, message: &str) -> String {
        let tick = self.ticks.get() + 1;
        self.ticks.set(tick);
        run_git(self.path(), &["commit", "-q", "-m", message], tick);
        self.head()
    }

    pub fn branch(&self, name: &str) {
        self.git(&["branch", name]);
    }

    pub fn checkout(&self, name: &str) {
        self.git(&["checkout", "-q", name]);
    }

    /// Move `branch` to `commit` without touching the working tree.
    pub fn reset_branch(&self, branch: &str, commit: &str) {
        self.git(&["update-ref", &format!("refs/heads/{branch}"), commit]);
    }

    pub fn head(&self) -> String {
        self.rev_parse("HEAD")
    }

    pub fn rev_parse(&self, rev: &str) -> String {
        let output = Command::new("git")
            .args(["rev-parse", rev])
            .current_dir(self.path())
            .output()
            .expect("git rev-parse failed");
        assert!(output.status.success(), "git rev-parse {rev} failed");
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    fn git(&self, args: &[&str]) {
        run_git(self.path(), args, self.ticks.get());
    }
}

/// Run a git command with a fixed clock offset by `tick` minutes.
pub fn run_git(dir: &Path, args: &[&str], tick: u32) {
    let date = format!("2024-01-01T00:{:02}:00Z", tick % 60);
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", &date)
        .env("GIT_COMMITTER_DATE", &date)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}
