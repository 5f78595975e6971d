//! core::paths
//!
//! Centralized path routing for mirror storage.
//!
//! # Storage Layout
//!
//! Every mirror lives under the configured base path at a location derived
//! from its remote URL:
//!
//! - `<base>/<host>/<path>.git` - bare mirror of `https://<host>/<path>`
//! - `<base>/<host>/<path>.git.lock` - advisory lock file for that mirror
//! - `<base>/local/<path>.git` - mirror of a local path or `file://` URL
//!
//! The key `<host>/<path>` is also the registry key, so two spellings of
//! the same remote (`https://github.com/o/r` and `https://github.com/o/r.git`)
//! share one mirror.
//!
//! # Example
//!
//! ```
//! use commitfs::core::paths::{store_path, MirrorPaths};
//! use std::path::{Path, PathBuf};
//!
//! assert_eq!(store_path("https://github.com/owner/repo.git").unwrap(), "github.com/owner/repo");
//! assert_eq!(store_path("git@github.com:owner/repo.git").unwrap(), "github.com/owner/repo");
//!
//! let paths = MirrorPaths::new("/tmp/commitfs");
//! assert_eq!(
//!     paths.mirror_dir("https://github.com/owner/repo").unwrap(),
//!     PathBuf::from("/tmp/commitfs/github.com/owner/repo.git")
//! );
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from URL normalization.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("repository url is empty")]
    Empty,

    #[error("repository url has no path: {0}")]
    NoPath(String),

    #[error("repository url escapes the storage root: {0}")]
    Traversal(String),
}

/// Normalize a remote URL into a relative storage key (`host/path`).
///
/// Handles `scheme://[user@]host[:port]/path`, scp-like `user@host:path`,
/// `file://` URLs and plain local paths (keyed under `local/`). The host
/// is lowercased; trailing slashes and a `.git` suffix are dropped.
///
/// # Errors
///
/// - [`PathError::Empty`] for an empty URL
/// - [`PathError::NoPath`] when no repository path is present
/// - [`PathError::Traversal`] when a `.` or `..` segment would escape the base
pub fn store_path(url: &str) -> Result<String, PathError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(PathError::Empty);
    }

    let (host, path) = if let Some(rest) = url.strip_prefix("file://") {
        ("local".to_string(), rest)
    } else if let Some((_, rest)) = url.split_once("://") {
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host = authority.rsplit('@').next().unwrap_or(authority);
        (host.to_ascii_lowercase(), path)
    } else if let Some((authority, path)) = scp_like(url) {
        let host = authority.rsplit('@').next().unwrap_or(authority);
        (host.to_ascii_lowercase(), path)
    } else {
        ("local".to_string(), url)
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path).trim_end_matches('/');

    let mut segments = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(PathError::Traversal(url.to_string()));
        }
        segments.push(segment);
    }
    if segments.is_empty() || host.is_empty() {
        return Err(PathError::NoPath(url.to_string()));
    }

    Ok(format!("{}/{}", host, segments.join("/")))
}

/// Split `user@host:path` (but not `C:\...` or `/abs/path`).
fn scp_like(url: &str) -> Option<(&str, &str)> {
    if url.starts_with('/') {
        return None;
    }
    let (authority, path) = url.split_once(':')?;
    if authority.is_empty() || authority.contains('/') || authority.len() == 1 {
        return None;
    }
    Some((authority, path))
}

/// Centralized path routing for mirrors under one base path.
///
/// # Invariants
///
/// - Every mirror directory is inside `base`
/// - No code outside this module should compute mirror locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorPaths {
    base: PathBuf,
}

impl MirrorPaths {
    /// Create path routing rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The storage root.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The bare mirror directory for a remote URL.
    pub fn mirror_dir(&self, url: &str) -> Result<PathBuf, PathError> {
        let key = store_path(url)?;
        Ok(self.base.join(format!("{key}.git")))
    }

    /// The advisory lock file that guards a mirror directory.
    ///
    /// The lock sits beside the mirror so it can be taken before the mirror
    /// exists.
    pub fn lock_file(mirror_dir: &Path) -> PathBuf {
        let mut name = mirror_dir
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        mirror_dir.with_file_name(name)
    }
}
