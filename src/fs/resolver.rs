//! fs::resolver
//!
//! Translate filesystem calls into resolution-service calls.
//!
//! # Design
//!
//! Each call decodes its path with [`VirtualPath::parse`], issues at most
//! one service call (two for symlinks inside a commit), and renders the
//! result. Nothing is cached here: a branch lookup always reflects the
//! mirror at call time. Kernel-side caching is governed by the mount's
//! TTLs.
//!
//! Commit hashes at `/commits/<hash>` pass a syntactic gate first; a
//! malformed hash is not-found without any service call. What happens to
//! a well-formed hash at that depth is the [`CommitCheck`] policy.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::path::{VirtualPath, BRANCHES, COMMITS};
use super::FsError;
use crate::core::config::CommitCheck;
use crate::core::types::{BranchName, FileMode};
use crate::service::{Attributes, ResolutionService};

/// File type as the kernel sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
    Symlink,
}

impl NodeKind {
    /// Kind and permission bits for a tree entry mode.
    ///
    /// Submodules appear as empty directories; modes with no rendering of
    /// their own appear as read-only files.
    pub fn render(mode: FileMode) -> (NodeKind, u16) {
        match mode {
            FileMode::Directory | FileMode::Submodule => (NodeKind::Directory, 0o555),
            FileMode::Regular => (NodeKind::File, 0o444),
            FileMode::Executable => (NodeKind::File, 0o555),
            FileMode::Symlink => (NodeKind::Symlink, 0o555),
            FileMode::Empty | FileMode::Unknown => (NodeKind::File, 0o444),
        }
    }

    fn type_bits(self) -> u32 {
        match self {
            NodeKind::Directory => libc::S_IFDIR as u32,
            NodeKind::File => libc::S_IFREG as u32,
            NodeKind::Symlink => libc::S_IFLNK as u32,
        }
    }
}

/// Attributes of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsAttr {
    pub kind: NodeKind,
    pub perm: u16,
    pub size: u64,
    /// Author time of the commit, for nodes inside one.
    pub author_time: Option<DateTime<Utc>>,
    /// Commit time of the commit, for nodes inside one.
    pub commit_time: Option<DateTime<Utc>>,
}

impl FsAttr {
    fn directory() -> Self {
        Self {
            kind: NodeKind::Directory,
            perm: 0o555,
            size: 0,
            author_time: None,
            commit_time: None,
        }
    }

    fn symlink(target: &str) -> Self {
        Self {
            kind: NodeKind::Symlink,
            perm: 0o555,
            size: target.len() as u64,
            author_time: None,
            commit_time: None,
        }
    }

    fn from_service(attrs: Attributes) -> Self {
        let (kind, perm) = NodeKind::render(attrs.mode);
        Self {
            kind,
            perm,
            size: attrs.size,
            author_time: Some(attrs.author_time),
            commit_time: Some(attrs.commit_time),
        }
    }

    /// Full `st_mode`: type bits and permission bits.
    pub fn mode(&self) -> u32 {
        self.kind.type_bits() | u32::from(self.perm)
    }
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirEntry {
    /// A file or directory.
    Node { name: String, kind: NodeKind },
    /// A symlink whose target is known without another lookup.
    Symlink { name: String, target: String },
}

impl DirEntry {
    pub fn name(&self) -> &str {
        match self {
            DirEntry::Node { name, .. } | DirEntry::Symlink { name, .. } => name,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            DirEntry::Node { kind, .. } => *kind,
            DirEntry::Symlink { .. } => NodeKind::Symlink,
        }
    }
}

/// A call that would change the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Mkdir,
    Mknod,
    Unlink,
    Rmdir,
    Rename,
    Link,
    Symlink,
    Write,
    Chmod,
    Chown,
    Truncate,
    Utime,
    SetXattr,
    RemoveXattr,
}

/// Decodes mount paths and answers filesystem calls through a
/// [`ResolutionService`].
#[derive(Clone)]
pub struct VirtualPathResolver {
    service: Arc<dyn ResolutionService>,
    commit_check: CommitCheck,
}

impl std::fmt::Debug for VirtualPathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualPathResolver")
            .field("commit_check", &self.commit_check)
            .finish_non_exhaustive()
    }
}

impl VirtualPathResolver {
    pub fn new(service: Arc<dyn ResolutionService>) -> Self {
        Self {
            service,
            commit_check: CommitCheck::default(),
        }
    }

    /// How a well-formed hash at `/commits/<hash>` is checked.
    pub fn with_commit_check(mut self, commit_check: CommitCheck) -> Self {
        self.commit_check = commit_check;
        self
    }

    pub fn commit_check(&self) -> CommitCheck {
        self.commit_check
    }

    /// Attributes of `path`.
    pub fn attributes(&self, path: &str) -> Result<FsAttr, FsError> {
        logged("attributes", path, || match decode(path)? {
            VirtualPath::Root | VirtualPath::Commits | VirtualPath::Branches => {
                Ok(FsAttr::directory())
            }
            VirtualPath::Branch { name } => {
                let target = self.branch_target(&name, path)?;
                Ok(FsAttr::symlink(&target))
            }
            VirtualPath::Commit { hash, path: rel } => {
                if rel.is_empty() && self.commit_check == CommitCheck::Lazy {
                    return Ok(FsAttr::directory());
                }
                let attrs = self.service.get_attributes(&hash, &service_path(&rel))?;
                Ok(FsAttr::from_service(attrs))
            }
        })
    }

    /// Entries of the directory at `path`.
    pub fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        logged("list_directory", path, || match decode(path)? {
            VirtualPath::Root => Ok(vec![
                DirEntry::Node {
                    name: COMMITS.to_string(),
                    kind: NodeKind::Directory,
                },
                DirEntry::Node {
                    name: BRANCHES.to_string(),
                    kind: NodeKind::Directory,
                },
            ]),
            VirtualPath::Commits => Ok(self
                .service
                .list_commits()?
                .into_iter()
                .map(|hash| DirEntry::Node {
                    name: hash.to_string(),
                    kind: NodeKind::Directory,
                })
                .collect()),
            VirtualPath::Branches => Ok(self
                .service
                .list_branches()?
                .into_iter()
                // `feature/x` cannot be one path segment.
                .filter(|(name, _)| name.is_single_segment())
                .map(|(name, hash)| DirEntry::Symlink {
                    name: name.to_string(),
                    target: VirtualPath::branch_target(&hash),
                })
                .collect()),
            VirtualPath::Branch { .. } => Err(FsError::NotFound(path.to_string())),
            VirtualPath::Commit { hash, path: rel } => {
                let entries = self.service.list_dir(&hash, &service_path(&rel))?;
                Ok(entries
                    .into_iter()
                    .map(|entry| DirEntry::Node {
                        name: entry.name,
                        kind: NodeKind::render(entry.mode).0,
                    })
                    .collect())
            }
        })
    }

    /// Complete content of the file at `path`.
    pub fn read(&self, path: &str) -> Result<Arc<[u8]>, FsError> {
        logged("read", path, || match decode(path)? {
            VirtualPath::Commit { hash, path: rel } => {
                if rel.is_empty() {
                    return Err(FsError::IsDirectory(path.to_string()));
                }
                let contents = self.service.get_file(&hash, &service_path(&rel))?;
                Ok(Arc::from(contents))
            }
            VirtualPath::Branch { .. } => Err(FsError::NotFound(path.to_string())),
            _ => Err(FsError::IsDirectory(path.to_string())),
        })
    }

    /// Target of the symlink at `path`.
    ///
    /// Branches point at `../commits/<hash>`; symlinks stored in a commit
    /// point wherever their blob says.
    pub fn read_symlink_target(&self, path: &str) -> Result<String, FsError> {
        logged("read_symlink_target", path, || match decode(path)? {
            VirtualPath::Branch { name } => self.branch_target(&name, path),
            VirtualPath::Commit { hash, path: rel } => {
                let rel = service_path(&rel);
                let attrs = self.service.get_attributes(&hash, &rel)?;
                if attrs.mode != FileMode::Symlink {
                    return Err(FsError::NotASymlink(path.to_string()));
                }
                let target = self.service.get_file(&hash, &rel)?;
                Ok(String::from_utf8_lossy(&target).into_owned())
            }
            _ => Err(FsError::NotASymlink(path.to_string())),
        })
    }

    /// Check access to `path`. Write access is always refused.
    pub fn access(&self, path: &str, mask: i32) -> Result<(), FsError> {
        if mask & libc::W_OK != 0 {
            return Err(self.reject(Mutation::Write, path));
        }
        self.attributes(path).map(|_| ())
    }

    /// Value of extended attribute `name`. None are modeled, so this is
    /// always empty.
    pub fn get_xattr(&self, path: &str, name: &str) -> Result<Vec<u8>, FsError> {
        debug!(path, name, "get_xattr");
        Ok(Vec::new())
    }

    /// Names of extended attributes. Always empty.
    pub fn list_xattr(&self, path: &str) -> Result<Vec<String>, FsError> {
        debug!(path, "list_xattr");
        Ok(Vec::new())
    }

    /// The error for any mutation: the tree is read-only.
    pub fn reject(&self, mutation: Mutation, path: &str) -> FsError {
        debug!(?mutation, path, "rejected mutation");
        FsError::ReadOnly(path.to_string())
    }

    fn branch_target(&self, name: &str, path: &str) -> Result<String, FsError> {
        let branch =
            BranchName::new(name).map_err(|_| FsError::NotFound(path.to_string()))?;
        let branches = self.service.list_branches()?;
        branches
            .get(&branch)
            .map(VirtualPath::branch_target)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }
}

/// Decode `path`, rejecting a malformed commit hash without asking the
/// service.
fn decode(path: &str) -> Result<VirtualPath, FsError> {
    VirtualPath::parse(path)
        .filter(VirtualPath::has_well_formed_hash)
        .ok_or_else(|| FsError::NotFound(path.to_string()))
}

fn service_path(rel: &str) -> String {
    format!("/{rel}")
}

/// Run one filesystem call, logging the call and any failure.
fn logged<T>(operation: &str, path: &str, f: impl FnOnce() -> Result<T, FsError>) -> Result<T, FsError> {
    debug!(operation, path, "called");
    let result = f();
    match &result {
        Ok(_) => {}
        Err(FsError::NotFound(_)) => debug!(operation, path, "not found"),
        Err(e) => warn!(operation, path, errno = e.errno(), error = %e, "failed"),
    }
    result
}
