//! fs
//!
//! Filesystem adapter: a read-only POSIX-like hierarchy over the commit
//! graph.
//!
//! # Layout
//!
//! ```text
//! /
//! /commits
//! /commits/<40-hex-commit-hash>
//! /commits/<40-hex-commit-hash>/<repo-relative-path...>
//! /branches
//! /branches/<branch-name>              (symlink -> ../commits/<hash>)
//! ```
//!
//! # Modules
//!
//! - [`path`] decodes mount paths into [`VirtualPath`]s
//! - [`resolver`] answers filesystem calls with one service call each
//! - `fuse` (feature `mount`) adapts the resolver to the kernel
//!
//! # Errors
//!
//! [`FsError`] is what a filesystem client sees. The mapping from service
//! [`Status`] is total: `NotFound` becomes `ENOENT`, `Unimplemented`
//! becomes `ENOSYS`, anything else becomes `EIO`. Mutations are always
//! `EROFS`.

#[cfg(feature = "mount")]
pub mod fuse;
pub mod path;
pub mod resolver;

pub use path::VirtualPath;
pub use resolver::{DirEntry, FsAttr, Mutation, NodeKind, VirtualPathResolver};

use thiserror::Error;

use crate::service::Status;

/// A failed filesystem call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("function not implemented: {0}")]
    NotSupported(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("read-only file system: {0}")]
    ReadOnly(String),

    /// Content was requested from a directory.
    #[error("is a directory: {0}")]
    IsDirectory(String),

    /// A link target was requested from something that is not a link.
    #[error("not a symbolic link: {0}")]
    NotASymlink(String),
}

impl FsError {
    /// The errno reported to the kernel.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::NotSupported(_) => libc::ENOSYS,
            FsError::Io(_) => libc::EIO,
            FsError::ReadOnly(_) => libc::EROFS,
            FsError::IsDirectory(_) => libc::EISDIR,
            FsError::NotASymlink(_) => libc::EINVAL,
        }
    }
}

impl From<Status> for FsError {
    fn from(status: Status) -> Self {
        match status {
            Status::NotFound(m) => FsError::NotFound(m),
            Status::Unimplemented(m) => FsError::NotSupported(m),
            Status::Internal(m) => FsError::Io(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_total() {
        assert_eq!(
            FsError::from(Status::NotFound("x".into())).errno(),
            libc::ENOENT
        );
        assert_eq!(
            FsError::from(Status::Unimplemented("x".into())).errno(),
            libc::ENOSYS
        );
        assert_eq!(
            FsError::from(Status::Internal("x".into())).errno(),
            libc::EIO
        );
    }

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(
            FsError::ReadOnly("/commits".into()).to_string(),
            "read-only file system: /commits"
        );
        assert_eq!(FsError::ReadOnly(String::new()).errno(), libc::EROFS);
    }
}
