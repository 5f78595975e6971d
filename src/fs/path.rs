//! fs::path
//!
//! Grammar of paths under the mount point.

use crate::core::types::CommitHash;

pub const COMMITS: &str = "commits";
pub const BRANCHES: &str = "branches";

/// A decoded mount path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualPath {
    /// `/`
    Root,
    /// `/commits`
    Commits,
    /// `/branches`
    Branches,
    /// `/commits/<hash>` (empty `path`) or `/commits/<hash>/<path>`.
    ///
    /// `hash` is whatever the caller wrote; it has not been checked.
    Commit { hash: String, path: String },
    /// `/branches/<name>`
    Branch { name: String },
}

impl VirtualPath {
    /// Decode a mount path. Empty segments are ignored, so `//commits/`
    /// and `/commits` decode alike.
    ///
    /// Returns `None` for paths outside the grammar: unknown top-level
    /// names and anything below `/branches/<name>`.
    ///
    /// # Example
    ///
    /// ```
    /// use commitfs::fs::VirtualPath;
    ///
    /// let hash = "a".repeat(40);
    /// let parsed = VirtualPath::parse(&format!("/commits/{hash}/src/lib.rs")).unwrap();
    /// assert_eq!(parsed, VirtualPath::Commit { hash, path: "src/lib.rs".into() });
    /// assert_eq!(VirtualPath::parse("/"), Some(VirtualPath::Root));
    /// assert_eq!(VirtualPath::parse("/tags"), None);
    /// assert_eq!(VirtualPath::parse("/branches/main/x"), None);
    /// ```
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Some(VirtualPath::Root),
            [COMMITS] => Some(VirtualPath::Commits),
            [BRANCHES] => Some(VirtualPath::Branches),
            [COMMITS, hash, rest @ ..] => Some(VirtualPath::Commit {
                hash: (*hash).to_string(),
                path: rest.join("/"),
            }),
            [BRANCHES, name] => Some(VirtualPath::Branch {
                name: (*name).to_string(),
            }),
            _ => None,
        }
    }

    /// Whether this names a commit whose hash passes the syntactic gate.
    ///
    /// Other variants are trivially well formed.
    pub fn has_well_formed_hash(&self) -> bool {
        match self {
            VirtualPath::Commit { hash, .. } => CommitHash::is_well_formed(hash),
            _ => true,
        }
    }

    /// Relative target of a branch symlink.
    pub fn branch_target(hash: &CommitHash) -> String {
        format!("../{COMMITS}/{hash}")
    }
}

impl std::fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VirtualPath::Root => write!(f, "/"),
            VirtualPath::Commits => write!(f, "/{COMMITS}"),
            VirtualPath::Branches => write!(f, "/{BRANCHES}"),
            VirtualPath::Commit { hash, path } if path.is_empty() => {
                write!(f, "/{COMMITS}/{hash}")
            }
            VirtualPath::Commit { hash, path } => write!(f, "/{COMMITS}/{hash}/{path}"),
            VirtualPath::Branch { name } => write!(f, "/{BRANCHES}/{name}"),
        }
    }
}
