//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`CommitHash`] - 40-character lowercase hex commit identifier
//! - [`BranchName`] - Validated Git branch name
//! - [`RefName`] - Validated Git reference name (`refs/...`)
//! - [`FileMode`] - Mode of a tree entry as exposed to filesystem clients
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use commitfs::core::types::{BranchName, CommitHash, RefName};
//!
//! let branch = BranchName::new("main").unwrap();
//! let hash = CommitHash::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! let refname = RefName::for_branch(&branch);
//! assert_eq!(refname.as_str(), "refs/heads/main");
//!
//! assert!(BranchName::new("invalid..name").is_err());
//! assert!(CommitHash::new("not-a-sha").is_err());
//! assert!(!CommitHash::is_well_formed(&"g".repeat(40)));
//! # let _ = hash;
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid commit hash: {0}")]
    InvalidCommitHash(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),
}

/// A commit identifier: exactly 40 lowercase hexadecimal characters.
///
/// This is the only spelling of a commit that appears under `/commits`,
/// so construction does not normalize case. `ABC...` is rejected rather
/// than silently mapped onto `abc...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash(String);

impl CommitHash {
    /// Length of a SHA-1 commit hash in hex characters.
    pub const LEN: usize = 40;

    /// Create a new validated commit hash.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidCommitHash` unless `hash` is exactly 40
    /// lowercase hex characters.
    pub fn new(hash: impl Into<String>) -> Result<Self, TypeError> {
        let hash = hash.into();
        if !Self::is_well_formed(&hash) {
            return Err(TypeError::InvalidCommitHash(format!(
                "expected {} lowercase hex characters, got {:?}",
                Self::LEN,
                hash
            )));
        }
        Ok(Self(hash))
    }

    /// Cheap syntactic gate: does `s` look like a commit hash?
    ///
    /// This says nothing about whether the commit exists.
    ///
    /// # Example
    ///
    /// ```
    /// use commitfs::core::types::CommitHash;
    ///
    /// assert!(CommitHash::is_well_formed(&"a".repeat(40)));
    /// assert!(!CommitHash::is_well_formed(&"a".repeat(41)));
    /// assert!(!CommitHash::is_well_formed(&"A".repeat(40)));
    /// ```
    pub fn is_well_formed(s: &str) -> bool {
        s.len() == Self::LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Get an abbreviated form of the hash.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    /// Get the hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CommitHash {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CommitHash> for String {
    fn from(hash: CommitHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for CommitHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommitHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated Git branch name (the part after `refs/heads/`).
///
/// Names follow Git's refname rules: not empty, no leading `.` or `-`,
/// no trailing `.lock` or `/`, no `..`, `@{`, `//`, control characters
/// or any of `` ~^:\?*[``.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_ref_component_rules(&name).map_err(TypeError::InvalidBranchName)?;
        if name == "@" {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be '@' (reserved)".into(),
            ));
        }
        if name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '-'".into(),
            ));
        }
        Ok(Self(name))
    }

    /// Whether this name can be a single path segment under `/branches`.
    ///
    /// Branch names may contain `/` (`feature/x`), which the one-level
    /// `/branches/<name>` namespace cannot express.
    pub fn is_single_segment(&self) -> bool {
        !self.0.contains('/')
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated, fully qualified Git reference name.
///
/// Only names under `refs/` are accepted; `HEAD` and refspec syntax such
/// as `+a:b` are rejected so a ref name can be embedded in a refspec
/// verbatim.
///
/// # Example
///
/// ```
/// use commitfs::core::types::{BranchName, RefName};
///
/// let refname = RefName::new("refs/heads/main").unwrap();
/// assert_eq!(refname.branch().map(|b| b.to_string()), Some("main".to_string()));
///
/// assert!(RefName::new("HEAD").is_err());
/// assert!(RefName::new("+refs/heads/a:refs/heads/a").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name is not under `refs/`
    /// or violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if !name.starts_with("refs/") {
            return Err(TypeError::InvalidRefName(format!(
                "ref name must start with 'refs/': {name:?}"
            )));
        }
        validate_ref_component_rules(&name).map_err(TypeError::InvalidRefName)?;
        Ok(Self(name))
    }

    /// Create a ref name for a branch (`refs/heads/<branch>`).
    pub fn for_branch(branch: &BranchName) -> Self {
        Self(format!("refs/heads/{}", branch.as_str()))
    }

    /// The branch this ref names, if it is under `refs/heads/`.
    pub fn branch(&self) -> Option<BranchName> {
        self.0
            .strip_prefix("refs/heads/")
            .and_then(|name| BranchName::new(name).ok())
    }

    /// The force-update refspec `+<ref>:<ref>`.
    pub fn force_refspec(&self) -> String {
        format!("+{0}:{0}", self.0)
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rules shared by branch and ref names.
fn validate_ref_component_rules(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".into());
    }
    if name.starts_with('.') || name.starts_with('/') {
        return Err("name cannot start with '.' or '/'".into());
    }
    if name.ends_with(".lock") || name.ends_with('/') {
        return Err("name cannot end with '.lock' or '/'".into());
    }
    for bad in ["..", "@{", "//"] {
        if name.contains(bad) {
            return Err(format!("name cannot contain '{bad}'"));
        }
    }

    const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
    if let Some(c) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
        return Err(format!("name cannot contain '{c}'"));
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err("name cannot contain control characters".into());
    }

    for component in name.split('/') {
        if component.starts_with('.') {
            return Err("path component cannot start with '.'".into());
        }
        if component.ends_with(".lock") {
            return Err("path component cannot end with '.lock'".into());
        }
    }

    Ok(())
}

/// Mode of a tree entry, as exposed to filesystem clients.
///
/// Serialized with the wire names `EMPTY`, `DIRECTORY`, `REGULAR`,
/// `EXECUTABLE`, `SYMLINK`, `SUBMODULE` and `UNKNOWN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileMode {
    Empty,
    Directory,
    Regular,
    Executable,
    Symlink,
    Submodule,
    Unknown,
}

impl FileMode {
    /// Translate a raw git tree-entry mode.
    ///
    /// The deprecated group-writable blob mode (`100664`) is a regular file.
    ///
    /// # Example
    ///
    /// ```
    /// use commitfs::core::types::FileMode;
    ///
    /// assert_eq!(FileMode::from_git(0o100644), FileMode::Regular);
    /// assert_eq!(FileMode::from_git(0o100664), FileMode::Regular);
    /// assert_eq!(FileMode::from_git(0o040000), FileMode::Directory);
    /// assert_eq!(FileMode::from_git(0o123456), FileMode::Unknown);
    /// ```
    pub fn from_git(raw: u32) -> Self {
        match raw {
            0 => FileMode::Empty,
            0o040000 => FileMode::Directory,
            0o100644 | 0o100664 => FileMode::Regular,
            0o100755 => FileMode::Executable,
            0o120000 => FileMode::Symlink,
            0o160000 => FileMode::Submodule,
            _ => FileMode::Unknown,
        }
    }

    /// Whether entries with this mode are backed by a blob.
    pub fn has_content(self) -> bool {
        matches!(
            self,
            FileMode::Regular | FileMode::Executable | FileMode::Symlink
        )
    }

    /// The wire name of this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            FileMode::Empty => "EMPTY",
            FileMode::Directory => "DIRECTORY",
            FileMode::Regular => "REGULAR",
            FileMode::Executable => "EXECUTABLE",
            FileMode::Symlink => "SYMLINK",
            FileMode::Submodule => "SUBMODULE",
            FileMode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
