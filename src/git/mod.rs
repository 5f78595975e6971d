//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **ONLY doorway** to Git. Every object-graph read and
//! every mirror mutation flows through this interface. No other module
//! should import `git2`.
//!
//! # Responsibilities
//!
//! - Bare clone and open of mirrors
//! - Forced fetch of a single ref, bounded by deadlines and socket timeouts
//! - History traversal and branch enumeration
//! - Tree lookup, tree walks and blob reads
//!
//! # Invariants
//!
//! - Mirrors are bare; no working tree is ever materialized
//! - All operations return strong types (CommitHash, BranchName, FileMode)

mod interface;

pub use interface::{
    limit_socket_timeout, CommitInfo, EntryInfo, FetchOutcome, Git, GitError, Walk,
};
