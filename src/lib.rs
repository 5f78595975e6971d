//! commitfs - Every commit and branch of a git repository as a read-only filesystem
//!
//! A server keeps a bare mirror of one remote repository and answers
//! resolution requests about it. A client maps a virtual tree onto those
//! requests:
//!
//! ```text
//! /
//! ├── commits/
//! │   └── <hash>/...        full tree of that commit
//! └── branches/
//!     └── <name> -> ../commits/<hash>
//! ```
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer
//! - [`core`] - Domain types, configuration, storage routing and locking
//! - [`git`] - Single interface for all Git operations
//! - [`mirror`] - Bare mirrors with clone, pull and shared reads
//! - [`service`] - The resolution service and its git-backed implementation
//! - [`transport`] - Line-delimited JSON server and client for the service
//! - [`refresh`] - Push-triggered background pulls
//! - [`fs`] - Virtual path resolution and the optional FUSE mount
//!
//! # Invariants
//!
//! 1. Everything below the mount root is read-only
//! 2. A pull never runs concurrently with a read of the same mirror
//! 3. Object-graph access goes through [`git`] only

pub mod cli;
pub mod core;
pub mod fs;
pub mod git;
pub mod mirror;
pub mod refresh;
pub mod service;
pub mod transport;
