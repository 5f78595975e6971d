//! core
//!
//! Core domain types, configuration and storage routing for commitfs.
//!
//! # Modules
//!
//! - [`types`] - Strong types: CommitHash, BranchName, RefName, FileMode
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Mirror storage locations and URL normalization
//! - [`lock`] - Cross-process mirror lock

pub mod config;
pub mod lock;
pub mod paths;
pub mod types;
