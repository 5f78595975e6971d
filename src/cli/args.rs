//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Read this config file instead of the default
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::config::CommitCheck;

/// commitfs - Every commit and branch of a git repository as a read-only filesystem
#[derive(Parser, Debug)]
#[command(name = "commitfs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: $COMMITFS_CONFIG, then ~/.config/commitfs/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mirror a repository and serve resolution requests for it
    #[command(
        long_about = "Mirror a repository and serve resolution requests for it.\n\n\
            On first start the repository is cloned (bare) under the base path; on \
            later starts the existing mirror is opened. A clone or open failure \
            aborts startup.",
        after_help = "\
EXAMPLES:
    commitfs serve --repo-url https://github.com/owner/repo
    commitfs serve --listen 0.0.0.0:7070 --base-path /var/lib/commitfs"
    )]
    Serve {
        /// Remote repository to mirror (overrides server.repo_url)
        #[arg(long, value_name = "URL")]
        repo_url: Option<String>,

        /// Storage root for mirrors (overrides server.base_path)
        #[arg(long, value_name = "PATH")]
        base_path: Option<PathBuf>,

        /// Listen address (overrides server.listen_addr)
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,

        /// Deadline in seconds for a clone or fetch
        #[arg(long, value_name = "SECS")]
        fetch_timeout: Option<u64>,
    },

    /// Mount the filesystem served by a running server
    #[cfg(feature = "mount")]
    Mount {
        /// Where to mount (overrides mount.mount_point)
        mount_point: Option<PathBuf>,

        #[command(flatten)]
        client: ClientArgs,

        /// Entry and attribute cache TTL in seconds
        #[arg(long, value_name = "SECS")]
        entry_ttl: Option<f64>,

        /// Negative entry cache TTL in seconds
        #[arg(long, value_name = "SECS")]
        negative_ttl: Option<f64>,
    },

    /// Ask a running server to refresh a ref from its remote
    #[command(after_help = "Examples:\n  commitfs refresh refs/heads/main\n  commitfs refresh --event push.json")]
    Refresh {
        /// Fully qualified ref, e.g. refs/heads/main
        #[arg(required_unless_present = "event", conflicts_with = "event")]
        refname: Option<String>,

        /// Forward a forge push notification (JSON) instead of naming a ref
        #[arg(long, value_name = "FILE")]
        event: Option<PathBuf>,

        #[command(flatten)]
        client: ClientArgs,
    },

    /// List a directory of the virtual tree
    Ls {
        /// Path under the mount root, e.g. /commits/<hash>/src
        #[arg(default_value = "/")]
        path: String,

        /// Show kind, permissions and size
        #[arg(short, long)]
        long: bool,

        #[command(flatten)]
        client: ClientArgs,
    },

    /// Print a file of the virtual tree
    Cat {
        /// Path of a file, e.g. /commits/<hash>/README.md
        path: String,

        #[command(flatten)]
        client: ClientArgs,
    },

    /// Show the attributes of a path of the virtual tree
    Stat {
        /// Path under the mount root
        path: String,

        #[command(flatten)]
        client: ClientArgs,
    },
}

/// Flags shared by commands that talk to a running server.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ClientArgs {
    /// Server address (overrides mount.server_addr)
    #[arg(long, value_name = "ADDR")]
    pub server: Option<String>,

    /// How /commits/<hash> is validated (overrides mount.commit_check)
    #[arg(long, value_enum, value_name = "POLICY")]
    pub commit_check: Option<CommitCheckArg>,

    /// Bound in seconds on one request
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Validation policy for `/commits/<hash>`
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitCheckArg {
    /// Ask the server whether the commit exists
    Eager,
    /// Report any well-formed hash as a directory
    Lazy,
}

impl From<CommitCheckArg> for CommitCheck {
    fn from(arg: CommitCheckArg) -> Self {
        match arg {
            CommitCheckArg::Eager => CommitCheck::Eager,
            CommitCheckArg::Lazy => CommitCheck::Lazy,
        }
    }
}
