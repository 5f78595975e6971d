//! cli
//!
//! Command-line interface layer for commitfs.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install logging and load configuration
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Handlers assemble the mirror, service, transport
//! and resolver layers; none of them touch git directly.

pub mod args;
pub mod commands;
pub mod logging;

pub use args::Cli;

use anyhow::{Context as _, Result};

use crate::core::config::Config;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    logging::init(cli.debug);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let ctx = commands::Context {
        config,
        quiet: cli.quiet,
    };

    commands::dispatch(cli.command, &ctx)
}
