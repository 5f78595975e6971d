//! cli::commands::mount
//!
//! Mount the virtual tree of a running server.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};

use super::Context;
use crate::cli::args::ClientArgs;
use crate::fs::fuse::{CommitFs, Ttls};

fn ttl(key: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        bail!("{key} must be a positive number of seconds, got {secs}");
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Run the mount command. Blocks until the filesystem is unmounted.
pub fn mount(
    ctx: &Context,
    mount_point: Option<PathBuf>,
    client: &ClientArgs,
    entry_ttl: Option<f64>,
    negative_ttl: Option<f64>,
) -> Result<()> {
    let Some(mount_point) = mount_point.or_else(|| ctx.config.file.mount.mount_point.clone())
    else {
        bail!("No mount point. Pass one or set mount.mount_point.");
    };
    let ttls = Ttls {
        entry: match entry_ttl {
            Some(secs) => ttl("--entry-ttl", secs)?,
            None => ctx.config.entry_ttl(),
        },
        negative: match negative_ttl {
            Some(secs) => ttl("--negative-ttl", secs)?,
            None => ctx.config.negative_ttl(),
        },
    };

    let resolver = super::resolver(ctx, client)?;
    if !ctx.quiet {
        println!("Mounting at {}", mount_point.display());
    }
    CommitFs::new(resolver, ttls)
        .mount(&mount_point)
        .with_context(|| format!("Failed to mount at {}", mount_point.display()))
}
