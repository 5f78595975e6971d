//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Merges its flags over the loaded configuration
//! 2. Builds the components it needs (mirror, service, resolver, client)
//! 3. Formats and displays output
//!
//! `serve` owns a tokio runtime for the transport server and refresh
//! tasks. The other commands are blocking clients of a running server.

mod inspect;
#[cfg(feature = "mount")]
mod mount;
mod refresh;
mod serve;

pub use inspect::{cat, ls, stat};
#[cfg(feature = "mount")]
pub use mount::mount;
pub use refresh::{push, refresh};
pub use serve::{serve, ServeArgs};

use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::cli::args::{ClientArgs, Command};
use crate::core::config::Config;
use crate::fs::VirtualPathResolver;
use crate::transport::RemoteService;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub quiet: bool,
}

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Serve {
            repo_url,
            base_path,
            listen,
            fetch_timeout,
        } => serve::serve(
            ctx,
            serve::ServeArgs {
                repo_url,
                base_path,
                listen,
                fetch_timeout,
            },
        ),
        #[cfg(feature = "mount")]
        Command::Mount {
            mount_point,
            client,
            entry_ttl,
            negative_ttl,
        } => mount::mount(ctx, mount_point, &client, entry_ttl, negative_ttl),
        Command::Refresh {
            refname,
            event,
            client,
        } => match event {
            Some(path) => refresh::push(ctx, &path, &client),
            None => refresh::refresh(ctx, refname.as_deref().unwrap_or_default(), &client),
        },
        Command::Ls { path, long, client } => inspect::ls(ctx, &path, long, &client),
        Command::Cat { path, client } => inspect::cat(ctx, &path, &client),
        Command::Stat { path, client } => inspect::stat(ctx, &path, &client),
    }
}

/// Client for the server named by `client` or the config.
pub(crate) fn remote(ctx: &Context, client: &ClientArgs) -> Result<Arc<RemoteService>> {
    let mut mount = ctx.config.file.mount.clone();
    if let Some(server) = &client.server {
        mount.server_addr = server.clone();
    }
    let addr = mount.server_addr().context("Invalid server address")?;
    let timeout = client
        .timeout
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| ctx.config.request_timeout());
    Ok(Arc::new(RemoteService::new(addr, timeout)))
}

/// Resolver over a remote server, honoring the commit-check policy.
pub(crate) fn resolver(ctx: &Context, client: &ClientArgs) -> Result<VirtualPathResolver> {
    let service = remote(ctx, client)?;
    let commit_check = client
        .commit_check
        .map(Into::into)
        .unwrap_or(ctx.config.file.mount.commit_check);
    Ok(VirtualPathResolver::new(service).with_commit_check(commit_check))
}
