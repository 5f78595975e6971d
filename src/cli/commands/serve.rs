//! cli::commands::serve
//!
//! Clone-or-open the configured repository and serve it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use tracing::info;

use super::Context;
use crate::core::paths::MirrorPaths;
use crate::mirror::{InitOutcome, MirrorRegistry};
use crate::refresh::RefreshTrigger;
use crate::service::GitResolutionService;
use crate::transport::{Dispatcher, Server};

/// Flag overrides for `serve`.
#[derive(Debug, Default)]
pub struct ServeArgs {
    pub repo_url: Option<String>,
    pub base_path: Option<PathBuf>,
    pub listen: Option<String>,
    pub fetch_timeout: Option<u64>,
}

/// Run the serve command.
///
/// Blocks until interrupted. Failing to clone or open the mirror is fatal.
pub fn serve(ctx: &Context, args: ServeArgs) -> Result<()> {
    let mut server = ctx.config.file.server.clone();
    if let Some(url) = args.repo_url {
        server.repo_url = Some(url);
    }
    if let Some(base) = args.base_path {
        server.base_path = base;
    }
    if let Some(listen) = args.listen {
        server.listen_addr = listen;
    }
    if let Some(secs) = args.fetch_timeout {
        server.fetch_timeout_secs = secs;
    }

    let Some(url) = server.repo_url.clone() else {
        bail!("No repository to serve. Pass --repo-url or set server.repo_url.");
    };
    let addr = server.listen_addr().context("Invalid listen address")?;
    if server.fetch_timeout_secs == 0 {
        bail!("--fetch-timeout must be positive");
    }

    let registry = Arc::new(
        MirrorRegistry::new(MirrorPaths::new(&server.base_path))
            .with_fetch_timeout(Duration::from_secs(server.fetch_timeout_secs)),
    );
    let mirror = registry
        .get_or_create(&url)
        .with_context(|| format!("Cannot mirror {url}"))?;

    if !ctx.quiet {
        println!("Preparing mirror of {url} at {}", mirror.git_dir().display());
    }
    let outcome = mirror
        .init(&url)
        .with_context(|| format!("Failed to initialize mirror of {url}"))?;
    info!(%url, ?outcome, "mirror ready");
    if !ctx.quiet && outcome == InitOutcome::Cloned {
        println!("Cloned {url}");
    }

    let service = Arc::new(GitResolutionService::new(mirror));
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let trigger = RefreshTrigger::new(registry, tokio::runtime::Handle::current());
        let dispatcher = Dispatcher::new(service).with_refresh(trigger, url.clone());
        let server = Server::bind(addr, dispatcher)
            .await
            .with_context(|| format!("Failed to listen on {addr}"))?;

        if !ctx.quiet {
            println!("Serving {url} on {}", server.local_addr()?);
        }
        server
            .run_until(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        Ok(())
    })
}
