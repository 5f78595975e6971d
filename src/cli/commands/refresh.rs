//! cli::commands::refresh
//!
//! Send a refresh trigger to a running server.

use std::path::Path;

use anyhow::{Context as _, Result};

use super::Context;
use crate::cli::args::ClientArgs;
use crate::core::types::RefName;
use crate::refresh::PushEvent;

/// Run the refresh command.
///
/// Returns once the server acknowledges; the pull itself runs in the
/// background on the server.
pub fn refresh(ctx: &Context, refname: &str, client: &ClientArgs) -> Result<()> {
    let refname = RefName::new(refname).context("Invalid ref name")?;
    let remote = super::remote(ctx, client)?;
    remote
        .refresh(refname.as_str())
        .with_context(|| format!("Refresh of {refname} was not accepted by {}", remote.addr()))?;

    if !ctx.quiet {
        println!("Refresh of {refname} scheduled");
    }
    Ok(())
}

/// Forward the push notification stored at `path`.
pub fn push(ctx: &Context, path: &Path, client: &ClientArgs) -> Result<()> {
    let payload = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read push event {}", path.display()))?;
    let event = PushEvent::from_json(&payload)
        .with_context(|| format!("Failed to parse push event {}", path.display()))?;

    let remote = super::remote(ctx, client)?;
    remote.push(&event).with_context(|| {
        format!(
            "Push of {} was not accepted by {}",
            event.git_ref,
            remote.addr()
        )
    })?;

    if !ctx.quiet {
        println!("Refresh of {} scheduled", event.git_ref);
    }
    Ok(())
}
