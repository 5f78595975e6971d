//! refresh
//!
//! Asynchronous mirror refresh triggered by push notifications.
//!
//! # Design
//!
//! A refresh is fire-and-forget from the caller's point of view: the
//! trigger validates its input, looks up (or creates) the mirror in the
//! injected [`MirrorRegistry`], and hands `init` + `pull` to the blocking
//! pool. The caller receives acknowledgement of receipt only; the outcome
//! is logged, and is available through the returned join handle for
//! callers (tests) that want to wait.
//!
//! Two triggers for the same repository reach the same [`Mirror`], whose
//! exclusive lock orders their git operations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::core::types::{RefName, TypeError};
use crate::git::FetchOutcome;
use crate::mirror::{Mirror, MirrorError, MirrorRegistry};
use crate::service::Status;

/// Errors detected before a refresh is scheduled.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    InvalidRef(#[from] TypeError),

    /// The event names no repository URL.
    #[error("push event carries no repository url")]
    MissingRepository,

    /// The pushed ref was deleted; there is nothing to fetch.
    #[error("ref {refname} was deleted")]
    Deleted { refname: String },

    #[error(transparent)]
    Mirror(#[from] MirrorError),
}

impl From<RefreshError> for Status {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Mirror(e) => Status::from_mirror("Refresh", e),
            other => Status::NotFound(format!("Refresh: {other}")),
        }
    }
}

/// Repository section of a push notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRepository {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub clone_url: Option<String>,
}

/// The fields of a forge push notification that drive a refresh.
///
/// Unknown fields are ignored; forges send far more than this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Fully qualified ref that was pushed (`refs/heads/main`).
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
    #[serde(default)]
    pub repository: PushRepository,
}

impl PushEvent {
    /// Parse a JSON payload.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// URL to fetch from: the clone URL when present, else the web URL.
    pub fn repository_url(&self) -> Option<&str> {
        self.repository
            .clone_url
            .as_deref()
            .or(self.repository.url.as_deref())
            .filter(|url| !url.is_empty())
    }

    /// Whether the push deleted the ref (new target is all zeros).
    pub fn is_deletion(&self) -> bool {
        !self.after.is_empty() && self.after.bytes().all(|b| b == b'0')
    }
}

/// Schedules mirror refreshes on a tokio runtime.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    registry: Arc<MirrorRegistry>,
    runtime: Handle,
}

impl RefreshTrigger {
    pub fn new(registry: Arc<MirrorRegistry>, runtime: Handle) -> Self {
        Self { registry, runtime }
    }

    pub fn registry(&self) -> &Arc<MirrorRegistry> {
        &self.registry
    }

    /// Refresh `refname` of the repository at `url` in the background.
    ///
    /// The mirror is created and initialized on first touch. Returns as
    /// soon as the work is scheduled.
    ///
    /// # Errors
    ///
    /// - [`RefreshError::InvalidRef`] if `refname` is not a valid `refs/` name
    /// - [`RefreshError::Mirror`] if `url` cannot be mapped to a mirror
    pub fn trigger(
        &self,
        url: &str,
        refname: &str,
    ) -> Result<JoinHandle<Result<FetchOutcome, MirrorError>>, RefreshError> {
        let refname = RefName::new(refname)?;
        let mirror = self.registry.get_or_create(url)?;
        let url = url.to_string();
        info!(%url, %refname, "refresh scheduled");
        Ok(self
            .runtime
            .spawn_blocking(move || refresh(&mirror, &url, &refname)))
    }

    /// Route a push notification to [`RefreshTrigger::trigger`].
    pub fn on_push(
        &self,
        event: &PushEvent,
    ) -> Result<JoinHandle<Result<FetchOutcome, MirrorError>>, RefreshError> {
        if event.is_deletion() {
            return Err(RefreshError::Deleted {
                refname: event.git_ref.clone(),
            });
        }
        let url = event
            .repository_url()
            .ok_or(RefreshError::MissingRepository)?;
        self.trigger(url, &event.git_ref)
    }
}

fn refresh(mirror: &Mirror, url: &str, refname: &RefName) -> Result<FetchOutcome, MirrorError> {
    let result = mirror.init(url).and_then(|_| mirror.pull(refname));
    match &result {
        Ok(outcome) if outcome.is_up_to_date() => {
            info!(url, %refname, "refresh complete, already up to date")
        }
        Ok(_) => info!(url, %refname, "refresh complete"),
        Err(e) => error!(url, %refname, error = %e, "refresh failed"),
    }
    result
}
