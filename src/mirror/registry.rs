//! mirror::registry
//!
//! Concurrent map from normalized remote URL to mirror.
//!
//! The registry is owned by whoever routes refresh events and handed to
//! it at construction; there is no process-wide instance. Lookups are
//! keyed by [`store_path`](crate::core::paths::store_path), so every
//! spelling of one remote reaches the same [`Mirror`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{Mirror, MirrorError};
use crate::core::paths::{store_path, MirrorPaths};

/// Mirrors keyed by normalized remote URL.
#[derive(Debug)]
pub struct MirrorRegistry {
    paths: MirrorPaths,
    fetch_timeout: Option<Duration>,
    mirrors: DashMap<String, Arc<Mirror>>,
}

impl MirrorRegistry {
    /// An empty registry that places new mirrors under `paths`.
    pub fn new(paths: MirrorPaths) -> Self {
        Self {
            paths,
            fetch_timeout: None,
            mirrors: DashMap::new(),
        }
    }

    /// Bound clones and fetches of mirrors created by this registry.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// The mirror for `url`, creating (but not initializing) it on first touch.
    ///
    /// Insert-if-absent is atomic: concurrent first callers for one key
    /// all receive the same `Arc`.
    pub fn get_or_create(&self, url: &str) -> Result<Arc<Mirror>, MirrorError> {
        let key = store_path(url)?;
        let mirror = match self.mirrors.entry(key) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let git_dir = self.paths.mirror_dir(url)?;
                let mut mirror = Mirror::new(git_dir);
                if let Some(timeout) = self.fetch_timeout {
                    mirror = mirror.with_fetch_timeout(timeout);
                }
                debug!(key = %entry.key(), path = %mirror.git_dir().display(), "registered mirror");
                Arc::clone(entry.insert(Arc::new(mirror)).value())
            }
        };
        Ok(mirror)
    }

    /// Register an already constructed mirror under `url`'s key.
    ///
    /// Returns the mirror that ends up registered: `mirror` if the key was
    /// free, otherwise the existing one.
    pub fn register(&self, url: &str, mirror: Arc<Mirror>) -> Result<Arc<Mirror>, MirrorError> {
        let key = store_path(url)?;
        Ok(Arc::clone(self.mirrors.entry(key).or_insert(mirror).value()))
    }

    /// The mirror for `url`, if one has been created.
    pub fn get(&self, url: &str) -> Option<Arc<Mirror>> {
        let key = store_path(url).ok()?;
        self.mirrors.get(&key).map(|m| Arc::clone(m.value()))
    }

    /// Number of registered mirrors.
    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    /// Whether no mirror has been registered.
    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }
}
