//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. CLI flags (applied by the CLI layer)
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. An explicit path (`--config`)
//! 2. `$COMMITFS_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/commitfs/config.toml`, or the platform config dir
//!
//! A missing file is not an error; defaults are used.
//!
//! # Example
//!
//! ```no_run
//! use commitfs::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("mirrors live under {}", config.file.server.base_path.display());
//! ```

pub mod schema;

pub use schema::{CommitCheck, FileConfig, MountConfig, ServerConfig};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded configuration plus where it came from.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// The parsed (or default) configuration
    pub file: FileConfig,
    /// Path of the file that was loaded, if any
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `explicit` or the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit path is missing, or if a config
    /// file exists but cannot be read, parsed or validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::find_default() {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Read, parse and validate one config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;

        Ok(Self {
            file,
            path: Some(path.to_path_buf()),
        })
    }

    fn find_default() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("COMMITFS_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(dirs::config_dir)?;
        let path = config_dir.join("commitfs/config.toml");
        path.exists().then_some(path)
    }

    /// Fetch deadline for clones and fetches.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.file.server.fetch_timeout_secs)
    }

    /// Bound on one resolution-service call from the filesystem client.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.file.mount.request_timeout_secs)
    }

    /// Entry/attribute cache TTL.
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.file.mount.entry_ttl_secs)
    }

    /// Negative entry cache TTL.
    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.file.mount.negative_ttl_secs)
    }
}
