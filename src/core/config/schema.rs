//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Example
//!
//! ```toml
//! [server]
//! base_path = "/var/lib/commitfs"
//! repo_url = "https://github.com/owner/repo"
//! listen_addr = "0.0.0.0:7070"
//! fetch_timeout_secs = 300
//!
//! [mount]
//! server_addr = "127.0.0.1:7070"
//! mount_point = "/mnt/repo"
//! entry_ttl_secs = 1.0
//! negative_ttl_secs = 1.0
//! request_timeout_secs = 30
//! commit_check = "eager"
//! ```
//!
//! # Validation
//!
//! Values are validated after parsing: TTLs and timeouts must be
//! positive, addresses must parse as socket addresses.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default storage root for mirrors.
pub const DEFAULT_BASE_PATH: &str = "/tmp/commitfs";

/// Default address of the resolution service.
pub const DEFAULT_ADDR: &str = "127.0.0.1:7070";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Resolution service settings
    pub server: ServerConfig,

    /// Filesystem client settings
    pub mount: MountConfig,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.mount.validate()
    }
}

/// Resolution service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Storage root for mirrors
    pub base_path: PathBuf,

    /// Remote repository served by this instance
    pub repo_url: Option<String>,

    /// Address the service listens on
    pub listen_addr: String,

    /// Deadline for a clone or fetch
    pub fetch_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from(DEFAULT_BASE_PATH),
            repo_url: None,
            listen_addr: DEFAULT_ADDR.to_string(),
            fetch_timeout_secs: 300,
        }
    }
}

impl ServerConfig {
    /// `listen_addr` as a socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("server.listen_addr", &self.listen_addr)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        parse_addr("server.listen_addr", &self.listen_addr)?;
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "server.fetch_timeout_secs must be positive".into(),
            ));
        }
        if let Some(url) = &self.repo_url {
            crate::core::paths::store_path(url).map_err(|e| {
                ConfigError::InvalidValue(format!("server.repo_url: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Filesystem client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MountConfig {
    /// Address of the resolution service
    pub server_addr: String,

    /// Where the filesystem is mounted
    pub mount_point: Option<PathBuf>,

    /// Entry and attribute cache TTL
    pub entry_ttl_secs: f64,

    /// Negative entry cache TTL
    pub negative_ttl_secs: f64,

    /// Bound on a single resolution-service call
    pub request_timeout_secs: u64,

    /// Validation policy for `/commits/<hash>`
    pub commit_check: CommitCheck,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_ADDR.to_string(),
            mount_point: None,
            entry_ttl_secs: 1.0,
            negative_ttl_secs: 1.0,
            request_timeout_secs: 30,
            commit_check: CommitCheck::default(),
        }
    }
}

impl MountConfig {
    /// `server_addr` as a socket address.
    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("mount.server_addr", &self.server_addr)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        parse_addr("mount.server_addr", &self.server_addr)?;
        for (key, ttl) in [
            ("mount.entry_ttl_secs", self.entry_ttl_secs),
            ("mount.negative_ttl_secs", self.negative_ttl_secs),
        ] {
            if !ttl.is_finite() || ttl <= 0.0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{key} must be a positive number of seconds, got {ttl}"
                )));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "mount.request_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// How `/commits/<hash>` is validated before anything beneath it is read.
///
/// A malformed hash is rejected without any service call in both modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitCheck {
    /// Ask the service whether the commit exists.
    #[default]
    Eager,

    /// Report any well-formed hash as a directory without asking; unknown
    /// commits only fail once something beneath them is read.
    Lazy,
}

fn parse_addr(key: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("{key}: invalid address {value:?}: {e}")))
}
