//! Server configuration.
//!
//! A single TOML file: listener settings, the user table and the `[vfs]`
//! table handed to the gateway.
//!
//! ```toml
//! listen = "127.0.0.1:8000"
//! development = true
//!
//! [[users]]
//! token = "secret"
//! username = "amy"
//! groups = ["admin"]
//!
//! [vfs]
//! root = "vfs"
//!
//! [[vfs.mountpoints]]
//! name = "home"
//! attributes = { root = "{vfs}/{username}" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use vfsgate_core::{Session, VfsConfig};

/// Default cap on multipart upload size (256 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("token for user '{0}' is already assigned")]
    DuplicateToken(String),

    #[error("user entry has an empty {0}")]
    EmptyField(&'static str),
}

/// Top-level server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Include error detail (`stack`) in error responses.
    pub development: bool,
    pub max_upload_bytes: usize,
    pub users: Vec<UserConfig>,
    pub vfs: VfsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8000)),
            development: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            users: Vec::new(),
            vfs: VfsConfig::default(),
        }
    }
}

/// A user allowed to call the API, identified by a static token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub token: String,
    pub username: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl UserConfig {
    pub fn session(&self) -> Session {
        Session::new(self.username.clone(), self.groups.iter().cloned())
    }
}

impl ServerConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject user tables the auth layer cannot serve unambiguously.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut tokens = HashSet::new();
        for user in &self.users {
            if user.token.is_empty() {
                return Err(ConfigError::EmptyField("token"));
            }
            if user.username.is_empty() {
                return Err(ConfigError::EmptyField("username"));
            }
            if !tokens.insert(user.token.as_str()) {
                return Err(ConfigError::DuplicateToken(user.username.clone()));
            }
        }
        Ok(())
    }
}
