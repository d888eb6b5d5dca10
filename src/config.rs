//! Server configuration, loaded from TOML

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::smtp::processor::{DEFAULT_HELO_RESPONSE, DEFAULT_WELCOME_MESSAGE};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Settings for the server and its sessions. Every field has a default, so
/// an empty file is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the server binds
    pub listen: SocketAddr,

    /// Server domain used in the greeting, the HELO reply and `Received:`
    pub domain: String,

    /// Recipients of this domain are accepted; defaults to `domain`
    pub local_domain: Option<String>,

    /// Per-read timeout in seconds; `0` disables it
    pub read_timeout_secs: u64,

    pub welcome_message: String,

    pub helo_response: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 2525)),
            domain: "localhost".to_owned(),
            local_domain: None,
            read_timeout_secs: 300,
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_owned(),
            helo_response: DEFAULT_HELO_RESPONSE.to_owned(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn local_domain(&self) -> &str {
        self.local_domain.as_deref().unwrap_or(&self.domain)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }
}
