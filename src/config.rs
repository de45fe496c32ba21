use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_SERVER: &str = "https://notebookchat.onrender.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the REST API (without the `/api` suffix).
    pub api_url: String,
    /// Base URL of the Socket.IO endpoint.
    pub socket_url: String,
    pub request_timeout_secs: u64,
    /// Re-broadcast confirmed sends on the realtime channel.
    pub broadcast_sends: bool,
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .unwrap_or_else(|| PathBuf::from(".cache"));

        Self {
            api_url: DEFAULT_SERVER.to_string(),
            socket_url: DEFAULT_SERVER.to_string(),
            request_timeout_secs: 15,
            broadcast_sends: true,
            log_file: cache_dir.join("notebookchat").join("notebookchat.log"),
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("notebookchat").join("config.toml"))
    }

    /// Load the config file at the default location, or defaults if there is none.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
