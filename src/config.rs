//! TOML-backed settings for the daemon and the client

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::net::IdentityMode;
use crate::protocol::timeouts::{RECONNECT_DELAY_SECS, RECONNECT_TIMEOUT_SECS};
use crate::protocol::{DEFAULT_BIND, DEFAULT_HOST, DEFAULT_PORT, DOWNLOAD_DIR, FILES_DIR, SESSIONS_DIR};
use crate::reconnect::ReconnectPolicy;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub bind: String,
    pub root: PathBuf,
    pub sessions_dir: PathBuf,
    pub identity: IdentityMode,
    pub max_upload_size: Option<u64>,
    pub threaded: bool,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            root: PathBuf::from(FILES_DIR),
            sessions_dir: PathBuf::from(SESSIONS_DIR),
            identity: IdentityMode::default(),
            max_upload_size: None,
            threaded: false,
            log_file: None,
            verbose: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub download_dir: PathBuf,
    pub reconnect_timeout_secs: u64,
    pub reconnect_delay_secs: u64,
    pub progress: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            download_dir: PathBuf::from(DOWNLOAD_DIR),
            reconnect_timeout_secs: RECONNECT_TIMEOUT_SECS,
            reconnect_delay_secs: RECONNECT_DELAY_SECS,
            progress: true,
        }
    }
}

impl ClientConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            timeout: Duration::from_secs(self.reconnect_timeout_secs),
            delay: Duration::from_secs(self.reconnect_delay_secs),
        }
    }
}

/// Read a config file, or the defaults when no path was given.
pub fn load<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(p) = path else {
        return Ok(T::default());
    };
    let data = std::fs::read_to_string(p)
        .with_context(|| format!("Failed to read config file: {}", p.display()))?;
    let cfg: T = toml::from_str(&data)
        .with_context(|| format!("Failed to parse config file: {}", p.display()))?;
    Ok(cfg)
}
