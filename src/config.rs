//! Filter configuration.
//!
//! Loaded from a TOML file. Key names stay camelCase to match the
//! original plugin options this filter replaces in pipelines.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default config file path
pub const CONFIG_PATH: &str = "/etc/ucsfilterd/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    /// Record field naming the controller's network address.
    pub ucs_host_name_key: String,

    /// Deployment region tag embedded in machineId.
    pub coloregion: String,

    /// Login domain; omitted means bare-username login.
    #[serde(default)]
    pub domain: Option<String>,

    pub username: String,

    /// File whose trimmed contents are the plaintext password.
    pub password_file: PathBuf,

    /// Where the session token is persisted across restarts.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    /// Request timeout for management API calls.
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,

    /// Optional etcd endpoint for announcing seen hosts.
    #[serde(default)]
    pub registry_url: Option<String>,
}

fn default_token_file() -> PathBuf {
    PathBuf::from("/var/lib/ucsfilterd/token")
}

fn default_api_timeout() -> u64 {
    30
}

impl FilterConfig {
    /// Load config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: FilterConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
