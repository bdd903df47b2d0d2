//! Best-effort announcement of seen controller hosts to etcd.
//!
//! A side channel, not part of enrichment: downstream tooling reads the
//! key space to learn which controllers are emitting logs. Failures are
//! surfaced on the record's `error` field and never abort processing.

use anyhow::{anyhow, Result};
use std::time::Duration;
use tracing::debug;

/// Announces a source host to an external registry.
pub trait HostRegistry: Send + Sync {
    fn announce(&self, host: &str) -> Result<()>;
}

/// etcd v2 keys API implementation.
pub struct EtcdRegistry {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl EtcdRegistry {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl HostRegistry for EtcdRegistry {
    fn announce(&self, host: &str) -> Result<()> {
        let url = format!("{}/v2/keys/ucs/hosts/{}", self.base_url, host);
        let response = self
            .client
            .put(&url)
            .form(&[("value", host)])
            .send()
            .map_err(|e| anyhow!("registry PUT failed: {e}"))?;
        if !response.status().is_success() {
            return Err(anyhow!("registry PUT returned {}", response.status()));
        }
        debug!(host, "announced host to registry");
        Ok(())
    }
}
