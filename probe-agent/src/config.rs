//! Agent configuration
//!
//! Handles:
//! - Collector endpoint and shared ingestion token
//! - Report interval and per-request timeout
//! - Cross-platform storage (`<config_dir>/probe-agent/config.toml`)
//! - Environment overrides (`PROBE_COLLECTOR_URL`, `PROBE_REPORT_INTERVAL`, `PROBE_INGEST_TOKEN`)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const MAX_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub collector_url: String,
    pub report_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub ingest_token: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            collector_url: "http://localhost:5000".to_string(),
            report_interval_secs: 60,
            request_timeout_secs: 10,
            ingest_token: None,
        }
    }
}

impl AgentConfig {
    /// Load config from `path`, writing the defaults there first when the file is missing.
    ///
    /// Environment overrides only apply to the returned copy, so an ingest
    /// token given through the environment never lands on disk.
    /// The flag is true when the file was created by this call.
    pub async fn load_or_init<F>(path: &Path, lookup: F) -> Result<(Self, bool)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let created = !path.exists();
        let mut config = if created {
            let defaults = Self::default();
            defaults.save_to(path).await?;
            defaults
        } else {
            Self::load_from(path).await?
        };
        config.apply_env(lookup);
        Ok((config.sanitized(), created))
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        let config: AgentConfig = toml::from_str(&content)?;
        Ok(config.sanitized())
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PROBE_COLLECTOR_URL").filter(|v| !v.trim().is_empty()) {
            self.collector_url = url;
        }
        if let Some(raw) = lookup("PROBE_REPORT_INTERVAL") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.report_interval_secs = secs,
                Err(_) => warn!("Ignoring invalid PROBE_REPORT_INTERVAL={raw:?}"),
            }
        }
        if let Some(token) = lookup("PROBE_INGEST_TOKEN").filter(|v| !v.is_empty()) {
            self.ingest_token = Some(token);
        }
    }

    fn sanitized(mut self) -> Self {
        if self.report_interval_secs == 0 {
            warn!("report_interval_secs=0 is invalid, using 60");
            self.report_interval_secs = 60;
        }
        self.request_timeout_secs = self.request_timeout_secs.clamp(1, MAX_REQUEST_TIMEOUT_SECS);
        self.collector_url = self.collector_url.trim_end_matches('/').to_string();
        self
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("probe-agent");
        path.push("config.toml");
        Ok(path)
    }

}
