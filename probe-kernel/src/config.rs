use crate::liveness::DEFAULT_LIVENESS_THRESHOLD;
use crate::store::{DEFAULT_HISTORY_CAPACITY, MAX_HISTORY_CAPACITY};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: String,
    pub liveness_threshold_secs: u64,
    pub history_capacity: usize,
    pub log_dir: String,
    pub sink_queue_capacity: usize,
    pub ingest_token: Option<String>,
    pub admin: AdminConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AdminConf {
    pub username: String,
    pub password_hash: Option<String>, // chaîne PHC argon2
    #[serde(skip)]
    pub password_plain: Option<String>, // uniquement via PROBE_ADMIN_PASSWORD
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5000".into(),
            liveness_threshold_secs: DEFAULT_LIVENESS_THRESHOLD.as_secs(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            log_dir: "logs".into(),
            sink_queue_capacity: 1024,
            ingest_token: None,
            admin: AdminConf::default(),
        }
    }
}

impl Default for AdminConf {
    fn default() -> Self {
        Self { username: "admin".into(), password_hash: None, password_plain: None }
    }
}

impl KernelConfig {
    pub fn liveness_threshold(&self) -> Duration {
        Duration::from_secs(self.liveness_threshold_secs)
    }

    /// Applique les surcharges d'environnement (PROBE_LISTEN, PROBE_INGEST_TOKEN, PROBE_ADMIN_PASSWORD).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup("PROBE_LISTEN").filter(|v| !v.trim().is_empty()) {
            self.listen = listen;
        }
        if let Some(token) = lookup("PROBE_INGEST_TOKEN").filter(|v| !v.is_empty()) {
            self.ingest_token = Some(token);
        }
        if let Some(password) = lookup("PROBE_ADMIN_PASSWORD").filter(|v| !v.is_empty()) {
            self.admin.password_plain = Some(password);
        }
    }

    fn sanitized(mut self) -> Self {
        if self.history_capacity == 0 {
            warn!("[kernel] history_capacity=0 invalide, retour à {DEFAULT_HISTORY_CAPACITY}");
            self.history_capacity = DEFAULT_HISTORY_CAPACITY;
        }
        if self.history_capacity > MAX_HISTORY_CAPACITY {
            warn!("[kernel] history_capacity={} trop grand, plafonné à {MAX_HISTORY_CAPACITY}", self.history_capacity);
            self.history_capacity = MAX_HISTORY_CAPACITY;
        }
        if self.liveness_threshold_secs == 0 {
            warn!("[kernel] liveness_threshold_secs=0 invalide, retour à {}", DEFAULT_LIVENESS_THRESHOLD.as_secs());
            self.liveness_threshold_secs = DEFAULT_LIVENESS_THRESHOLD.as_secs();
        }
        if self.sink_queue_capacity == 0 {
            self.sink_queue_capacity = 1024;
        }
        if self.ingest_token.as_deref().is_some_and(str::is_empty) {
            self.ingest_token = None;
        }
        self
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    serde_yaml::from_str::<KernelConfig>(txt).map(KernelConfig::sanitized)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("PROBE_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt).unwrap_or_else(|e| {
            warn!("[kernel] config invalide ({path}): {e}");
            KernelConfig::default()
        })
    } else {
        info!("[kernel] pas de {path}, usage config par défaut");
        KernelConfig::default()
    };
    cfg.apply_env(|key| std::env::var(key).ok());
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:5000");
        assert_eq!(cfg.liveness_threshold(), Duration::from_secs(180));
        assert_eq!(cfg.history_capacity, 100);
        assert_eq!(cfg.admin.username, "admin");
        assert!(cfg.ingest_token.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = parse_config("listen: 127.0.0.1:9000\nadmin:\n  username: root\n").unwrap();
        assert_eq!(cfg.listen, "127.0.0.1:9000");
        assert_eq!(cfg.admin.username, "root");
        assert_eq!(cfg.log_dir, "logs");
        assert_eq!(cfg.sink_queue_capacity, 1024);
    }

    #[test]
    fn test_invalid_values_are_sanitized() {
        let cfg = parse_config("history_capacity: 0\ningest_token: \"\"\n").unwrap();
        assert_eq!(cfg.history_capacity, 100);
        assert!(cfg.ingest_token.is_none());

        let cfg = parse_config("history_capacity: 1000000000\nliveness_threshold_secs: 0\n").unwrap();
        assert_eq!(cfg.history_capacity, MAX_HISTORY_CAPACITY);
        assert_eq!(cfg.liveness_threshold(), DEFAULT_LIVENESS_THRESHOLD);
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        assert!(parse_config("listen: [unclosed").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PROBE_LISTEN", "127.0.0.1:7000"),
            ("PROBE_INGEST_TOKEN", "s3cret"),
            ("PROBE_ADMIN_PASSWORD", "hunter2"),
        ]
        .into_iter()
        .collect();

        let mut cfg = KernelConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.listen, "127.0.0.1:7000");
        assert_eq!(cfg.ingest_token.as_deref(), Some("s3cret"));
        assert_eq!(cfg.admin.password_plain.as_deref(), Some("hunter2"));
    }
}
