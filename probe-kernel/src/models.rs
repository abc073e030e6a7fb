use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Identité de l'hôte émetteur ; `ip` sert de clé primaire côté store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub hostname: String,
    pub ip: String,
    pub system: String,
}

/// Snapshot tel que reçu sur `/report` et tel qu'écrit dans le journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub host: HostIdentity,
    pub cpu: CpuBlock,
    pub memory: MemoryBlock,
    pub disk: Vec<DiskUsage>,
    pub network: NetworkBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuBlock {
    pub cpu_percent: Vec<f64>,
    pub cpu_count: u32,
    pub cpu_freq_current: Option<f64>,
    pub cpu_freq_max: Option<f64>,
}

/// Tailles en Go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub memory_total: f64,
    pub memory_used: f64,
    pub memory_percent: f64,
    pub swap_total: f64,
    pub swap_used: f64,
    pub swap_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub device: String,
    pub mountpoint: String,
    pub total_size: f64,
    pub used: f64,
    pub free: f64,
    pub percent: f64,
}

/// Compteurs cumulés depuis le boot de l'hôte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkBlock {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub connections: u64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("malformed snapshot: {0}")]
    Malformed(String),
    #[error("missing host key: ip is empty")]
    MissingIp,
    #[error("invalid host key: {0:?} is not a canonical IP address")]
    InvalidIp(String),
    #[error("invalid value for {field}: {value}")]
    InvalidNumber { field: String, value: f64 },
}

impl MetricSnapshot {
    /// Décode et valide un corps de requête d'ingestion.
    pub fn from_wire(body: &[u8]) -> Result<Self, ValidationError> {
        let snapshot: MetricSnapshot = serde_json::from_slice(body)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn ip(&self) -> &str {
        &self.host.ip
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.ip.trim().is_empty() {
            return Err(ValidationError::MissingIp);
        }
        // la clé du store doit être unique par hôte : forme textuelle canonique exigée
        match self.host.ip.parse::<IpAddr>() {
            Ok(addr) if addr.to_string() == self.host.ip => {}
            _ => return Err(ValidationError::InvalidIp(self.host.ip.clone())),
        }

        for (i, pct) in self.cpu.cpu_percent.iter().enumerate() {
            check_percent(&format!("cpu.cpu_percent[{i}]"), *pct)?;
        }
        if let Some(freq) = self.cpu.cpu_freq_current {
            check_amount("cpu.cpu_freq_current", freq)?;
        }
        if let Some(freq) = self.cpu.cpu_freq_max {
            check_amount("cpu.cpu_freq_max", freq)?;
        }

        let m = &self.memory;
        check_amount("memory.memory_total", m.memory_total)?;
        check_amount("memory.memory_used", m.memory_used)?;
        check_percent("memory.memory_percent", m.memory_percent)?;
        check_amount("memory.swap_total", m.swap_total)?;
        check_amount("memory.swap_used", m.swap_used)?;
        check_percent("memory.swap_percent", m.swap_percent)?;

        for d in &self.disk {
            check_amount(&format!("disk[{}].total_size", d.mountpoint), d.total_size)?;
            check_amount(&format!("disk[{}].used", d.mountpoint), d.used)?;
            check_amount(&format!("disk[{}].free", d.mountpoint), d.free)?;
            check_percent(&format!("disk[{}].percent", d.mountpoint), d.percent)?;
        }

        Ok(())
    }
}

fn check_amount(field: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::InvalidNumber { field: field.to_string(), value });
    }
    Ok(())
}

fn check_percent(field: &str, value: f64) -> Result<(), ValidationError> {
    check_amount(field, value)?;
    if value > 100.0 {
        return Err(ValidationError::InvalidNumber { field: field.to_string(), value });
    }
    Ok(())
}
