/*!
Builder de payloads `/report`

Produit des documents JSON au format filaire de l'agent, avec des valeurs
plausibles par défaut que chaque test peut surcharger.
*/

use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    ip: String,
    hostname: String,
    system: String,
    timestamp: Option<String>,
    cpu_percent: Vec<f64>,
    memory_percent: f64,
    bytes_sent: u64,
    disks: Vec<Value>,
}

impl SnapshotBuilder {
    pub fn new<S: Into<String>>(ip: S) -> Self {
        Self {
            ip: ip.into(),
            hostname: "test-host".to_string(),
            system: "Linux".to_string(),
            timestamp: Some(chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            cpu_percent: vec![12.5, 7.0],
            memory_percent: 42.0,
            bytes_sent: 1024,
            disks: vec![json!({
                "device": "/dev/sda1",
                "mountpoint": "/",
                "total_size": 100.0,
                "used": 40.0,
                "free": 60.0,
                "percent": 40.0
            })],
        }
    }

    pub fn hostname<S: Into<String>>(mut self, hostname: S) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn system<S: Into<String>>(mut self, system: S) -> Self {
        self.system = system.into();
        self
    }

    pub fn timestamp<S: Into<String>>(mut self, timestamp: S) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn cpu_percent(mut self, per_core: Vec<f64>) -> Self {
        self.cpu_percent = per_core;
        self
    }

    pub fn memory_percent(mut self, percent: f64) -> Self {
        self.memory_percent = percent;
        self
    }

    /// Sert de marqueur de séquence dans les tests d'ordre d'historique.
    pub fn bytes_sent(mut self, bytes: u64) -> Self {
        self.bytes_sent = bytes;
        self
    }

    pub fn no_disks(mut self) -> Self {
        self.disks.clear();
        self
    }

    pub fn build(&self) -> Value {
        let mut doc = json!({
            "hostname": self.hostname,
            "ip": self.ip,
            "system": self.system,
            "cpu": {
                "cpu_percent": self.cpu_percent,
                "cpu_count": self.cpu_percent.len(),
                "cpu_freq_current": 2400.0,
                "cpu_freq_max": 3600.0
            },
            "memory": {
                "memory_total": 16.0,
                "memory_used": 16.0 * self.memory_percent / 100.0,
                "memory_percent": self.memory_percent,
                "swap_total": 2.0,
                "swap_used": 0.0,
                "swap_percent": 0.0
            },
            "disk": self.disks,
            "network": {
                "bytes_sent": self.bytes_sent,
                "bytes_recv": 2048,
                "packets_sent": 10,
                "packets_recv": 20,
                "connections": 3
            }
        });
        if let Some(ts) = &self.timestamp {
            doc["timestamp"] = Value::String(ts.clone());
        }
        doc
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.build().to_string().into_bytes()
    }
}
