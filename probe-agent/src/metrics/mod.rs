//! System metrics collection for probe agents
//!
//! Provides cross-platform system sampling:
//! - Per-core CPU usage and frequency
//! - Memory and swap usage (GB, 2 decimals)
//! - Disk usage for mounted filesystems
//! - Cumulative network counters and open socket count
//!
//! A sample is built synchronously and blocks for one CPU measurement
//! window; the agent loop runs it on the blocking pool.

use crate::discovery::HostIdentity;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sysinfo::{Disks, Networks, System};
use tracing::debug;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const CPU_WINDOW: Duration = Duration::from_secs(1);

/// Snapshot sent to the collector (matches the `/report` wire format)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub host: HostIdentity,
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub disk: Vec<DiskMetrics>,
    pub network: NetworkMetrics,
}

/// CPU usage metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub cpu_percent: Vec<f64>,
    pub cpu_count: u32,
    pub cpu_freq_current: Option<f64>,
    pub cpu_freq_max: Option<f64>,
}

/// Memory usage metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub memory_total: f64,
    pub memory_used: f64,
    pub memory_percent: f64,
    pub swap_total: f64,
    pub swap_used: f64,
    pub swap_percent: f64,
}

/// Disk usage metrics per filesystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskMetrics {
    pub device: String,
    pub mountpoint: String,
    pub total_size: f64,
    pub used: f64,
    pub free: f64,
    pub percent: f64,
}

/// Host-wide network counters, cumulative since boot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub connections: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("no CPU information available")]
    NoCpu,
    #[error("sampler task failed: {0}")]
    Task(String),
}

/// Source of snapshots driven by the agent loop
pub trait Sampler {
    fn sample(&mut self) -> Result<MetricSnapshot, SampleError>;
}

/// sysinfo-backed sampler, kept alive across cycles so refreshes stay incremental
pub struct SystemSampler {
    identity: HostIdentity,
    sys: System,
    disks: Disks,
    networks: Networks,
}

impl SystemSampler {
    pub fn new(identity: HostIdentity) -> Self {
        Self {
            identity,
            sys: System::new(),
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    fn collect_cpu(&mut self) -> Result<CpuMetrics, SampleError> {
        self.sys.refresh_cpu();
        std::thread::sleep(CPU_WINDOW.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        self.sys.refresh_cpu();

        let cpus = self.sys.cpus();
        if cpus.is_empty() {
            return Err(SampleError::NoCpu);
        }

        let cpu_percent = cpus
            .iter()
            .map(|c| round2(f64::from(c.cpu_usage()).clamp(0.0, 100.0)))
            .collect();
        let freqs: Vec<u64> = cpus.iter().map(|c| c.frequency()).filter(|f| *f > 0).collect();
        let cpu_freq_current = if freqs.is_empty() {
            None
        } else {
            Some(round2(freqs.iter().sum::<u64>() as f64 / freqs.len() as f64))
        };

        Ok(CpuMetrics {
            cpu_percent,
            cpu_count: cpus.len() as u32,
            cpu_freq_current,
            cpu_freq_max: max_cpu_frequency(),
        })
    }

    fn collect_memory(&mut self) -> MemoryMetrics {
        self.sys.refresh_memory();
        let (total, used) = (self.sys.total_memory(), self.sys.used_memory());
        let (swap_total, swap_used) = (self.sys.total_swap(), self.sys.used_swap());

        MemoryMetrics {
            memory_total: gb(total),
            memory_used: gb(used),
            memory_percent: percent(used, total),
            swap_total: gb(swap_total),
            swap_used: gb(swap_used),
            swap_percent: percent(swap_used, swap_total),
        }
    }

    fn collect_disks(&mut self) -> Vec<DiskMetrics> {
        self.disks.refresh_list();
        self.disks
            .list()
            .iter()
            .filter(|d| d.total_space() > 0)
            .map(|d| {
                let total = d.total_space();
                let free = d.available_space().min(total);
                let used = total - free;
                DiskMetrics {
                    device: d.name().to_string_lossy().to_string(),
                    mountpoint: d.mount_point().to_string_lossy().to_string(),
                    total_size: gb(total),
                    used: gb(used),
                    free: gb(free),
                    percent: percent(used, total),
                }
            })
            .collect()
    }

    fn collect_network(&mut self) -> NetworkMetrics {
        self.networks.refresh_list();
        let mut net = NetworkMetrics {
            bytes_sent: 0,
            bytes_recv: 0,
            packets_sent: 0,
            packets_recv: 0,
            connections: open_connections(),
        };
        for (_, data) in self.networks.iter() {
            net.bytes_sent += data.total_transmitted();
            net.bytes_recv += data.total_received();
            net.packets_sent += data.total_packets_transmitted();
            net.packets_recv += data.total_packets_received();
        }
        net
    }
}

impl Sampler for SystemSampler {
    fn sample(&mut self) -> Result<MetricSnapshot, SampleError> {
        debug!("Collecting system metrics...");
        let cpu = self.collect_cpu()?;
        let memory = self.collect_memory();
        let disk = self.collect_disks();
        let network = self.collect_network();

        Ok(MetricSnapshot {
            timestamp: Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            host: self.identity.clone(),
            cpu,
            memory,
            disk,
            network,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn gb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GB)
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2((part as f64 / total as f64 * 100.0).min(100.0))
}

#[cfg(target_os = "linux")]
fn max_cpu_frequency() -> Option<f64> {
    let raw = std::fs::read_to_string("/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq").ok()?;
    let khz: f64 = raw.trim().parse().ok()?;
    (khz > 0.0).then(|| round2(khz / 1000.0))
}

#[cfg(not(target_os = "linux"))]
fn max_cpu_frequency() -> Option<f64> {
    None
}

#[cfg(target_os = "linux")]
fn open_connections() -> u64 {
    ["/proc/net/tcp", "/proc/net/tcp6", "/proc/net/udp", "/proc/net/udp6"]
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|table| count_socket_entries(&table))
        .sum()
}

#[cfg(not(target_os = "linux"))]
fn open_connections() -> u64 {
    0
}

/// Rows of a /proc/net socket table, header excluded.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn count_socket_entries(table: &str) -> u64 {
    table.lines().skip(1).filter(|l| !l.trim().is_empty()).count() as u64
}
