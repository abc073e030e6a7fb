use crate::liveness::{self, Liveness};
use crate::sink::SinkStats;
use crate::store::ClientStore;
use serde::Serialize;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub hosts_tracked: usize,
    pub hosts_online: usize,
    pub active_sessions: usize,
    pub sink: SinkStats,
    pub memory_usage_mb: Option<f32>,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    pub fn get_health(
        &self,
        store: &ClientStore,
        sink: SinkStats,
        active_sessions: usize,
        threshold: Duration,
    ) -> KernelHealth {
        let now = OffsetDateTime::now_utc();
        let hosts = store.list();
        let hosts_online = hosts
            .iter()
            .filter(|h| liveness::status(h.last_seen, now, threshold) == Liveness::Online)
            .count();

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            hosts_tracked: hosts.len(),
            hosts_online,
            active_sessions,
            sink,
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> Option<f32> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let kb = status
            .lines()
            .find(|line| line.starts_with("VmRSS:"))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())?;
        Some(kb as f32 / 1024.0) // KB -> MB
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricSnapshot;
    use probe_devkit::SnapshotBuilder;

    #[test]
    fn test_health_counts_online_hosts() {
        let store = ClientStore::default();
        let now = OffsetDateTime::now_utc();
        for (ip, age) in [("10.0.0.1", 10), ("10.0.0.2", 500)] {
            let snap = MetricSnapshot::from_wire(&SnapshotBuilder::new(ip).to_vec()).unwrap();
            store.upsert(ip, snap, now - time::Duration::seconds(age));
        }

        let health = HealthTracker::new().get_health(&store, SinkStats::default(), 2, Duration::from_secs(180));
        assert_eq!(health.hosts_tracked, 2);
        assert_eq!(health.hosts_online, 1);
        assert_eq!(health.active_sessions, 2);
        #[cfg(target_os = "linux")]
        assert!(health.memory_usage_mb.unwrap_or(0.0) > 0.0);
    }
}
