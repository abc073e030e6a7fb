/**
 * PERSISTENCE SINK - Journal quotidien append-only des snapshots acceptés
 *
 * FONCTIONNEMENT :
 * - `append` dépose le snapshot dans une file bornée (try_send, jamais bloquant)
 * - une tâche Tokio dédiée vide la file et écrit une ligne JSON par snapshot
 *   dans `<dir>/probe_<YYYYMMDD>.log` (date UTC d'ingestion)
 * - file pleine ou disque en erreur : compteur + log, l'ingestion n'échoue jamais
 */

use crate::models::MetricSnapshot;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("date formatting error: {0}")]
    Format(#[from] time::error::Format),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub written: u64,
    pub dropped: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    written: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

struct SinkItem {
    snapshot: Arc<MetricSnapshot>,
    ingested_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct SnapshotSink {
    tx: mpsc::Sender<SinkItem>,
    counters: Arc<Counters>,
}

/// Tâche d'écriture ; se termine quand tous les `SnapshotSink` sont droppés.
pub struct SinkWriter {
    handle: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl SinkWriter {
    /// Attend la fin du drain et renvoie les compteurs finaux.
    pub async fn join(self) -> SinkStats {
        if let Err(e) = self.handle.await {
            error!("[sink] writer task aborted: {e}");
        }
        self.counters.snapshot()
    }
}

impl Counters {
    fn snapshot(&self) -> SinkStats {
        SinkStats {
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl SnapshotSink {
    pub fn spawn<P: Into<PathBuf>>(dir: P, capacity: usize) -> (Self, SinkWriter) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let log = DailyLog { dir: dir.into(), current: None, torn: None };
        let handle = tokio::spawn(drain(rx, log, counters.clone()));
        (Self { tx, counters: counters.clone() }, SinkWriter { handle, counters })
    }

    pub fn append(&self, snapshot: Arc<MetricSnapshot>, ingested_at: OffsetDateTime) {
        match self.tx.try_send(SinkItem { snapshot, ingested_at }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(item)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(ip = %item.snapshot.ip(), "[sink] queue full, snapshot not persisted");
            }
            Err(mpsc::error::TrySendError::Closed(item)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(ip = %item.snapshot.ip(), "[sink] writer stopped, snapshot not persisted");
            }
        }
    }

    pub fn stats(&self) -> SinkStats {
        self.counters.snapshot()
    }
}

async fn drain(mut rx: mpsc::Receiver<SinkItem>, mut log: DailyLog, counters: Arc<Counters>) {
    while let Some(item) = rx.recv().await {
        match log.write(&item).await {
            Ok(()) => {
                counters.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(ip = %item.snapshot.ip(), dir = %log.dir.display(), "[sink] write failed: {e}");
            }
        }
    }
    debug!("[sink] queue closed, writer exiting");
}

pub fn partition_name(at: OffsetDateTime) -> Result<String, PersistenceError> {
    let day = at.format(format_description!("[year][month][day]"))?;
    Ok(format!("probe_{day}.log"))
}

struct DailyLog {
    dir: PathBuf,
    current: Option<(String, File)>,
    /// Fichier dont la dernière ligne a pu rester incomplète après une erreur d'écriture.
    torn: Option<String>,
}

impl DailyLog {
    async fn write(&mut self, item: &SinkItem) -> Result<(), PersistenceError> {
        let name = partition_name(item.ingested_at)?;
        let mut line = serde_json::to_vec(&*item.snapshot)?;
        line.push(b'\n');

        let result = self.append_line(name, &line).await;
        if result.is_err() {
            // réouverture au prochain snapshot
            self.current = None;
        }
        result
    }

    async fn append_line(&mut self, name: String, line: &[u8]) -> Result<(), PersistenceError> {
        let reopen = !matches!(&self.current, Some((current, _)) if *current == name);
        if reopen {
            let file = open_partition(&self.dir, &name).await?;
            self.current = Some((name, file));
        }
        if let Some((name, file)) = &mut self.current {
            // ligne partielle possible : on repart sur une ligne neuve
            let resync = self.torn.as_deref() == Some(name.as_str());
            let written = async {
                if resync {
                    file.write_all(b"\n").await?;
                }
                file.write_all(line).await?;
                file.flush().await
            }
            .await;
            match written {
                Ok(()) if resync => self.torn = None,
                Ok(()) => {}
                Err(e) => {
                    self.torn = Some(name.clone());
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

async fn open_partition(dir: &Path, name: &str) -> Result<File, PersistenceError> {
    fs::create_dir_all(dir).await?;
    let file = OpenOptions::new().create(true).append(true).open(dir.join(name)).await?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_devkit::SnapshotBuilder;
    use tempfile::TempDir;
    use time::macros::datetime;

    fn snap(ip: &str, seq: u64) -> Arc<MetricSnapshot> {
        Arc::new(MetricSnapshot::from_wire(&SnapshotBuilder::new(ip).bytes_sent(seq).to_vec()).unwrap())
    }

    #[test]
    fn test_partition_name() {
        let at = datetime!(2026-03-07 23:59:59 UTC);
        assert_eq!(partition_name(at).unwrap(), "probe_20260307.log");
    }

    #[tokio::test]
    async fn test_appends_one_line_per_snapshot() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("logs");
        let (sink, writer) = SnapshotSink::spawn(&dir, 16);
        let at = datetime!(2026-03-07 10:00:00 UTC);

        for seq in 0..3 {
            sink.append(snap("10.0.0.5", seq), at);
        }
        drop(sink);
        let stats = writer.join().await;
        assert_eq!(stats, SinkStats { written: 3, dropped: 0, failed: 0 });

        let content = std::fs::read_to_string(dir.join("probe_20260307.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        for (seq, line) in lines.iter().enumerate() {
            let decoded = MetricSnapshot::from_wire(line.as_bytes()).unwrap();
            assert_eq!(decoded.network.bytes_sent, seq as u64);
            assert_eq!(decoded.ip(), "10.0.0.5");
        }
    }

    #[tokio::test]
    async fn test_partitions_by_day_and_appends_to_existing_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("probe_20260307.log"), "{\"previous\":true}\n").unwrap();

        let (sink, writer) = SnapshotSink::spawn(tmp.path(), 16);
        sink.append(snap("10.0.0.5", 1), datetime!(2026-03-07 23:59:59 UTC));
        sink.append(snap("10.0.0.5", 2), datetime!(2026-03-08 00:00:01 UTC));
        drop(sink);
        let stats = writer.join().await;

        let day1 = std::fs::read_to_string(tmp.path().join("probe_20260307.log")).unwrap();
        let day2 = std::fs::read_to_string(tmp.path().join("probe_20260308.log")).unwrap();
        assert_eq!(day1.lines().count(), 2);
        assert_eq!(day2.lines().count(), 1);
        assert_eq!(stats.written, 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let tmp = TempDir::new().unwrap();
        let (sink, writer) = SnapshotSink::spawn(tmp.path(), 2);
        let at = datetime!(2026-03-07 10:00:00 UTC);

        // runtime mono-thread : le writer ne tourne pas avant le premier await
        for seq in 0..5 {
            sink.append(snap("10.0.0.5", seq), at);
        }
        assert_eq!(sink.stats().dropped, 3);

        drop(sink);
        let stats = writer.join().await;
        assert_eq!(stats.written, 2);
        assert_eq!(stats.dropped, 3);
    }

    #[tokio::test]
    async fn test_line_after_torn_write_starts_fresh() {
        let tmp = TempDir::new().unwrap();
        let name = "probe_20260307.log".to_string();
        std::fs::write(tmp.path().join(&name), "{\"ip\":\"10.0.0.5\",\"cpu\":").unwrap();

        let mut log = DailyLog { dir: tmp.path().to_path_buf(), current: None, torn: Some(name.clone()) };
        for seq in 1..=2 {
            let item = SinkItem { snapshot: snap("10.0.0.5", seq), ingested_at: datetime!(2026-03-07 10:00:00 UTC) };
            log.write(&item).await.unwrap();
        }
        assert!(log.torn.is_none());

        let content = std::fs::read_to_string(tmp.path().join(&name)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(MetricSnapshot::from_wire(lines[0].as_bytes()).is_err());
        assert_eq!(MetricSnapshot::from_wire(lines[1].as_bytes()).unwrap().network.bytes_sent, 1);
        assert_eq!(MetricSnapshot::from_wire(lines[2].as_bytes()).unwrap().network.bytes_sent, 2);
    }

    #[tokio::test]
    async fn test_write_failure_is_counted_not_propagated() {
        let tmp = TempDir::new().unwrap();
        let not_a_dir = tmp.path().join("occupied");
        std::fs::write(&not_a_dir, "file in the way").unwrap();

        let (sink, writer) = SnapshotSink::spawn(&not_a_dir, 4);
        sink.append(snap("10.0.0.5", 0), datetime!(2026-03-07 10:00:00 UTC));
        drop(sink);
        let stats = writer.join().await;
        assert_eq!(stats.written, 0);
        assert_eq!(stats.failed, 1);
    }
}
