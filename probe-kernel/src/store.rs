/**
 * CLIENT STORE - Historique borné par hôte + horodatage de dernière activité
 *
 * RÔLE : Seule ressource mutable partagée du kernel. Chaque IP possède un
 * ClientRecord (FIFO des N derniers snapshots + last_seen).
 *
 * CONCURRENCE : map découpée en shards, chacun sous un RwLock parking_lot.
 * Deux hôtes sur des shards différents s'écrivent en parallèle ; un même hôte
 * est toujours sérialisé par le verrou de son shard. Les lectures copient des
 * Arc hors de la section critique, jamais de liste à moitié modifiée.
 */

use crate::models::MetricSnapshot;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use time::OffsetDateTime;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const MAX_HISTORY_CAPACITY: usize = 10_000;
const SHARD_COUNT: usize = 16;

#[derive(Debug)]
struct ClientRecord {
    history: VecDeque<Arc<MetricSnapshot>>,
    last_seen: OffsetDateTime,
}

/// Vue instantanée d'un hôte pour le listing.
#[derive(Debug, Clone)]
pub struct HostEntry {
    pub ip: String,
    pub latest: Arc<MetricSnapshot>,
    pub last_seen: OffsetDateTime,
}

pub struct ClientStore {
    shards: Box<[RwLock<HashMap<String, ClientRecord>>]>,
    capacity: usize,
}

impl ClientStore {
    pub fn new(capacity: usize) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards, capacity: capacity.clamp(1, MAX_HISTORY_CAPACITY) }
    }

    fn shard(&self, ip: &str) -> &RwLock<HashMap<String, ClientRecord>> {
        let mut hasher = DefaultHasher::new();
        ip.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Ajoute un snapshot à l'historique de `ip` et renvoie le last_seen résultant.
    ///
    /// `seen_at` est l'heure d'ingestion côté serveur : l'horodatage embarqué
    /// par l'agent n'est jamais utilisé pour la vivacité. last_seen ne recule
    /// jamais, même si l'horloge du serveur saute en arrière.
    pub fn upsert(
        &self,
        ip: &str,
        snapshot: impl Into<Arc<MetricSnapshot>>,
        seen_at: OffsetDateTime,
    ) -> OffsetDateTime {
        let snapshot = snapshot.into();
        let mut shard = self.shard(ip).write();
        let record = shard.entry(ip.to_string()).or_insert_with(|| ClientRecord {
            history: VecDeque::new(),
            last_seen: seen_at,
        });

        record.history.push_back(snapshot);
        while record.history.len() > self.capacity {
            record.history.pop_front();
        }
        record.last_seen = record.last_seen.max(seen_at);
        record.last_seen
    }

    pub fn latest(&self, ip: &str) -> Option<Arc<MetricSnapshot>> {
        self.shard(ip).read().get(ip).and_then(|r| r.history.back().cloned())
    }

    pub fn last_seen(&self, ip: &str) -> Option<OffsetDateTime> {
        self.shard(ip).read().get(ip).map(|r| r.last_seen)
    }

    /// Historique retenu, du plus ancien au plus récent.
    pub fn history(&self, ip: &str) -> Option<Vec<Arc<MetricSnapshot>>> {
        self.shard(ip)
            .read()
            .get(ip)
            .filter(|r| !r.history.is_empty())
            .map(|r| r.history.iter().cloned().collect())
    }

    /// Photo de tous les hôtes connus, triée par IP.
    pub fn list(&self) -> Vec<HostEntry> {
        let mut entries = Vec::new();
        for shard in self.shards.iter() {
            let guard = shard.read();
            entries.extend(guard.iter().filter_map(|(ip, record)| {
                record.history.back().map(|latest| HostEntry {
                    ip: ip.clone(),
                    latest: latest.clone(),
                    last_seen: record.last_seen,
                })
            }));
        }
        entries.sort_by(|a, b| a.ip.cmp(&b.ip));
        entries
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }
}

impl Default for ClientStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_devkit::SnapshotBuilder;
    use time::Duration;

    fn snap(ip: &str, seq: u64) -> MetricSnapshot {
        MetricSnapshot::from_wire(&SnapshotBuilder::new(ip).bytes_sent(seq).to_vec()).unwrap()
    }

    fn t0() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn test_unknown_host() {
        let store = ClientStore::default();
        assert!(store.latest("10.0.0.1").is_none());
        assert!(store.history("10.0.0.1").is_none());
        assert!(store.list().is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let store = ClientStore::default();
        for seq in 0..105 {
            store.upsert("10.0.0.5", snap("10.0.0.5", seq), t0() + Duration::seconds(seq as i64));
        }

        let history = store.history("10.0.0.5").unwrap();
        assert_eq!(history.len(), 100);
        let seqs: Vec<u64> = history.iter().map(|s| s.network.bytes_sent).collect();
        assert_eq!(seqs, (5..105).collect::<Vec<_>>());
        assert_eq!(store.latest("10.0.0.5").unwrap().network.bytes_sent, 104);

        let listed = store.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].latest.network.bytes_sent, 104);
    }

    #[test]
    fn test_history_below_capacity_keeps_everything() {
        let store = ClientStore::new(10);
        for seq in 0..7 {
            store.upsert("10.0.0.5", snap("10.0.0.5", seq), t0());
        }
        assert_eq!(store.history("10.0.0.5").unwrap().len(), 7);
    }

    #[test]
    fn test_capacity_is_clamped() {
        let store = ClientStore::new(usize::MAX);
        for seq in 0..3 {
            store.upsert("10.0.0.5", snap("10.0.0.5", seq), t0());
        }
        assert_eq!(store.history("10.0.0.5").unwrap().len(), 3);
        assert_eq!(store.capacity, MAX_HISTORY_CAPACITY);
        assert_eq!(ClientStore::new(0).capacity, 1);
    }

    #[test]
    fn test_last_seen_is_monotonic() {
        let store = ClientStore::default();
        let first = store.upsert("10.0.0.5", snap("10.0.0.5", 0), t0() + Duration::seconds(60));
        assert_eq!(first, t0() + Duration::seconds(60));

        // horloge serveur qui recule : last_seen reste en place
        let second = store.upsert("10.0.0.5", snap("10.0.0.5", 1), t0());
        assert_eq!(second, t0() + Duration::seconds(60));

        let third = store.upsert("10.0.0.5", snap("10.0.0.5", 2), t0() + Duration::seconds(120));
        assert_eq!(third, t0() + Duration::seconds(120));
        assert_eq!(store.last_seen("10.0.0.5"), Some(third));
    }

    #[test]
    fn test_list_is_sorted_by_ip() {
        let store = ClientStore::default();
        for ip in ["10.0.0.9", "10.0.0.1", "10.0.0.5"] {
            store.upsert(ip, snap(ip, 0), t0());
        }
        let ips: Vec<String> = store.list().into_iter().map(|e| e.ip).collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.5", "10.0.0.9"]);
    }

    #[test]
    fn test_concurrent_distinct_hosts_do_not_mix() {
        let store = ClientStore::default();
        std::thread::scope(|scope| {
            for h in 0..32u64 {
                let store = &store;
                scope.spawn(move || {
                    let ip = format!("10.1.0.{h}");
                    for seq in 0..20 {
                        store.upsert(&ip, snap(&ip, h * 1000 + seq), t0());
                    }
                });
            }
        });

        assert_eq!(store.len(), 32);
        for entry in store.list() {
            let history = store.history(&entry.ip).unwrap();
            assert_eq!(history.len(), 20);
            assert!(history.iter().all(|s| s.host.ip == entry.ip));
            let h: u64 = entry.ip.rsplit('.').next().unwrap().parse().unwrap();
            assert!(history.iter().all(|s| s.network.bytes_sent / 1000 == h));
        }
    }

    #[test]
    fn test_concurrent_same_host_loses_no_update() {
        let store = ClientStore::new(1_000);
        std::thread::scope(|scope| {
            for w in 0..8u64 {
                let store = &store;
                scope.spawn(move || {
                    for seq in 0..50 {
                        store.upsert("10.0.0.5", snap("10.0.0.5", w * 100 + seq), t0());
                    }
                });
            }
        });

        let history = store.history("10.0.0.5").unwrap();
        assert_eq!(history.len(), 400);
        let mut seqs: Vec<u64> = history.iter().map(|s| s.network.bytes_sent).collect();
        seqs.sort_unstable();
        seqs.dedup();
        assert_eq!(seqs.len(), 400);
    }

    #[test]
    fn test_readers_never_see_partial_history() {
        let store = ClientStore::new(5);
        std::thread::scope(|scope| {
            let writer_store = &store;
            scope.spawn(move || {
                for seq in 0..2_000 {
                    writer_store.upsert("10.0.0.5", snap("10.0.0.5", seq), t0());
                }
            });
            let reader_store = &store;
            scope.spawn(move || {
                for _ in 0..2_000 {
                    if let Some(history) = reader_store.history("10.0.0.5") {
                        assert!(!history.is_empty() && history.len() <= 5);
                        assert!(history.windows(2).all(|w| w[0].network.bytes_sent < w[1].network.bytes_sent));
                    }
                }
            });
        });
    }
}
