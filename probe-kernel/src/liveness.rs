use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;

/// 3 cycles de rapport manqués à l'intervalle par défaut de 60s.
pub const DEFAULT_LIVENESS_THRESHOLD: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Online,
    Offline,
}

/// Online ssi `now - last_seen < threshold`. Pas d'hystérésis.
pub fn status(last_seen: OffsetDateTime, now: OffsetDateTime, threshold: Duration) -> Liveness {
    let age = now - last_seen;
    if age < threshold {
        Liveness::Online
    } else {
        Liveness::Offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ClientStore;
    use probe_devkit::SnapshotBuilder;
    use time::Duration as TimeDuration;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap()
    }

    #[test]
    fn test_threshold_boundary() {
        let t = DEFAULT_LIVENESS_THRESHOLD;
        assert_eq!(status(at(0), at(0), t), Liveness::Online);
        assert_eq!(status(at(0), at(179), t), Liveness::Online);
        assert_eq!(status(at(0), at(180), t), Liveness::Offline);
        assert_eq!(status(at(0), at(181), t), Liveness::Offline);
    }

    #[test]
    fn test_sub_second_boundary() {
        let t = DEFAULT_LIVENESS_THRESHOLD;
        let just_under = at(180) - TimeDuration::milliseconds(1);
        assert_eq!(status(at(0), just_under, t), Liveness::Online);
    }

    #[test]
    fn test_future_last_seen_counts_as_online() {
        assert_eq!(status(at(30), at(0), DEFAULT_LIVENESS_THRESHOLD), Liveness::Online);
    }

    #[test]
    fn test_no_hysteresis() {
        let t = DEFAULT_LIVENESS_THRESHOLD;
        assert_eq!(status(at(0), at(200), t), Liveness::Offline);
        // un seul rapport frais suffit à repasser en ligne
        assert_eq!(status(at(200), at(200), t), Liveness::Online);
    }

    #[test]
    fn test_reporting_host_goes_offline_after_silence() {
        let store = ClientStore::default();
        let payload = SnapshotBuilder::new("10.0.0.5").to_vec();
        for secs in [0, 60, 120] {
            let snap = crate::models::MetricSnapshot::from_wire(&payload).unwrap();
            store.upsert("10.0.0.5", snap, at(secs));
        }

        let last_seen = store.last_seen("10.0.0.5").unwrap();
        assert_eq!(last_seen, at(120));
        assert_eq!(status(last_seen, at(150), DEFAULT_LIVENESS_THRESHOLD), Liveness::Online);
        assert_eq!(status(last_seen, at(310), DEFAULT_LIVENESS_THRESHOLD), Liveness::Offline);
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Liveness::Online).unwrap(), "online");
        assert_eq!(serde_json::to_value(Liveness::Offline).unwrap(), "offline");
    }
}
