use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const LATENCY_BUCKET_COUNT: usize = 10;
const LATENCY_BUCKETS_MS: [u64; LATENCY_BUCKET_COUNT] =
    [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000];

#[derive(Clone, Debug, Serialize)]
pub struct LatencySnapshot {
    pub buckets_ms: Vec<u64>,
    pub counts: Vec<u64>,
    pub overflow: u64,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Default)]
struct LatencyMetrics {
    buckets: [AtomicU64; LATENCY_BUCKET_COUNT],
    overflow: AtomicU64,
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyMetrics {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
        match LATENCY_BUCKETS_MS.iter().position(|bucket| ms <= *bucket) {
            Some(idx) => self.buckets[idx].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        LatencySnapshot {
            buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            counts: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            overflow: self.overflow.load(Ordering::Relaxed),
            count,
            avg_ms: if count > 0 {
                total_ms as f64 / count as f64
            } else {
                0.0
            },
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct HttpMetricsSnapshot {
    pub spins: LatencySnapshot,
    pub claims: LatencySnapshot,
    pub wheels: LatencySnapshot,
    pub withdrawals: LatencySnapshot,
    pub other: LatencySnapshot,
    pub reject_rate_limit: u64,
    pub reject_conflict: u64,
    pub server_errors: u64,
    pub accepted_partial: u64,
}

/// Per-route-family latency and rejection counters.
#[derive(Default)]
pub struct HttpMetrics {
    spins: LatencyMetrics,
    claims: LatencyMetrics,
    wheels: LatencyMetrics,
    withdrawals: LatencyMetrics,
    other: LatencyMetrics,
    reject_rate_limit: AtomicU64,
    reject_conflict: AtomicU64,
    server_errors: AtomicU64,
    accepted_partial: AtomicU64,
}

impl HttpMetrics {
    pub fn record(&self, path: &str, duration: Duration) {
        let family = if path.ends_with("/spin") {
            &self.spins
        } else if path.ends_with("/claim") || path.ends_with("/reroll") {
            &self.claims
        } else if path.starts_with("/wheels/") {
            &self.wheels
        } else if path.ends_with("/withdraw") {
            &self.withdrawals
        } else {
            &self.other
        };
        family.record(duration);
    }

    pub fn inc_reject_rate_limit(&self) {
        self.reject_rate_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_conflict(&self) {
        self.reject_conflict.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_server_error(&self) {
        self.server_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_accepted_partial(&self) {
        self.accepted_partial.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        HttpMetricsSnapshot {
            spins: self.spins.snapshot(),
            claims: self.claims.snapshot(),
            wheels: self.wheels.snapshot(),
            withdrawals: self.withdrawals.snapshot(),
            other: self.other.snapshot(),
            reject_rate_limit: self.reject_rate_limit.load(Ordering::Relaxed),
            reject_conflict: self.reject_conflict.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            accepted_partial: self.accepted_partial.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_are_grouped_by_family() {
        let metrics = HttpMetrics::default();
        metrics.record("/cases/1/spin", Duration::from_millis(3));
        metrics.record("/slots/2/spin", Duration::from_millis(7_000));
        metrics.record("/wheels/1/join", Duration::from_millis(1));
        metrics.record("/healthz", Duration::from_millis(1));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.spins.count, 2);
        assert_eq!(snapshot.spins.overflow, 1);
        assert_eq!(snapshot.spins.max_ms, 7_000);
        assert_eq!(snapshot.wheels.count, 1);
        assert_eq!(snapshot.other.count, 1);
        assert_eq!(snapshot.claims.count, 0);
    }
}
