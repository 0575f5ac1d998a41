//! Engine counters
//!
//! Lock-free tallies of work done, read back as a [`StatsSnapshot`].

use crate::index::IndexStats;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct EngineStats {
    files_fingerprinted: AtomicU64,
    files_failed: AtomicU64,
    fingerprint_micros: AtomicU64,
    queries_served: AtomicU64,
    matches_found: AtomicU64,
    match_micros: AtomicU64,
}

impl EngineStats {
    pub fn record_file(&self, elapsed: Duration, ok: bool) {
        if ok {
            self.files_fingerprinted.fetch_add(1, Ordering::Relaxed);
            self.fingerprint_micros
                .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        } else {
            self.files_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_query(&self, elapsed: Duration, matched: bool) {
        self.queries_served.fetch_add(1, Ordering::Relaxed);
        if matched {
            self.matches_found.fetch_add(1, Ordering::Relaxed);
        }
        self.match_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, index: IndexStats) -> StatsSnapshot {
        let files = self.files_fingerprinted.load(Ordering::Relaxed);
        let queries = self.queries_served.load(Ordering::Relaxed);

        StatsSnapshot {
            tracks_indexed: index.tracks,
            hashes_stored: index.postings,
            distinct_hashes: index.distinct_hashes,
            files_fingerprinted: files,
            files_failed: self.files_failed.load(Ordering::Relaxed),
            average_fingerprint_ms: average_ms(self.fingerprint_micros.load(Ordering::Relaxed), files),
            queries_served: queries,
            matches_found: self.matches_found.load(Ordering::Relaxed),
            average_match_latency_ms: average_ms(self.match_micros.load(Ordering::Relaxed), queries),
        }
    }
}

fn average_ms(total_micros: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total_micros as f64 / count as f64 / 1000.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub tracks_indexed: usize,
    pub hashes_stored: usize,
    pub distinct_hashes: usize,
    pub files_fingerprinted: u64,
    pub files_failed: u64,
    pub average_fingerprint_ms: f64,
    pub queries_served: u64,
    pub matches_found: u64,
    pub average_match_latency_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_averages() {
        let stats = EngineStats::default();
        let empty = stats.snapshot(IndexStats::default());
        assert_eq!(empty.queries_served, 0);
        assert_eq!(empty.average_match_latency_ms, 0.0);

        stats.record_query(Duration::from_millis(4), true);
        stats.record_query(Duration::from_millis(8), false);
        stats.record_file(Duration::from_millis(30), true);
        stats.record_file(Duration::from_millis(99), false);

        let snap = stats.snapshot(IndexStats {
            tracks: 1,
            postings: 10,
            distinct_hashes: 9,
        });
        assert_eq!(snap.queries_served, 2);
        assert_eq!(snap.matches_found, 1);
        assert_abs_diff_eq!(snap.average_match_latency_ms, 6.0, epsilon = 1e-9);
        assert_eq!(snap.files_fingerprinted, 1);
        assert_eq!(snap.files_failed, 1);
        assert_abs_diff_eq!(snap.average_fingerprint_ms, 30.0, epsilon = 1e-9);
        assert_eq!(snap.hashes_stored, 10);
    }
}
