//! Cache Metrics Module
//!
//! Tracks cache performance metrics: hits, misses, memory usage, evictions
//! and prefetches.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

// == Cache Metrics ==
/// Point-in-time snapshot of cache metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheMetrics {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Sum of entry sizes as of the last recomputation
    pub memory_usage: usize,
    /// Time of the most recent eviction (Unix milliseconds)
    pub last_cleanup: Option<u64>,
    /// Number of values stored by prefetching or warming
    pub prefetch_count: u64,
    /// Number of entries removed by eviction
    pub evictions: u64,
    /// Number of entries held in memory
    pub entry_count: usize,
}

impl CacheMetrics {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Metrics Recorder ==
/// Live counters shared between the store, the monitor and the prefetcher.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    memory_usage: AtomicUsize,
    // 0 = never
    last_cleanup: AtomicU64,
    prefetch_count: AtomicU64,
    evictions: AtomicU64,
    entry_count: AtomicUsize,
}

impl MetricsRecorder {
    /// Creates a recorder with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prefetch(&self) {
        self.prefetch_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an eviction pass that removed `count` entries at `now`.
    pub fn record_eviction(&self, count: usize, now: u64) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        self.last_cleanup.store(now.max(1), Ordering::Relaxed);
    }

    pub fn set_memory_usage(&self, bytes: usize) {
        self.memory_usage.store(bytes, Ordering::Relaxed);
    }

    pub fn memory_usage(&self) -> usize {
        self.memory_usage.load(Ordering::Relaxed)
    }

    pub fn set_entry_count(&self, count: usize) {
        self.entry_count.store(count, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Copies the current counter values into a detached [`CacheMetrics`].
    pub fn snapshot(&self) -> CacheMetrics {
        let last_cleanup = match self.last_cleanup.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        };
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            memory_usage: self.memory_usage(),
            last_cleanup,
            prefetch_count: self.prefetch_count.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count: self.entry_count.load(Ordering::Relaxed),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_new() {
        let metrics = MetricsRecorder::new().snapshot();
        assert_eq!(metrics, CacheMetrics::default());
        assert!(metrics.last_cleanup.is_none());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheMetrics::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let recorder = MetricsRecorder::new();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_miss();
        assert_eq!(recorder.snapshot().hit_rate(), 0.75);
    }

    #[test]
    fn test_record_eviction() {
        let recorder = MetricsRecorder::new();
        recorder.record_eviction(2, 9_000);
        recorder.record_eviction(1, 9_500);

        let metrics = recorder.snapshot();
        assert_eq!(metrics.evictions, 3);
        assert_eq!(metrics.last_cleanup, Some(9_500));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let recorder = MetricsRecorder::new();
        let before = recorder.snapshot();
        recorder.record_hit();
        assert_eq!(before.hits, 0);
        assert_eq!(recorder.snapshot().hits, 1);
    }
}
