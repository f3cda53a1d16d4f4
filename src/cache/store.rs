//! Cache Store Module
//!
//! Main cache engine: HashMap storage with TTL expiration, access tracking and
//! batch eviction against a memory budget.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::eviction::{eviction_target, select_victims};
use crate::cache::{CacheEntry, EvictionPolicy, MetricsRecorder, SizeEstimator};

// == Cache Store ==
/// In-memory key→entry map.
///
/// The store is time-agnostic: every operation that cares about time takes
/// `now` in Unix milliseconds from the caller's clock.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Shared performance counters
    metrics: Arc<MetricsRecorder>,
    /// Value measurement
    estimator: Arc<dyn SizeEstimator>,
    /// Victim scoring
    policy: Arc<dyn EvictionPolicy>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store reporting into `metrics`.
    pub fn new(
        metrics: Arc<MetricsRecorder>,
        estimator: Arc<dyn SizeEstimator>,
        policy: Arc<dyn EvictionPolicy>,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            metrics,
            estimator,
            policy,
        }
    }

    // == Set ==
    /// Stores a value, overwriting any previous entry and resetting its
    /// counters. Returns a copy of the new entry.
    ///
    /// A value that cannot be measured is stored with a 0-byte estimate.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `data` - The value to store
    /// * `ttl` - TTL in milliseconds, already resolved against the default
    /// * `now` - Current Unix time in milliseconds
    pub fn set(&mut self, key: &str, data: Value, ttl: i64, now: u64) -> CacheEntry {
        let size = match self.estimator.estimate(&data) {
            Ok(size) => size,
            Err(e) => {
                warn!(key, error = %e, "Size estimation failed, storing with 0 bytes");
                0
            }
        };

        let entry = CacheEntry::new(data, ttl, size, now);
        self.entries.insert(key.to_string(), entry.clone());
        self.metrics.set_entry_count(self.entries.len());
        entry
    }

    // == Insert Entry ==
    /// Inserts a prebuilt entry as-is, keeping its timestamps and counters.
    pub fn insert_entry(&mut self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
        self.metrics.set_entry_count(self.entries.len());
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns the value if found and not expired. Expired entries are
    /// removed and counted as misses.
    pub fn get(&mut self, key: &str, now: u64) -> Option<Value> {
        let expired = match self.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.record_access(now);
                self.metrics.record_hit();
                return Some(entry.data.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
            self.metrics.set_entry_count(self.entries.len());
            debug!(key, "Dropped expired entry on read");
        }
        self.metrics.record_miss();
        None
    }

    // == Peek ==
    /// Returns the entry without touching counters or expiry.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Is Fresh ==
    /// True if `key` holds an unexpired entry.
    pub fn is_fresh(&self, key: &str, now: u64) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    // == Remove ==
    /// Removes an entry by key, returning whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.metrics.set_entry_count(self.entries.len());
        removed
    }

    // == Clear ==
    /// Empties the store and zeroes the memory usage metric. Hit, miss and
    /// prefetch counters are left alone.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.metrics.set_memory_usage(0);
        self.metrics.set_entry_count(0);
    }

    // == Purge Expired ==
    /// Removes all expired entries from the store.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        self.metrics.set_entry_count(self.entries.len());
        before - self.entries.len()
    }

    // == Memory Usage ==
    /// Recomputes aggregate usage as the sum of entry sizes and publishes it.
    pub fn recompute_memory_usage(&self) -> usize {
        let total = self.entries.values().map(|entry| entry.size).sum();
        self.metrics.set_memory_usage(total);
        total
    }

    // == Evict ==
    /// Runs one eviction pass if usage exceeds `max_memory_usage`.
    ///
    /// Returns the evicted keys (empty if the store was within budget).
    pub fn evict(&mut self, max_memory_usage: usize, now: u64) -> Vec<String> {
        let usage = self.recompute_memory_usage();
        if usage <= max_memory_usage {
            return Vec::new();
        }

        let target = eviction_target(usage, max_memory_usage);
        let victims = select_victims(self.policy.as_ref(), &self.entries, now, target);
        for key in &victims {
            self.entries.remove(key);
        }

        self.metrics.set_entry_count(self.entries.len());
        self.metrics.record_eviction(victims.len(), now);
        let remaining = self.recompute_memory_usage();
        debug!(
            evicted = victims.len(),
            before = usage,
            after = remaining,
            "Eviction pass complete"
        );
        victims
    }

    // == Length ==
    /// Returns the current number of entries in the store.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Keys ==
    /// Iterates over stored keys, expired or not.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}
