//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and access
//! tracking.

use serde_json::Value;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The stored value
    pub data: Value,
    /// Insertion timestamp (Unix milliseconds)
    pub timestamp: u64,
    /// Time to live in milliseconds; zero or negative means already stale
    pub ttl: i64,
    /// Estimated size in bytes
    pub size: usize,
    /// Number of hits served from this entry
    pub access_count: u64,
    /// Time of the most recent hit, or the insertion time
    pub last_accessed: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a fresh entry stamped at `now`.
    ///
    /// # Arguments
    /// * `data` - The value to store
    /// * `ttl` - TTL in milliseconds
    /// * `size` - Estimated size in bytes
    /// * `now` - Current Unix time in milliseconds
    pub fn new(data: Value, ttl: i64, size: usize, now: u64) -> Self {
        Self {
            data,
            timestamp: now,
            ttl,
            size,
            access_count: 0,
            last_accessed: now,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry stays valid while `now - timestamp <= ttl`
    /// and expires as soon as the age strictly exceeds the TTL.
    pub fn is_expired(&self, now: u64) -> bool {
        self.age_ms(now) > self.ttl
    }

    // == Age ==
    /// Milliseconds since insertion (negative if the clock moved backwards).
    fn age_ms(&self, now: u64) -> i64 {
        now as i64 - self.timestamp as i64
    }

    // == Record Access ==
    /// Bumps the access counter and recency stamp after a hit.
    pub fn record_access(&mut self, now: u64) {
        self.access_count += 1;
        self.last_accessed = now;
    }
}
