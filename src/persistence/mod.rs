//! Persistence Module
//!
//! Best-effort mirroring of cache entries into a durable local key-value
//! store so they can be read back after a restart.
//!
//! # Components
//! - [`DurableStore`]: the keyed collection itself (file or in-memory)
//! - [`PersistenceBridge`]: background worker applying write/delete requests

mod bridge;
mod durable;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CacheEntry;

pub use bridge::PersistenceBridge;
pub use durable::{DurableStore, InMemoryDurableStore, JsonFileStore};

// == Persisted Entry ==
/// Durable record of one cache entry, keyed by `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub key: String,
    pub data: Value,
    pub timestamp: u64,
    pub ttl: i64,
    pub size: usize,
    pub access_count: u64,
    pub last_accessed: u64,
}

impl PersistedEntry {
    /// Builds the durable record for `entry` stored under `key`.
    pub fn from_entry(key: impl Into<String>, entry: &CacheEntry) -> Self {
        Self {
            key: key.into(),
            data: entry.data.clone(),
            timestamp: entry.timestamp,
            ttl: entry.ttl,
            size: entry.size,
            access_count: entry.access_count,
            last_accessed: entry.last_accessed,
        }
    }

    /// Splits the record back into its key and in-memory entry.
    pub fn into_entry(self) -> (String, CacheEntry) {
        let entry = CacheEntry {
            data: self.data,
            timestamp: self.timestamp,
            ttl: self.ttl,
            size: self.size,
            access_count: self.access_count,
            last_accessed: self.last_accessed,
        };
        (self.key, entry)
    }
}
