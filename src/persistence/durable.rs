//! Durable Store Module
//!
//! A single keyed collection of [`PersistedEntry`] records. Only the
//! persistence worker talks to a durable store.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::persistence::PersistedEntry;

// == Durable Store Trait ==
/// Process-restart-surviving key-value collection, primary key = cache key.
#[async_trait]
pub trait DurableStore: Send + std::fmt::Debug {
    /// Prepares the store for use. Called lazily before the first operation.
    async fn open(&mut self) -> Result<()>;

    /// Inserts or replaces the record for `entry.key`.
    async fn put(&mut self, entry: PersistedEntry) -> Result<()>;

    /// Removes the records for `keys`; unknown keys are ignored.
    async fn delete(&mut self, keys: &[String]) -> Result<()>;

    /// Removes every record.
    async fn clear(&mut self) -> Result<()>;

    /// Returns every stored record.
    async fn load_all(&mut self) -> Result<Vec<PersistedEntry>>;
}

// == JSON File Store ==
/// Durable store kept as one JSON object (`key -> record`) on disk.
///
/// The whole collection is held in memory once opened and rewritten through a
/// temporary file on each mutation.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: BTreeMap<String, PersistedEntry>,
}

impl JsonFileStore {
    /// Creates a store backed by `path`. Nothing is read until [`open`].
    ///
    /// [`open`]: DurableStore::open
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
        }
    }

    async fn write_out(&self) -> Result<()> {
        let bytes = serde_json::to_vec(&self.records)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for JsonFileStore {
    async fn open(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => self.records.clear(),
            Ok(bytes) => self.records = serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.records.clear(),
            Err(e) => return Err(e.into()),
        }

        debug!(path = %self.path.display(), records = self.records.len(), "Opened durable store");
        Ok(())
    }

    async fn put(&mut self, entry: PersistedEntry) -> Result<()> {
        self.records.insert(entry.key.clone(), entry);
        self.write_out().await
    }

    async fn delete(&mut self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.records.remove(key);
        }
        self.write_out().await
    }

    async fn clear(&mut self) -> Result<()> {
        self.records.clear();
        self.write_out().await
    }

    async fn load_all(&mut self) -> Result<Vec<PersistedEntry>> {
        Ok(self.records.values().cloned().collect())
    }
}

// == In-Memory Durable Store ==
#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<String, PersistedEntry>,
    open_calls: usize,
    operations: usize,
    failing: bool,
}

/// Durable store living in shared memory.
///
/// Clones share state, so a test can hand one clone to the cache and inspect
/// the other. [`set_failing`](Self::set_failing) makes every call error.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDurableStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent operations fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Seeds a record without going through the cache.
    pub fn insert(&self, entry: PersistedEntry) {
        self.lock().records.insert(entry.key.clone(), entry);
    }

    /// Returns the record stored under `key`.
    pub fn record(&self, key: &str) -> Option<PersistedEntry> {
        self.lock().records.get(key).cloned()
    }

    /// Sorted list of stored keys.
    pub fn keys(&self) -> Vec<String> {
        self.lock().records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// How many times the store was opened.
    pub fn open_calls(&self) -> usize {
        self.lock().open_calls
    }

    /// How many open/put/delete/clear/load calls were attempted.
    pub fn operations(&self) -> usize {
        self.lock().operations
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        state.operations += 1;
        if state.failing {
            return Err(CacheError::Persistence("durable store unavailable".to_string()));
        }
        Ok(state)
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn open(&mut self) -> Result<()> {
        self.begin()?.open_calls += 1;
        Ok(())
    }

    async fn put(&mut self, entry: PersistedEntry) -> Result<()> {
        self.begin()?.records.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete(&mut self, keys: &[String]) -> Result<()> {
        let mut state = self.begin()?;
        for key in keys {
            state.records.remove(key);
        }
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        self.begin()?.records.clear();
        Ok(())
    }

    async fn load_all(&mut self) -> Result<Vec<PersistedEntry>> {
        Ok(self.begin()?.records.values().cloned().collect())
    }
}
