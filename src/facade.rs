//! Adaptive Cache Facade
//!
//! Public surface composing the store, memory monitor, persistence bridge,
//! navigation tracker and prefetch scheduler into one explicitly constructed
//! object.
//!
//! # Lifecycle
//! Build with [`AdaptiveCache::builder`] inside a tokio runtime, then call
//! [`AdaptiveCache::dispose`] on teardown to stop the memory monitor and
//! drain pending durable writes.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheMetrics, CacheStore, Clock, EvictionPolicy, FrequencyRecencyPolicy, JsonSizeEstimator,
    MetricsRecorder, SizeEstimator, SystemClock,
};
use crate::config::{CacheConfig, CacheConfigUpdate, SharedConfig, DEFAULT_MONITOR_INTERVAL_MS};
use crate::error::Result;
use crate::persistence::{DurableStore, PersistedEntry, PersistenceBridge};
use crate::prefetch::{
    KeyFetcher, NavigationPattern, NavigationTracker, PrefetchScheduler, PrefetchSink,
    PREFETCH_TTL_MS,
};
use crate::tasks::{MemoryMonitor, MemoryReport};

// == Cache Keys ==
/// One key or a list of keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheKeys(pub Vec<String>);

impl From<&str> for CacheKeys {
    fn from(key: &str) -> Self {
        Self(vec![key.to_string()])
    }
}

impl From<String> for CacheKeys {
    fn from(key: String) -> Self {
        Self(vec![key])
    }
}

impl From<Vec<String>> for CacheKeys {
    fn from(keys: Vec<String>) -> Self {
        Self(keys)
    }
}

impl From<Vec<&str>> for CacheKeys {
    fn from(keys: Vec<&str>) -> Self {
        Self(keys.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for CacheKeys {
    fn from(keys: &[&str]) -> Self {
        Self(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CacheKeys {
    fn from(keys: [&str; N]) -> Self {
        Self(keys.iter().map(|k| k.to_string()).collect())
    }
}

// == Cache Core ==
/// State shared with background tasks.
#[derive(Debug)]
struct CacheCore {
    store: Arc<RwLock<CacheStore>>,
    config: SharedConfig,
    metrics: Arc<MetricsRecorder>,
    clock: Arc<dyn Clock>,
    persistence: Option<PersistenceBridge>,
    monitor: MemoryMonitor,
}

impl CacheCore {
    async fn insert(&self, key: &str, data: Value, ttl: Option<i64>) {
        let config = self.config.get();
        let ttl = ttl.unwrap_or(config.default_ttl_ms);
        let now = self.clock.now_ms();

        {
            // queue the mirror write under the store lock so durable order
            // matches memory order
            let mut store = self.store.write().await;
            let entry = store.set(key, data, ttl, now);
            if config.enable_offline {
                if let Some(persistence) = &self.persistence {
                    persistence.put(PersistedEntry::from_entry(key, &entry));
                }
            }
        }
        self.monitor.schedule_check();
    }

    /// Persistence bridge, only while offline mirroring is enabled.
    fn offline(&self) -> Option<&PersistenceBridge> {
        self.persistence
            .as_ref()
            .filter(|_| self.config.get().enable_offline)
    }
}

#[async_trait]
impl PrefetchSink for CacheCore {
    async fn store_prefetched(&self, key: &str, value: Value) {
        self.insert(key, value, Some(PREFETCH_TTL_MS)).await;
        self.metrics.record_prefetch();
        debug!(key, "Stored prefetched value");
    }
}

// == Adaptive Cache ==
/// Memory-bounded cache with TTL expiry, adaptive eviction, offline
/// mirroring and navigation-driven prefetching.
#[derive(Debug)]
pub struct AdaptiveCache {
    core: Arc<CacheCore>,
    tracker: Mutex<NavigationTracker>,
    scheduler: Option<Arc<PrefetchScheduler>>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl AdaptiveCache {
    /// Starts building a cache with the given initial config.
    pub fn builder(config: CacheConfig) -> AdaptiveCacheBuilder {
        AdaptiveCacheBuilder::new(config)
    }

    // == Get ==
    /// Retrieves and deserializes a value.
    ///
    /// Returns `Ok(None)` on a miss; an error only if the stored value does
    /// not deserialize into `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_value(key).await {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Retrieves the raw JSON value stored under `key`.
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        let now = self.core.clock.now_ms();
        self.core.store.write().await.get(key, now)
    }

    // == Set ==
    /// Serializes and stores a value with an optional TTL in milliseconds.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        ttl: Option<i64>,
    ) -> Result<()> {
        let value = serde_json::to_value(data)?;
        self.set_value(key, value, ttl).await;
        Ok(())
    }

    /// Stores a raw JSON value. The memory check and durable mirror run in
    /// the background.
    pub async fn set_value(&self, key: &str, data: Value, ttl: Option<i64>) {
        self.core.insert(key, data, ttl).await;
    }

    // == Invalidate ==
    /// Removes one or more keys from memory and the durable mirror.
    pub async fn invalidate(&self, keys: impl Into<CacheKeys>) {
        let CacheKeys(keys) = keys.into();
        let mut store = self.core.store.write().await;
        for key in &keys {
            store.remove(key);
        }
        if let Some(persistence) = self.core.offline() {
            persistence.delete(keys);
        }
    }

    // == Clear ==
    /// Empties the cache and zeroes memory usage. Hit, miss and prefetch
    /// counters are kept.
    pub async fn clear(&self) {
        {
            let mut store = self.core.store.write().await;
            store.clear();
            if let Some(persistence) = self.core.offline() {
                persistence.clear();
            }
        }
        info!("Cache cleared");
    }

    // == Prefetch ==
    /// Runs `fetcher` and stores its result for [`PREFETCH_TTL_MS`].
    ///
    /// Failures are logged and leave the key uncached. No-op while
    /// prefetching is disabled.
    pub async fn prefetch<F, Fut, T, E>(&self, key: &str, fetcher: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        T: Serialize,
        E: Display,
    {
        if !self.core.config.get().enable_prefetch {
            debug!(key, "Prefetch disabled, skipping");
            return;
        }

        match fetcher().await {
            Ok(data) => match serde_json::to_value(data) {
                Ok(value) => self.core.store_prefetched(key, value).await,
                Err(e) => warn!(key, error = %e, "Prefetched value could not be serialized"),
            },
            Err(e) => warn!(key, error = %e, "Prefetch failed"),
        }
    }

    // == Warm Cache ==
    /// Queues `keys` for fetching through the configured [`KeyFetcher`] and
    /// runs the first batch. No-op when warming is disabled.
    pub async fn warm_cache(&self, keys: impl Into<CacheKeys>) {
        if !self.core.config.get().enable_warming {
            debug!("Cache warming disabled, skipping");
            return;
        }
        let Some(scheduler) = &self.scheduler else {
            warn!("Cache warming requested without a key fetcher");
            return;
        };

        let CacheKeys(keys) = keys.into();
        let queued = keys.into_iter().filter(|key| scheduler.enqueue(key.as_str())).count();
        info!(queued, "Warming cache");
        Arc::clone(scheduler).process_queue().await;
    }

    // == Track Navigation ==
    /// Records a visit to `route` and queues the current prefetch candidates
    /// that are not already cached.
    pub fn track_navigation(&self, route: &str) {
        let now = self.core.clock.now_ms();
        let candidates = {
            let mut tracker = self.lock_tracker();
            tracker.track(route, now);
            tracker.prefetch_candidates()
        };

        if !self.core.config.get().enable_prefetch {
            return;
        }
        let Some(scheduler) = &self.scheduler else {
            return;
        };

        let store = self.core.store.try_read().ok();
        let queued = candidates
            .into_iter()
            .filter(|key| !store.as_ref().is_some_and(|s| s.is_fresh(key, now)))
            .filter(|key| scheduler.enqueue(key.as_str()))
            .count();
        drop(store);

        if queued > 0 {
            debug!(route, queued, "Queued navigation prefetch");
            scheduler.kick();
        }
    }

    /// Current prefetch candidates, highest priority first.
    pub fn prefetch_candidates(&self) -> Vec<String> {
        self.lock_tracker().prefetch_candidates()
    }

    /// Recorded statistics for `route`.
    pub fn navigation_pattern(&self, route: &str) -> Option<NavigationPattern> {
        self.lock_tracker().pattern(route).cloned()
    }

    // == Metrics ==
    /// Detached snapshot of the cache metrics.
    pub fn get_metrics(&self) -> CacheMetrics {
        self.core.metrics.snapshot()
    }

    /// Memory usage in bytes as of the last recomputation.
    pub fn get_memory_usage(&self) -> usize {
        self.core.metrics.memory_usage()
    }

    // == Config ==
    /// Shallow-merges `update` into the config; applies to later operations.
    pub fn update_config(&self, update: CacheConfigUpdate) {
        self.core.config.update(update);
        debug!(config = ?self.core.config.get(), "Cache config updated");
    }

    /// Copy of the current config.
    pub fn config(&self) -> CacheConfig {
        self.core.config.get()
    }

    // == Memory Check ==
    /// Runs a memory check now instead of waiting for the monitor.
    pub async fn check_memory(&self) -> MemoryReport {
        self.core.monitor.check().await
    }

    // == Restore ==
    /// Loads unexpired entries from the durable store into memory.
    ///
    /// Keys already present in memory are left untouched. Returns the number
    /// of entries restored (0 when offline mirroring is disabled).
    pub async fn restore(&self) -> usize {
        let Some(persistence) = self.core.offline() else {
            return 0;
        };

        let records = persistence.load().await;
        let now = self.core.clock.now_ms();
        let restored = {
            let mut store = self.core.store.write().await;
            let mut restored = 0;
            for record in records {
                let (key, entry) = record.into_entry();
                if entry.is_expired(now) || store.peek(&key).is_some() {
                    continue;
                }
                store.insert_entry(key, entry);
                restored += 1;
            }
            restored
        };

        info!(restored, "Restored entries from durable store");
        self.core.monitor.check().await;
        restored
    }

    /// Waits until every durable write queued so far was applied.
    pub async fn flush_persistence(&self) {
        if let Some(persistence) = &self.core.persistence {
            persistence.flush().await;
        }
    }

    // == Dispose ==
    /// Stops the memory monitor and prefetching, then drains and stops the
    /// persistence worker.
    pub async fn dispose(&self) {
        if let Some(handle) = self.lock_monitor().take() {
            handle.abort();
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop();
        }
        if let Some(persistence) = &self.core.persistence {
            persistence.shutdown().await;
        }
        info!("Cache disposed");
    }

    fn lock_tracker(&self) -> MutexGuard<'_, NavigationTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_monitor(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.monitor_task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AdaptiveCache {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_monitor().take() {
            handle.abort();
        }
    }
}

// == Builder ==
/// Wires an [`AdaptiveCache`] from injectable parts.
pub struct AdaptiveCacheBuilder {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    estimator: Arc<dyn SizeEstimator>,
    policy: Arc<dyn EvictionPolicy>,
    durable_store: Option<Box<dyn DurableStore>>,
    fetcher: Option<Arc<dyn KeyFetcher>>,
    monitor_interval: Option<Duration>,
}

impl AdaptiveCacheBuilder {
    fn new(config: CacheConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            estimator: Arc::new(JsonSizeEstimator),
            policy: Arc::new(FrequencyRecencyPolicy),
            durable_store: None,
            fetcher: None,
            monitor_interval: Some(Duration::from_millis(DEFAULT_MONITOR_INTERVAL_MS)),
        }
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn size_estimator(mut self, estimator: impl SizeEstimator + 'static) -> Self {
        self.estimator = Arc::new(estimator);
        self
    }

    pub fn eviction_policy(mut self, policy: impl EvictionPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Durable store used for offline mirroring. Without one, offline
    /// mirroring is inert regardless of `enable_offline`.
    pub fn durable_store(mut self, store: impl DurableStore + 'static) -> Self {
        self.durable_store = Some(Box::new(store));
        self
    }

    /// Fetch function used by navigation prefetching and warming.
    pub fn fetcher(mut self, fetcher: impl KeyFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Period of the background memory monitor.
    pub fn monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = Some(interval);
        self
    }

    /// Disables the background memory monitor; checks then only run after
    /// `set` or through [`AdaptiveCache::check_memory`].
    pub fn without_monitor(mut self) -> Self {
        self.monitor_interval = None;
        self
    }

    // == Build ==
    /// Builds the cache and spawns its background tasks on the current
    /// tokio runtime.
    pub fn build(self) -> AdaptiveCache {
        let metrics = Arc::new(MetricsRecorder::new());
        let store = Arc::new(RwLock::new(CacheStore::new(
            Arc::clone(&metrics),
            self.estimator,
            self.policy,
        )));
        let config = SharedConfig::new(self.config);
        let monitor =
            MemoryMonitor::new(Arc::clone(&store), config.clone(), Arc::clone(&self.clock));
        let persistence = self.durable_store.map(PersistenceBridge::spawn);

        let core = Arc::new(CacheCore {
            store,
            config,
            metrics,
            clock: self.clock,
            persistence,
            monitor: monitor.clone(),
        });

        let scheduler = self.fetcher.map(|fetcher| {
            let sink: Arc<dyn PrefetchSink> = core.clone();
            PrefetchScheduler::new(fetcher, sink)
        });
        let monitor_task = self.monitor_interval.map(|interval| monitor.spawn(interval));

        AdaptiveCache {
            core,
            tracker: Mutex::new(NavigationTracker::new()),
            scheduler,
            monitor_task: Mutex::new(monitor_task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::error::CacheError;
    use crate::persistence::InMemoryDurableStore;
    use crate::prefetch::FnFetcher;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ticket {
        id: u32,
        subject: String,
    }

    fn build(clock: &ManualClock) -> AdaptiveCache {
        AdaptiveCache::builder(CacheConfig::default())
            .clock(clock.clone())
            .without_monitor()
            .build()
    }

    #[test]
    fn test_cache_keys_conversions() {
        assert_eq!(CacheKeys::from("a").0, vec!["a".to_string()]);
        assert_eq!(CacheKeys::from(["a", "b"]).0.len(), 2);
        assert_eq!(CacheKeys::from(vec!["a".to_string()]).0, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let clock = ManualClock::new(0);
        let cache = build(&clock);
        let ticket = Ticket {
            id: 7,
            subject: "Refund".to_string(),
        };

        cache.set("ticket:7", &ticket, None).await.unwrap();

        assert_eq!(cache.get::<Ticket>("ticket:7").await.unwrap(), Some(ticket));
    }

    #[tokio::test]
    async fn test_get_type_mismatch_is_error() {
        let clock = ManualClock::new(0);
        let cache = build(&clock);

        cache.set("n", &42, None).await.unwrap();

        assert!(matches!(
            cache.get::<Ticket>("n").await,
            Err(CacheError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_default_ttl_from_config() {
        let clock = ManualClock::new(0);
        let cache = build(&clock);
        cache.update_config(CacheConfigUpdate {
            default_ttl_ms: Some(500),
            ..Default::default()
        });

        cache.set_value("a", json!(1), None).await;
        clock.advance(501);

        assert!(cache.get_value("a").await.is_none());
    }

    #[tokio::test]
    async fn test_config_change_not_retroactive() {
        let clock = ManualClock::new(0);
        let cache = build(&clock);

        cache.set_value("a", json!(1), None).await;
        cache.update_config(CacheConfigUpdate {
            default_ttl_ms: Some(10),
            ..Default::default()
        });
        clock.advance(1_000);

        assert_eq!(cache.get_value("a").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_non_positive_ttl_is_expired() {
        let clock = ManualClock::new(0);
        let cache = build(&clock);

        cache.set_value("neg", json!(1), Some(-1)).await;

        assert!(cache.get_value("neg").await.is_none());
        assert_eq!(cache.get_metrics().misses, 1);
    }

    #[tokio::test]
    async fn test_prefetch_uses_fixed_ttl() {
        let clock = ManualClock::new(0);
        let cache = build(&clock);

        cache
            .prefetch("/inbox", || async { Ok::<_, CacheError>(json!(["t1", "t2"])) })
            .await;

        assert_eq!(cache.get_metrics().prefetch_count, 1);
        clock.advance(PREFETCH_TTL_MS as u64);
        assert!(cache.get_value("/inbox").await.is_some());
        clock.advance(1);
        assert!(cache.get_value("/inbox").await.is_none());
    }

    #[tokio::test]
    async fn test_prefetch_failure_is_swallowed() {
        let clock = ManualClock::new(0);
        let cache = build(&clock);

        cache
            .prefetch("/inbox", || async { Err::<Value, _>("network down") })
            .await;

        assert!(cache.get_value("/inbox").await.is_none());
        assert_eq!(cache.get_metrics().prefetch_count, 0);
    }

    #[tokio::test]
    async fn test_prefetch_disabled_skips_fetcher() {
        let clock = ManualClock::new(0);
        let cache = build(&clock);
        cache.update_config(CacheConfigUpdate {
            enable_prefetch: Some(false),
            ..Default::default()
        });

        let mut called = false;
        cache
            .prefetch("/inbox", || {
                called = true;
                async { Ok::<_, CacheError>(json!(1)) }
            })
            .await;

        assert!(!called);
    }

    #[tokio::test]
    async fn test_warm_cache_without_fetcher_is_noop() {
        let clock = ManualClock::new(0);
        let cache = build(&clock);

        cache.warm_cache(["a", "b"]).await;

        assert_eq!(cache.get_metrics().prefetch_count, 0);
    }

    #[tokio::test]
    async fn test_warm_cache_disabled() {
        let cache = AdaptiveCache::builder(CacheConfig {
            enable_warming: false,
            ..CacheConfig::default()
        })
        .without_monitor()
        .fetcher(FnFetcher(|key: String| async move { Ok::<_, CacheError>(json!(key)) }))
        .build();

        cache.warm_cache(["a"]).await;

        assert!(cache.get_value("a").await.is_none());
    }

    #[tokio::test]
    async fn test_restore_skips_expired_and_existing() {
        let clock = ManualClock::new(10_000);
        let durable = InMemoryDurableStore::new();
        let record = |key: &str, timestamp: u64| PersistedEntry {
            key: key.to_string(),
            data: json!(key),
            timestamp,
            ttl: 1_000,
            size: 3,
            access_count: 2,
            last_accessed: timestamp,
        };
        durable.insert(record("fresh", 9_500));
        durable.insert(record("stale", 1_000));
        durable.insert(record("live", 9_900));

        let cache = AdaptiveCache::builder(CacheConfig::default())
            .clock(clock.clone())
            .durable_store(durable.clone())
            .without_monitor()
            .build();
        cache.set_value("live", json!("in memory"), None).await;

        assert_eq!(cache.restore().await, 1);
        assert_eq!(cache.get_value("fresh").await, Some(json!("fresh")));
        assert!(cache.get_value("stale").await.is_none());
        assert_eq!(cache.get_value("live").await, Some(json!("in memory")));
        cache.dispose().await;
    }

    #[tokio::test]
    async fn test_dispose_stops_monitor() {
        let cache = AdaptiveCache::builder(CacheConfig::default())
            .monitor_interval(Duration::from_millis(10))
            .build();

        cache.dispose().await;

        assert!(cache.lock_monitor().is_none());
    }
}
