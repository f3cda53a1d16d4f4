//! Memory Monitor Task
//!
//! Periodically recomputes aggregate memory usage and runs an eviction pass
//! when the budget is exceeded. The same check also runs after every `set`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::{CacheStore, Clock};
use crate::config::SharedConfig;

// == Memory Report ==
/// Outcome of one memory check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryReport {
    /// Expired entries dropped before measuring
    pub expired: usize,
    /// Keys removed by the eviction pass
    pub evicted: Vec<String>,
    /// Usage after the check, in bytes
    pub memory_usage: usize,
}

// == Memory Monitor ==
/// Memory-pressure check over a shared store.
#[derive(Debug, Clone)]
pub struct MemoryMonitor {
    store: Arc<RwLock<CacheStore>>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
}

impl MemoryMonitor {
    pub fn new(
        store: Arc<RwLock<CacheStore>>,
        config: SharedConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    // == Check ==
    /// Drops expired entries, recomputes usage and evicts once if over budget.
    pub async fn check(&self) -> MemoryReport {
        let max_memory_usage = self.config.get().max_memory_usage_bytes;
        let now = self.clock.now_ms();

        let mut store = self.store.write().await;
        let expired = store.purge_expired(now);
        let evicted = store.evict(max_memory_usage, now);
        let memory_usage = store.recompute_memory_usage();

        if !evicted.is_empty() {
            info!(
                evicted = evicted.len(),
                memory_usage, max_memory_usage, "Memory budget exceeded, evicted entries"
            );
        }

        MemoryReport {
            expired,
            evicted,
            memory_usage,
        }
    }

    // == Schedule ==
    /// Runs one check in the background without waiting for it.
    pub fn schedule_check(&self) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let monitor = self.clone();
            handle.spawn(async move {
                monitor.check().await;
            });
        }
    }

    // == Spawn ==
    /// Spawns the periodic monitor task.
    ///
    /// The first check runs one full `interval` after spawning. The caller
    /// owns the returned handle and must abort it on teardown.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Starting memory monitor with interval of {} ms",
                interval.as_millis()
            );

            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let report = self.check().await;
                debug!(
                    memory_usage = report.memory_usage,
                    expired = report.expired,
                    evicted = report.evicted.len(),
                    "Memory check complete"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FrequencyRecencyPolicy, ManualClock, MetricsRecorder, SizeEstimator};
    use crate::config::{CacheConfig, CacheConfigUpdate};
    use crate::error::Result;
    use serde_json::{json, Value};

    #[derive(Debug)]
    struct FixedEstimator(usize);

    impl SizeEstimator for FixedEstimator {
        fn estimate(&self, _value: &Value) -> Result<usize> {
            Ok(self.0)
        }
    }

    struct Fixture {
        monitor: MemoryMonitor,
        store: Arc<RwLock<CacheStore>>,
        metrics: Arc<MetricsRecorder>,
        clock: ManualClock,
        config: SharedConfig,
    }

    fn fixture(max_memory_usage_bytes: usize) -> Fixture {
        let metrics = Arc::new(MetricsRecorder::new());
        let store = Arc::new(RwLock::new(CacheStore::new(
            metrics.clone(),
            Arc::new(FixedEstimator(300)),
            Arc::new(FrequencyRecencyPolicy),
        )));
        let clock = ManualClock::new(1_000_000);
        let config = SharedConfig::new(CacheConfig {
            max_memory_usage_bytes,
            ..CacheConfig::default()
        });
        let monitor = MemoryMonitor::new(store.clone(), config.clone(), Arc::new(clock.clone()));
        Fixture {
            monitor,
            store,
            metrics,
            clock,
            config,
        }
    }

    #[tokio::test]
    async fn test_check_within_budget() {
        let f = fixture(1_000);
        f.store.write().await.set("a", json!(1), 60_000, f.clock.now_ms());

        let report = f.monitor.check().await;

        assert!(report.evicted.is_empty());
        assert_eq!(report.memory_usage, 300);
        assert!(f.metrics.snapshot().last_cleanup.is_none());
    }

    #[tokio::test]
    async fn test_check_evicts_least_used_entries() {
        let f = fixture(1_000);
        {
            let mut store = f.store.write().await;
            for key in ["a", "b", "c", "d", "e"] {
                store.set(key, json!(key), 60_000, f.clock.now_ms());
            }
            f.clock.advance(500);
            for key in ["c", "d", "e"] {
                store.get(key, f.clock.now_ms());
            }
        }
        f.clock.advance(500);

        let mut report = f.monitor.check().await;
        report.evicted.sort();

        assert_eq!(report.evicted, vec!["a".to_string(), "b".to_string()]);
        assert!(report.memory_usage <= 1_000);
        assert_eq!(f.metrics.snapshot().last_cleanup, Some(f.clock.now_ms()));
    }

    #[tokio::test]
    async fn test_check_purges_expired_first() {
        let f = fixture(1_000);
        {
            let mut store = f.store.write().await;
            for key in ["a", "b", "c", "d"] {
                store.set(key, json!(key), 100, f.clock.now_ms());
            }
        }
        f.clock.advance(200);

        let report = f.monitor.check().await;

        assert_eq!(report.expired, 4);
        assert!(report.evicted.is_empty());
        assert_eq!(report.memory_usage, 0);
    }

    #[tokio::test]
    async fn test_check_reads_latest_budget() {
        let f = fixture(10_000);
        {
            let mut store = f.store.write().await;
            for key in ["a", "b", "c"] {
                store.set(key, json!(key), 60_000, f.clock.now_ms());
            }
        }
        assert!(f.monitor.check().await.evicted.is_empty());

        f.config.update(CacheConfigUpdate {
            max_memory_usage_bytes: Some(500),
            ..Default::default()
        });

        let report = f.monitor.check().await;
        assert_eq!(report.evicted.len(), 2);
        assert_eq!(report.memory_usage, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_converges() {
        let f = fixture(1_000);
        {
            let mut store = f.store.write().await;
            for key in ["a", "b", "c", "d", "e"] {
                store.set(key, json!(key), 60_000, f.clock.now_ms());
            }
        }
        let handle = f.monitor.clone().spawn(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(f.store.read().await.len(), 5);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(f.metrics.memory_usage() <= 1_000);
        assert_eq!(f.store.read().await.len(), 3);

        handle.abort();
    }

    #[tokio::test]
    async fn test_monitor_task_can_be_aborted() {
        let f = fixture(1_000);

        let handle = f.monitor.clone().spawn(Duration::from_millis(10));
        handle.abort();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
