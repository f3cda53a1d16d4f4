//! Prefetch Scheduler
//!
//! Deduplicating work queue that fetches predicted keys in small batches.
//! Only one batch is in flight at a time; leftover keys are picked up by a
//! follow-up run scheduled after a short delay.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::Result;

/// Keys fetched per batch
pub const PREFETCH_BATCH_SIZE: usize = 3;

/// TTL of prefetched values (10 minutes), independent of the default TTL
pub const PREFETCH_TTL_MS: i64 = 10 * 60 * 1000;

/// Pause between consecutive batches
pub const PREFETCH_BATCH_DELAY: Duration = Duration::from_millis(100);

// == Key Fetcher ==
/// Loads the value for a cache key, typically over the network.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Value>;
}

/// [`KeyFetcher`] built from an async closure.
pub struct FnFetcher<F>(pub F);

#[async_trait]
impl<F, Fut> KeyFetcher for FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn fetch(&self, key: &str) -> Result<Value> {
        (self.0)(key.to_string()).await
    }
}

// == Prefetch Sink ==
/// Destination for successfully prefetched values.
#[async_trait]
pub trait PrefetchSink: Send + Sync {
    async fn store_prefetched(&self, key: &str, value: Value);
}

// == Pending Queue ==
/// FIFO with set semantics.
#[derive(Debug, Default)]
struct PendingQueue {
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl PendingQueue {
    fn push(&mut self, key: String) -> bool {
        if !self.members.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        true
    }

    fn take(&mut self, n: usize) -> Vec<String> {
        let count = n.min(self.order.len());
        let batch: Vec<String> = self.order.drain(..count).collect();
        for key in &batch {
            self.members.remove(key);
        }
        batch
    }

    fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

// == Prefetch Scheduler ==
pub struct PrefetchScheduler {
    queue: Mutex<PendingQueue>,
    processing: AtomicBool,
    stopped: AtomicBool,
    fetcher: Arc<dyn KeyFetcher>,
    sink: Arc<dyn PrefetchSink>,
}

impl std::fmt::Debug for PrefetchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchScheduler")
            .field("pending", &self.pending())
            .field("processing", &self.is_processing())
            .finish_non_exhaustive()
    }
}

impl PrefetchScheduler {
    pub fn new(fetcher: Arc<dyn KeyFetcher>, sink: Arc<dyn PrefetchSink>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(PendingQueue::default()),
            processing: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            fetcher,
            sink,
        })
    }

    // == Enqueue ==
    /// Adds `key` to the pending queue. Returns `false` if it was already
    /// pending or the scheduler is stopped.
    pub fn enqueue(&self, key: impl Into<String>) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        self.lock_queue().push(key.into())
    }

    /// Number of keys waiting to be fetched.
    pub fn pending(&self) -> usize {
        self.lock_queue().order.len()
    }

    /// True while a batch is in flight.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    // == Process Queue ==
    /// Runs one batch, then schedules the next one after
    /// [`PREFETCH_BATCH_DELAY`] if keys remain. Returns immediately if a
    /// batch is already running.
    pub fn process_queue(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            if self.processing.swap(true, Ordering::AcqRel) {
                return;
            }

            self.run_batch().await;
            self.processing.store(false, Ordering::Release);

            if self.pending() > 0 && !self.stopped.load(Ordering::Acquire) {
                let this = Arc::clone(&self);
                tokio::spawn(async move {
                    tokio::time::sleep(PREFETCH_BATCH_DELAY).await;
                    this.process_queue().await;
                });
            }
        })
    }

    // == Kick ==
    /// Starts processing in the background if a tokio runtime is available.
    pub fn kick(self: &Arc<Self>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(Arc::clone(self).process_queue());
            }
            Err(_) => warn!("No async runtime available, prefetch queue left pending"),
        }
    }

    // == Stop ==
    /// Drops pending keys and refuses new ones. A batch already in flight
    /// still completes.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.lock_queue().clear();
    }

    async fn run_batch(&self) {
        let batch = self.lock_queue().take(PREFETCH_BATCH_SIZE);
        if batch.is_empty() {
            return;
        }
        debug!(keys = ?batch, "Prefetching batch");

        let mut fetches = JoinSet::new();
        for key in batch {
            let fetcher = Arc::clone(&self.fetcher);
            fetches.spawn(async move {
                let result = fetcher.fetch(&key).await;
                (key, result)
            });
        }

        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((key, Ok(value))) => self.sink.store_prefetched(&key, value).await,
                Ok((key, Err(e))) => debug!(key = %key, error = %e, "Prefetch fetch failed"),
                Err(e) => warn!(error = %e, "Prefetch task aborted"),
            }
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, PendingQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    /// Records stored values.
    #[derive(Default)]
    struct RecordingSink {
        stored: Mutex<HashMap<String, Value>>,
    }

    #[async_trait]
    impl PrefetchSink for RecordingSink {
        async fn store_prefetched(&self, key: &str, value: Value) {
            self.stored.lock().unwrap().insert(key.to_string(), value);
        }
    }

    /// Counts calls per key; keys starting with "bad" fail.
    #[derive(Default)]
    struct CountingFetcher {
        calls: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
    }

    #[async_trait]
    impl KeyFetcher for CountingFetcher {
        async fn fetch(&self, key: &str) -> Result<Value> {
            self.total.fetch_add(1, Ordering::SeqCst);
            *self.calls.lock().unwrap().entry(key.to_string()).or_default() += 1;
            if key.starts_with("bad") {
                return Err(CacheError::Fetch {
                    key: key.to_string(),
                    message: "boom".to_string(),
                });
            }
            Ok(json!({ "key": key }))
        }
    }

    fn scheduler() -> (Arc<PrefetchScheduler>, Arc<CountingFetcher>, Arc<RecordingSink>) {
        let fetcher = Arc::new(CountingFetcher::default());
        let sink = Arc::new(RecordingSink::default());
        let scheduler = PrefetchScheduler::new(fetcher.clone(), sink.clone());
        (scheduler, fetcher, sink)
    }

    #[test]
    fn test_pending_queue_set_semantics() {
        let mut queue = PendingQueue::default();

        assert!(queue.push("a".to_string()));
        assert!(!queue.push("a".to_string()));
        assert!(queue.push("b".to_string()));

        assert_eq!(queue.take(5), vec!["a".to_string(), "b".to_string()]);
        // taken keys can be queued again
        assert!(queue.push("a".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_fetches_once() {
        let (scheduler, fetcher, sink) = scheduler();

        assert!(scheduler.enqueue("a"));
        assert!(!scheduler.enqueue("a"));
        scheduler.clone().process_queue().await;

        assert_eq!(fetcher.calls.lock().unwrap()["a"], 1);
        assert!(sink.stored.lock().unwrap().contains_key("a"));
    }

    #[tokio::test]
    async fn test_batch_limited_to_three() {
        let (scheduler, fetcher, _) = scheduler();

        for key in ["a", "b", "c", "d", "e"] {
            scheduler.enqueue(key);
        }
        scheduler.run_batch().await;

        assert_eq!(fetcher.total.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.pending(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_keys_processed_after_delay() {
        let (scheduler, fetcher, sink) = scheduler();

        for key in ["a", "b", "c", "d", "e"] {
            scheduler.enqueue(key);
        }
        scheduler.clone().process_queue().await;
        assert_eq!(fetcher.total.load(Ordering::SeqCst), 3);

        tokio::time::sleep(PREFETCH_BATCH_DELAY * 2).await;

        assert_eq!(fetcher.total.load(Ordering::SeqCst), 5);
        assert_eq!(sink.stored.lock().unwrap().len(), 5);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_discarded() {
        let (scheduler, fetcher, sink) = scheduler();

        scheduler.enqueue("bad-key");
        scheduler.enqueue("good-key");
        scheduler.clone().process_queue().await;

        assert_eq!(fetcher.total.load(Ordering::SeqCst), 2);
        let stored = sink.stored.lock().unwrap();
        assert!(stored.contains_key("good-key"));
        assert!(!stored.contains_key("bad-key"));
    }

    #[tokio::test]
    async fn test_reentrant_call_is_noop() {
        let (scheduler, fetcher, _) = scheduler();

        scheduler.enqueue("a");
        scheduler.processing.store(true, Ordering::SeqCst);
        scheduler.clone().process_queue().await;

        assert_eq!(fetcher.total.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn test_stop_clears_and_rejects() {
        let (scheduler, _, _) = scheduler();

        scheduler.enqueue("a");
        scheduler.stop();

        assert_eq!(scheduler.pending(), 0);
        assert!(!scheduler.enqueue("b"));
    }

    #[tokio::test]
    async fn test_fn_fetcher() {
        let fetcher = FnFetcher(|key: String| async move { Ok::<_, CacheError>(json!(key.len())) });
        assert_eq!(fetcher.fetch("abcd").await.unwrap(), json!(4));
    }
}
