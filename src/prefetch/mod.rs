//! Prefetch Module
//!
//! Navigation-driven prediction of which keys will be needed next, and the
//! batched queue that fetches them ahead of time.

mod navigation;
mod scheduler;

pub use navigation::{
    prefetch_priority, NavigationPattern, NavigationTracker, MAX_PREFETCH_CANDIDATES,
    PRIORITY_THRESHOLD, RECENCY_WINDOW_MS,
};
pub use scheduler::{
    FnFetcher, KeyFetcher, PrefetchScheduler, PrefetchSink, PREFETCH_BATCH_DELAY,
    PREFETCH_BATCH_SIZE, PREFETCH_TTL_MS,
};
