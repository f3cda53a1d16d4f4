//! Cache Module
//!
//! Provides in-memory caching with TTL expiration, size accounting and
//! frequency/recency-weighted eviction.

mod clock;
mod entry;
pub mod eviction;
mod metrics;
mod size;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use eviction::{EvictionPolicy, FrequencyRecencyPolicy};
pub use metrics::{CacheMetrics, MetricsRecorder};
pub use size::{JsonSizeEstimator, SizeEstimator};
pub use store::CacheStore;
