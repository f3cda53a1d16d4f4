//! Adaptive Cache - A memory-bounded in-process cache
//!
//! Provides TTL expiration, frequency/recency-weighted eviction, best-effort
//! offline mirroring and navigation-driven prefetching.

pub mod cache;
pub mod config;
pub mod error;
pub mod facade;
pub mod persistence;
pub mod prefetch;
pub mod tasks;

pub use cache::{CacheMetrics, Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CacheConfigUpdate, Config};
pub use error::{CacheError, Result};
pub use facade::{AdaptiveCache, AdaptiveCacheBuilder, CacheKeys};
