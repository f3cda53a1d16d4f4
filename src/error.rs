//! Error types for the adaptive cache
//!
//! Provides unified error handling using thiserror. Most of these errors never
//! reach a caller: size, persistence and background prefetch failures are
//! logged where they happen and the cache carries on.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A value could not be measured
    #[error("Size computation failed: {0}")]
    SizeComputation(String),

    /// Durable store open/write/delete failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A fetch function failed while prefetching or warming
    #[error("Fetch failed for key '{key}': {message}")]
    Fetch { key: String, message: String },

    /// Conversion between a typed value and its JSON form failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error from a durable store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
