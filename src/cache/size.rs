//! Size Estimator Module
//!
//! Approximates the memory footprint of a cached value.

use serde_json::Value;

use crate::error::{CacheError, Result};

// == Size Estimator Trait ==
/// Computes an approximate byte size for a value.
pub trait SizeEstimator: Send + Sync + std::fmt::Debug {
    /// Returns the estimated size of `value` in bytes.
    fn estimate(&self, value: &Value) -> Result<usize>;
}

// == JSON Size Estimator ==
/// Measures a value by the length of its compact JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSizeEstimator;

impl SizeEstimator for JsonSizeEstimator {
    fn estimate(&self, value: &Value) -> Result<usize> {
        serde_json::to_vec(value)
            .map(|bytes| bytes.len())
            .map_err(|e| CacheError::SizeComputation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_estimate_string() {
        // quotes included
        assert_eq!(JsonSizeEstimator.estimate(&json!("abc")).unwrap(), 5);
    }

    #[test]
    fn test_estimate_object() {
        let size = JsonSizeEstimator.estimate(&json!({"v": 1})).unwrap();
        assert_eq!(size, r#"{"v":1}"#.len());
    }

    #[test]
    fn test_estimate_null() {
        assert_eq!(JsonSizeEstimator.estimate(&Value::Null).unwrap(), 4);
    }
}
