//! Configuration Module
//!
//! Runtime cache configuration plus loading of process configuration from
//! environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Default TTL for entries stored without an explicit TTL (5 minutes)
pub const DEFAULT_TTL_MS: i64 = 5 * 60 * 1000;

/// Default memory budget (50 MiB)
pub const DEFAULT_MAX_MEMORY_BYTES: usize = 50 * 1024 * 1024;

/// Default memory monitor period (30 seconds)
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 30_000;

// == Cache Config ==
/// Cache behaviour that can be changed while the cache is running.
///
/// Updates only affect subsequent operations; existing entries keep the TTL
/// they were stored with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL in milliseconds applied when `set` gets no explicit TTL
    pub default_ttl_ms: i64,
    /// Memory budget in bytes
    pub max_memory_usage_bytes: usize,
    /// Mirror entries into the durable store
    pub enable_offline: bool,
    /// Prefetch predicted routes on navigation
    pub enable_prefetch: bool,
    /// Allow bulk warming
    pub enable_warming: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
            max_memory_usage_bytes: DEFAULT_MAX_MEMORY_BYTES,
            enable_offline: true,
            enable_prefetch: true,
            enable_warming: true,
        }
    }
}

impl CacheConfig {
    // == Apply Update ==
    /// Shallow-merges the fields set in `update` into this config.
    pub fn apply(&mut self, update: CacheConfigUpdate) {
        if let Some(ttl) = update.default_ttl_ms {
            self.default_ttl_ms = ttl;
        }
        if let Some(max) = update.max_memory_usage_bytes {
            self.max_memory_usage_bytes = max;
        }
        if let Some(flag) = update.enable_offline {
            self.enable_offline = flag;
        }
        if let Some(flag) = update.enable_prefetch {
            self.enable_prefetch = flag;
        }
        if let Some(flag) = update.enable_warming {
            self.enable_warming = flag;
        }
    }
}

// == Cache Config Update ==
/// Partial [`CacheConfig`]; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfigUpdate {
    pub default_ttl_ms: Option<i64>,
    pub max_memory_usage_bytes: Option<usize>,
    pub enable_offline: Option<bool>,
    pub enable_prefetch: Option<bool>,
    pub enable_warming: Option<bool>,
}

// == Shared Config ==
/// Single runtime [`CacheConfig`] shared by the cache and its background tasks.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<CacheConfig>>,
}

impl SharedConfig {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Returns a copy of the current config.
    pub fn get(&self) -> CacheConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merges `update` into the current config.
    pub fn update(&self, update: CacheConfigUpdate) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(update);
    }
}

// == Process Config ==
/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Initial runtime cache configuration
    pub cache: CacheConfig,
    /// Memory monitor period in milliseconds
    pub monitor_interval_ms: u64,
    /// File backing the offline mirror
    pub offline_path: PathBuf,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `CACHE_MAX_MEMORY_BYTES` - Memory budget in bytes (default: 52428800)
    /// - `CACHE_ENABLE_OFFLINE` - Mirror entries to disk (default: true)
    /// - `CACHE_ENABLE_PREFETCH` - Navigation prefetching (default: true)
    /// - `CACHE_ENABLE_WARMING` - Bulk warming (default: true)
    /// - `CACHE_MONITOR_INTERVAL_MS` - Memory check period (default: 30000)
    /// - `CACHE_OFFLINE_PATH` - Offline mirror file (default: adaptive_cache.json)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache: CacheConfig {
                default_ttl_ms: env_or("CACHE_DEFAULT_TTL_MS", defaults.cache.default_ttl_ms),
                max_memory_usage_bytes: env_or(
                    "CACHE_MAX_MEMORY_BYTES",
                    defaults.cache.max_memory_usage_bytes,
                ),
                enable_offline: env_or("CACHE_ENABLE_OFFLINE", defaults.cache.enable_offline),
                enable_prefetch: env_or("CACHE_ENABLE_PREFETCH", defaults.cache.enable_prefetch),
                enable_warming: env_or("CACHE_ENABLE_WARMING", defaults.cache.enable_warming),
            },
            monitor_interval_ms: env_or("CACHE_MONITOR_INTERVAL_MS", defaults.monitor_interval_ms),
            offline_path: env::var("CACHE_OFFLINE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.offline_path),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            monitor_interval_ms: DEFAULT_MONITOR_INTERVAL_MS,
            offline_path: PathBuf::from("adaptive_cache.json"),
        }
    }
}

/// Parses an environment variable, falling back to `default` when unset or
/// malformed.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cache.default_ttl_ms, 300_000);
        assert_eq!(config.cache.max_memory_usage_bytes, 50 * 1024 * 1024);
        assert!(config.cache.enable_offline);
        assert!(config.cache.enable_prefetch);
        assert!(config.cache.enable_warming);
        assert_eq!(config.monitor_interval_ms, 30_000);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "CACHE_DEFAULT_TTL_MS",
            "CACHE_MAX_MEMORY_BYTES",
            "CACHE_ENABLE_OFFLINE",
            "CACHE_ENABLE_PREFETCH",
            "CACHE_ENABLE_WARMING",
            "CACHE_MONITOR_INTERVAL_MS",
            "CACHE_OFFLINE_PATH",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.monitor_interval_ms, 30_000);
        assert_eq!(config.offline_path, PathBuf::from("adaptive_cache.json"));
    }

    #[test]
    fn test_apply_partial_update() {
        let mut config = CacheConfig::default();

        config.apply(CacheConfigUpdate {
            default_ttl_ms: Some(1_000),
            enable_offline: Some(false),
            ..Default::default()
        });

        assert_eq!(config.default_ttl_ms, 1_000);
        assert!(!config.enable_offline);
        assert_eq!(config.max_memory_usage_bytes, DEFAULT_MAX_MEMORY_BYTES);
        assert!(config.enable_prefetch);
    }

    #[test]
    fn test_apply_empty_update_is_noop() {
        let mut config = CacheConfig::default();
        config.apply(CacheConfigUpdate::default());
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_shared_config_clones_see_updates() {
        let shared = SharedConfig::new(CacheConfig::default());
        let other = shared.clone();

        shared.update(CacheConfigUpdate {
            enable_warming: Some(false),
            ..Default::default()
        });

        assert!(!other.get().enable_warming);
    }

    #[test]
    fn test_update_deserializes_from_partial_json() {
        let update: CacheConfigUpdate =
            serde_json::from_str(r#"{"max_memory_usage_bytes": 1000}"#).unwrap();
        assert_eq!(update.max_memory_usage_bytes, Some(1000));
        assert!(update.enable_warming.is_none());
    }
}
