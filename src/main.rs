//! Adaptive Cache - demo host
//!
//! Runs a cache the way a dashboard process would: restores the offline
//! mirror, replays a short navigation session against a stub fetcher, reports
//! metrics and keeps the cache alive until shutdown.

use std::time::Duration;

use anyhow::Context;
use serde_json::{json, Value};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adaptive_cache::persistence::JsonFileStore;
use adaptive_cache::prefetch::FnFetcher;
use adaptive_cache::{AdaptiveCache, CacheError, Config};

/// Main entry point for the demo host.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the cache with the file-backed offline mirror
/// 4. Restore offline entries and replay a navigation session
/// 5. Wait for SIGINT/SIGTERM, then dispose the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adaptive_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting adaptive cache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_memory={}B, default_ttl={}ms, monitor_interval={}ms, \
         offline_path={}",
        config.cache.max_memory_usage_bytes,
        config.cache.default_ttl_ms,
        config.monitor_interval_ms,
        config.offline_path.display()
    );

    let cache = AdaptiveCache::builder(config.cache.clone())
        .durable_store(JsonFileStore::new(&config.offline_path))
        .fetcher(FnFetcher(fetch_route))
        .monitor_interval(Duration::from_millis(config.monitor_interval_ms))
        .build();

    let restored = cache.restore().await;
    info!("Restored {} entries from offline mirror", restored);

    cache
        .set("user:preferences", &json!({ "theme": "dark", "density": "compact" }), None)
        .await
        .context("storing user preferences")?;

    for route in ["/inbox", "/inbox", "/analytics", "/inbox", "/settings"] {
        cache.track_navigation(route);
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    cache.warm_cache(["/contacts", "/reports/weekly"]).await;
    cache.flush_persistence().await;

    let metrics = cache.get_metrics();
    info!(
        "Metrics: hits={}, misses={}, prefetched={}, entries={}, memory={}B, hit_rate={:.2}",
        metrics.hits,
        metrics.misses,
        metrics.prefetch_count,
        metrics.entry_count,
        cache.get_memory_usage(),
        metrics.hit_rate()
    );
    info!("Prefetch candidates: {:?}", cache.prefetch_candidates());

    shutdown_signal().await;

    cache.dispose().await;
    info!("Shutdown complete");
    Ok(())
}

/// Stub data source standing in for the dashboard's backend.
async fn fetch_route(key: String) -> adaptive_cache::Result<Value> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    match key.as_str() {
        "/inbox" => Ok(json!({ "conversations": [
            { "id": 1, "customer": "Ada", "status": "open" },
            { "id": 2, "customer": "Grace", "status": "pending" }
        ]})),
        "/analytics" => Ok(json!({ "response_time_p50_s": 42, "csat": 4.6 })),
        "/contacts" => Ok(json!({ "contacts": ["Ada", "Grace", "Linus"] })),
        "/reports/weekly" => Ok(json!({ "resolved": 128, "escalated": 3 })),
        _ => Err(CacheError::Fetch {
            key,
            message: "no such resource".to_string(),
        }),
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
