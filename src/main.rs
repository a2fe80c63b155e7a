// =============================================================================
// Overlay Engine Main Entry Point
// =============================================================================
//
// Serves technical-indicator overlays and parameter optimization for the
// charting dashboard.  History comes from the configured chart provider
// through a time-bucketed fetch cache.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod error;
mod indicators;
mod market_data;
mod optimizer;
mod runtime_config;
mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::market_data::{CachedProvider, YahooProvider};
use crate::runtime_config::RuntimeConfig;

const CONFIG_PATH: &str = "runtime_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "overlay engine starting");

    let mut config = if Path::new(CONFIG_PATH).exists() {
        RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            RuntimeConfig::default()
        })
    } else {
        warn!(path = CONFIG_PATH, "No config file, seeding defaults");
        let config = RuntimeConfig::default();
        if let Err(e) = config.save(CONFIG_PATH) {
            warn!(error = %e, "Failed to seed config file");
        }
        config
    };
    config.apply_env_overrides();

    // ── 2. Market data provider ──────────────────────────────────────────
    let yahoo = YahooProvider::new(&config.provider)?;
    let provider = Arc::new(CachedProvider::new(yahoo, config.provider.cache_ttl_secs));
    info!(
        base_url = %config.provider.base_url,
        cache_ttl_secs = config.provider.cache_ttl_secs,
        "history provider ready"
    );

    // ── 3. API server ────────────────────────────────────────────────────
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config, provider));
    let app = api::rest::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")?;

    info!("overlay engine stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
