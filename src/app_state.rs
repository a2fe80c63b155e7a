// =============================================================================
// Central Application State
// =============================================================================
//
// Shared by every request handler through `Arc<AppState>`.  Indicator and
// optimizer code is stateless; the only long-lived pieces are the runtime
// configuration and the (caching) history provider.
//
// Thread safety:
//   - Atomic counters for lock-free request accounting.
//   - parking_lot::RwLock around the configuration.
//   - The provider manages its own interior mutability.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::market_data::HistoryProvider;
use crate::runtime_config::RuntimeConfig;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    /// Source of OHLCV history for the calculate and smart endpoints.
    pub provider: Arc<dyn HistoryProvider>,

    pub started_at: DateTime<Utc>,

    indicators_computed: AtomicU64,
    optimizations_run: AtomicU64,
}

impl AppState {
    pub fn new(config: RuntimeConfig, provider: Arc<dyn HistoryProvider>) -> Self {
        Self {
            runtime_config: Arc::new(RwLock::new(config)),
            provider,
            started_at: Utc::now(),
            indicators_computed: AtomicU64::new(0),
            optimizations_run: AtomicU64::new(0),
        }
    }

    /// Point-in-time copy of the configuration.  The lock is released before
    /// the caller does any I/O.
    pub fn config(&self) -> RuntimeConfig {
        self.runtime_config.read().clone()
    }

    pub fn record_indicator(&self) {
        self.indicators_computed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_optimization(&self) {
        self.optimizations_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn indicators_computed(&self) -> u64 {
        self.indicators_computed.load(Ordering::Relaxed)
    }

    pub fn optimizations_run(&self) -> u64 {
        self.optimizations_run.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::provider::test_support::StaticProvider;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let state = AppState::new(RuntimeConfig::default(), Arc::new(StaticProvider::new(None)));
        assert_eq!(state.indicators_computed(), 0);
        state.record_indicator();
        state.record_indicator();
        state.record_optimization();
        assert_eq!(state.indicators_computed(), 2);
        assert_eq!(state.optimizations_run(), 1);
        assert!(state.uptime_secs() >= 0);
    }

    #[test]
    fn config_snapshot_is_detached() {
        let state = AppState::new(RuntimeConfig::default(), Arc::new(StaticProvider::new(None)));
        let mut snap = state.config();
        snap.bind_addr = "127.0.0.1:1".to_string();
        assert_eq!(state.config().bind_addr, "0.0.0.0:8000");
    }
}
