// =============================================================================
// Runtime Configuration: engine settings with atomic save
// =============================================================================
//
// Every tunable lives here: where to listen, where history comes from, which
// provider windows each granularity maps to, and the optimizer's sweep grids.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_daily_window() -> FetchWindow {
    FetchWindow::new("2y", "1d")
}

fn default_intraday_window() -> FetchWindow {
    FetchWindow::new("5d", "5m")
}

fn default_long_window() -> FetchWindow {
    FetchWindow::new("5y", "1d")
}

fn default_long_lookback_days() -> u32 {
    700
}

// =============================================================================
// ProviderConfig
// =============================================================================

/// Market data provider connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Chart API root, without a trailing path.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Width of the fetch cache time bucket.  0 disables the cache.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

// =============================================================================
// HistoryConfig
// =============================================================================

/// One provider request window, e.g. two years of daily bars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub period: String,
    pub interval: String,
}

impl FetchWindow {
    pub fn new(period: &str, interval: &str) -> Self {
        Self {
            period: period.to_string(),
            interval: interval.to_string(),
        }
    }
}

/// Which window is fetched for a chart granularity or optimizer lookback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Window for `granularity = "days"`.
    #[serde(default = "default_daily_window")]
    pub daily: FetchWindow,

    /// Window for any other granularity.
    #[serde(default = "default_intraday_window")]
    pub intraday: FetchWindow,

    /// Optimizer window once the lookback reaches `long_lookback_days`.
    #[serde(default = "default_long_window")]
    pub long: FetchWindow,

    #[serde(default = "default_long_lookback_days")]
    pub long_lookback_days: u32,
}

impl HistoryConfig {
    /// Chart window for a saved indicator's granularity.
    pub fn for_granularity(&self, granularity: &str) -> &FetchWindow {
        if granularity.eq_ignore_ascii_case("days") {
            &self.daily
        } else {
            &self.intraday
        }
    }

    /// Daily window deep enough to cover `lookback_days` plus warm-up.
    pub fn for_lookback(&self, lookback_days: u32) -> &FetchWindow {
        if lookback_days < self.long_lookback_days {
            &self.daily
        } else {
            &self.long
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            daily: default_daily_window(),
            intraday: default_intraday_window(),
            long: default_long_window(),
            long_lookback_days: default_long_lookback_days(),
        }
    }
}

// =============================================================================
// OptimizerConfig
// =============================================================================

/// Inclusive `min..=max` sweep in `step` increments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl SweepRange {
    pub const fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    /// Ascending candidates.  Each one is computed as `min + i * step` so that
    /// float drift does not accumulate across the grid.
    pub fn candidates(&self) -> Vec<f64> {
        if self.step.is_nan() || self.step <= 0.0 || self.max < self.min {
            return Vec::new();
        }
        let count = ((self.max - self.min) / self.step + 1e-9).floor() as usize + 1;
        (0..count)
            .map(|i| {
                let v = self.min + i as f64 * self.step;
                // Trim representation noise so 0.30000000000000004 reports as 0.3.
                (v * 1e9).round() / 1e9
            })
            .collect()
    }
}

/// Grids and stopping rule for the parameter optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "OptimizerConfig::default_period")]
    pub period: SweepRange,

    /// Band width multiplier grid (Bollinger, Keltner, STARC).
    #[serde(default = "OptimizerConfig::default_multiplier")]
    pub multiplier: SweepRange,

    /// Envelope deviation grid, as a fraction of the basis.
    #[serde(default = "OptimizerConfig::default_envelope")]
    pub envelope: SweepRange,

    /// SuperTrend factor grid.
    #[serde(default = "OptimizerConfig::default_factor")]
    pub factor: SweepRange,

    /// A candidate this close to the target ends the sweep.
    #[serde(default = "OptimizerConfig::default_tolerance")]
    pub tolerance: f64,

    /// Fewer usable bars than this is `DataUnavailable`.
    #[serde(default = "OptimizerConfig::default_min_history_bars")]
    pub min_history_bars: usize,
}

impl OptimizerConfig {
    fn default_period() -> SweepRange {
        SweepRange::new(5.0, 200.0, 2.0)
    }

    fn default_multiplier() -> SweepRange {
        SweepRange::new(0.1, 5.0, 0.1)
    }

    fn default_envelope() -> SweepRange {
        SweepRange::new(0.001, 0.15, 0.001)
    }

    fn default_factor() -> SweepRange {
        SweepRange::new(0.5, 10.0, 0.5)
    }

    fn default_tolerance() -> f64 {
        0.005
    }

    fn default_min_history_bars() -> usize {
        50
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            period: Self::default_period(),
            multiplier: Self::default_multiplier(),
            envelope: Self::default_envelope(),
            factor: Self::default_factor(),
            tolerance: Self::default_tolerance(),
            min_history_bars: Self::default_min_history_bars(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the overlay engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// HTTP listen address.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            provider: ProviderConfig::default(),
            history: HistoryConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            bind_addr = %config.bind_addr,
            provider = %config.provider.base_url,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `OVERLAY_BIND_ADDR` / `OVERLAY_PROVIDER_URL` from the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("OVERLAY_BIND_ADDR").filter(|v| !v.trim().is_empty()) {
            info!(bind_addr = %addr, "bind address overridden from environment");
            self.bind_addr = addr;
        }
        if let Some(url) = lookup("OVERLAY_PROVIDER_URL").filter(|v| !v.trim().is_empty()) {
            info!(base_url = %url, "provider URL overridden from environment");
            self.provider.base_url = url;
        }
    }
}
