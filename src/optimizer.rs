// =============================================================================
// Parameter Optimizer: grid search toward a target statistic
// =============================================================================
//
// For one indicator family and a target statistic, sweep a single scalar
// parameter in ascending order and keep the candidate whose behaviour over
// the last `lookback_days` comes closest to the target.
//
//   period search      fraction of bars with close > line          (MA family)
//   band search        fraction of bars with lower <= close <= upper
//   factor search      fraction of bars with close > hl2 - f * ATR  (SuperTrend)
//
// Each candidate is computed over the whole history so it has warm-up
// context; only the statistic is restricted to the lookback window.  Ties
// keep the earlier (smaller) candidate.  Period and band sweeps stop as soon
// as the error drops under `tolerance`; the factor sweep always scans the
// full grid.
//
// The factor search uses the static lower-band condition instead of running
// the stateful SuperTrend for every factor.  It is a necessary but not
// sufficient condition for an up-trend, traded for a single ATR pass.
// =============================================================================

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::indicators::primitives::atr;
use crate::indicators::{IndicatorFamily, IndicatorKind, IndicatorOutput};
use crate::market_data::{normalizer, HistoryProvider};
use crate::runtime_config::{OptimizerConfig, RuntimeConfig, SweepRange};
use crate::types::{OhlcvSeries, ParamSet};

/// ATR length for the factor search when the request does not set `period`.
const SUPERTREND_ATR_PERIOD: usize = 10;

// =============================================================================
// Families
// =============================================================================

/// What gets swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerFamily {
    /// Moving-average period.
    Period(IndicatorKind),
    /// Band width multiplier for a band indicator.
    Band(IndicatorKind),
    /// SuperTrend factor.
    SuperTrend,
}

impl OptimizerFamily {
    /// Name of the parameter the result refers to.
    pub fn parameter(self) -> &'static str {
        match self {
            Self::Period(_) => "period",
            Self::Band(IndicatorKind::Bollinger) => "stdDev",
            Self::Band(IndicatorKind::Envelope) => "deviation",
            Self::Band(_) => "multiplier",
            Self::SuperTrend => "factor",
        }
    }

    /// Target used when the request does not give one.
    pub fn default_target(self) -> f64 {
        match self {
            Self::Band(_) => 0.8,
            Self::Period(_) | Self::SuperTrend => 0.5,
        }
    }

    /// Reported when no candidate could be evaluated.
    fn fallback(self) -> f64 {
        match self {
            Self::Period(_) => 20.0,
            Self::Band(_) => 2.0,
            Self::SuperTrend => 3.0,
        }
    }
}

impl fmt::Display for OptimizerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Period(kind) | Self::Band(kind) => write!(f, "{kind}"),
            Self::SuperTrend => f.write_str("SUPERT"),
        }
    }
}

impl FromStr for OptimizerFamily {
    type Err = EngineError;

    /// Accepts the dashboard's route names (`bollinger`, `kelt`, ...) and any
    /// trend-line indicator code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let family = match s.trim().to_ascii_lowercase().as_str() {
            "bollinger" | "bb" => Self::Band(IndicatorKind::Bollinger),
            "keltner" | "kelt" => Self::Band(IndicatorKind::Keltner),
            "starc" => Self::Band(IndicatorKind::Starc),
            "envelope" | "env" => Self::Band(IndicatorKind::Envelope),
            "supertrend" | "supert" => Self::SuperTrend,
            other => {
                let kind: IndicatorKind = other.parse()?;
                if kind.family() != IndicatorFamily::Trend {
                    return Err(EngineError::UnknownIndicator(s.to_string()));
                }
                Self::Period(kind)
            }
        };
        Ok(family)
    }
}

// =============================================================================
// Request / result
// =============================================================================

/// One optimization run.
#[derive(Debug, Clone)]
pub struct SweepRequest {
    pub family: OptimizerFamily,
    /// Target fraction in `[0, 1]`.
    pub target: f64,
    pub lookback_days: u32,
    /// Fixed parameters for every candidate (e.g. the band period).
    pub params: ParamSet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub parameter: &'static str,
    pub optimal: f64,
    /// Statistic the optimal candidate achieved, rounded to 4 decimals.
    pub achieved: f64,
    /// Candidates actually evaluated (skipped ones are not counted).
    pub evaluated: usize,
}

/// Running best over an ascending sweep.
struct Best {
    value: f64,
    stat: f64,
    error: f64,
    evaluated: usize,
}

impl Best {
    fn new(fallback: f64) -> Self {
        Self {
            value: fallback,
            stat: 0.0,
            error: 1.0,
            evaluated: 0,
        }
    }

    /// Record one evaluated candidate.  Returns the candidate's error.
    fn offer(&mut self, value: f64, stat: f64, target: f64) -> f64 {
        self.evaluated += 1;
        let error = (stat - target).abs();
        if error < self.error {
            self.value = value;
            self.stat = stat;
            self.error = error;
        }
        error
    }

    fn finish(self, parameter: &'static str) -> OptimizationResult {
        OptimizationResult {
            parameter,
            optimal: self.value,
            achieved: (self.stat * 10_000.0).round() / 10_000.0,
            evaluated: self.evaluated,
        }
    }
}

// =============================================================================
// Sweeps
// =============================================================================

/// Run the sweep over an already-normalized series.  CPU-bound; async callers
/// should go through [`optimize`], which moves this onto the blocking pool.
///
/// # Errors
/// `DataUnavailable` when the series has fewer than `min_history_bars` bars.
pub fn optimize_series(
    req: &SweepRequest,
    series: &OhlcvSeries,
    cfg: &OptimizerConfig,
) -> Result<OptimizationResult, EngineError> {
    if series.len() < cfg.min_history_bars {
        return Err(EngineError::DataUnavailable {
            required: cfg.min_history_bars,
            actual: series.len(),
        });
    }
    let window = lookback_window(series, req.lookback_days);

    let result = match req.family {
        OptimizerFamily::Period(kind) => period_search(kind, req, series, window, cfg),
        OptimizerFamily::Band(kind) => band_search(kind, req, series, window, cfg),
        OptimizerFamily::SuperTrend => factor_search(req, series, window, &cfg.factor)?,
    };

    info!(
        family = %req.family,
        parameter = result.parameter,
        optimal = result.optimal,
        achieved = result.achieved,
        evaluated = result.evaluated,
        "optimization finished"
    );
    Ok(result)
}

/// Indices of the bars within `lookback_days` of the last bar.  A lookback
/// reaching past the representable date range covers the whole series.
fn lookback_window(series: &OhlcvSeries, lookback_days: u32) -> Range<usize> {
    let times = series.timestamps();
    let Some(last) = series.last_bar().map(|b| b.time) else {
        return 0..0;
    };
    let cutoff = Duration::try_days(i64::from(lookback_days))
        .and_then(|span| last.checked_sub_signed(span));
    match cutoff {
        Some(cutoff) => times.partition_point(|t| *t < cutoff)..times.len(),
        None => 0..times.len(),
    }
}

/// Share of window bars for which `hit` holds.  Undefined indicator values
/// compare false and still count in the denominator.
fn fraction(window: Range<usize>, hit: impl Fn(usize) -> bool) -> Result<f64, EngineError> {
    if window.is_empty() {
        return Err(EngineError::computation("empty lookback window"));
    }
    let total = window.len();
    let hits = window.filter(|&i| hit(i)).count();
    Ok(hits as f64 / total as f64)
}

fn period_search(
    kind: IndicatorKind,
    req: &SweepRequest,
    series: &OhlcvSeries,
    window: Range<usize>,
    cfg: &OptimizerConfig,
) -> OptimizationResult {
    let family = req.family;
    let close = series.close();
    let mut best = Best::new(family.fallback());

    for candidate in cfg.period.candidates() {
        let period = candidate as usize;
        let params = req.params.clone().with("period", period);
        let stat = kind.compute(series, &params).and_then(|out| match out {
            IndicatorOutput::Line(line) => fraction(window.clone(), |i| close[i] > line[i]),
            IndicatorOutput::Bands(_) => Err(EngineError::computation("expected a line")),
        });
        match stat {
            Ok(stat) => {
                if best.offer(candidate, stat, req.target) < cfg.tolerance {
                    break;
                }
            }
            Err(e) => debug!(family = %family, period, error = %e, "candidate skipped"),
        }
    }
    best.finish(family.parameter())
}

fn band_search(
    kind: IndicatorKind,
    req: &SweepRequest,
    series: &OhlcvSeries,
    window: Range<usize>,
    cfg: &OptimizerConfig,
) -> OptimizationResult {
    let family = req.family;
    let parameter = family.parameter();
    // Envelope deviation is swept as a fraction but the indicator reads percent.
    let (grid, scale) = match kind {
        IndicatorKind::Envelope => (&cfg.envelope, 100.0),
        _ => (&cfg.multiplier, 1.0),
    };
    let close = series.close();
    let mut best = Best::new(family.fallback());

    for candidate in grid.candidates() {
        let value = (candidate * scale * 1e6).round() / 1e6;
        let params = req.params.clone().with(parameter, value);
        let stat = kind.compute(series, &params).and_then(|out| match out {
            IndicatorOutput::Bands(b) => {
                fraction(window.clone(), |i| b.lower[i] <= close[i] && close[i] <= b.upper[i])
            }
            IndicatorOutput::Line(_) => Err(EngineError::computation("expected bands")),
        });
        match stat {
            Ok(stat) => {
                if best.offer(value, stat, req.target) < cfg.tolerance {
                    break;
                }
            }
            Err(e) => debug!(family = %family, value, error = %e, "candidate skipped"),
        }
    }
    best.finish(parameter)
}

fn factor_search(
    req: &SweepRequest,
    series: &OhlcvSeries,
    window: Range<usize>,
    grid: &SweepRange,
) -> Result<OptimizationResult, EngineError> {
    let family = req.family;
    let period = req.params.period("period", SUPERTREND_ATR_PERIOD)?;
    let (high, low, close) = (series.high(), series.low(), series.close());
    let range = atr(high, low, close, period)?;
    let hl2: Vec<f64> = high.iter().zip(low).map(|(h, l)| (h + l) / 2.0).collect();
    let mut best = Best::new(family.fallback());

    for factor in grid.candidates() {
        match fraction(window.clone(), |i| close[i] > hl2[i] - factor * range[i]) {
            Ok(stat) => {
                best.offer(factor, stat, req.target);
            }
            Err(e) => debug!(family = %family, factor, error = %e, "candidate skipped"),
        }
    }
    Ok(best.finish(family.parameter()))
}

// =============================================================================
// Provider-backed entry point
// =============================================================================

/// Fetch daily history deep enough for the lookback, normalize it and run the
/// sweep on tokio's blocking pool.
///
/// # Errors
/// `DataUnavailable` when the provider has nothing usable or the history is
/// too short.  Provider failures never surface any other way.
pub async fn optimize(
    provider: &dyn HistoryProvider,
    ticker: &str,
    req: SweepRequest,
    cfg: &RuntimeConfig,
) -> Result<OptimizationResult, EngineError> {
    let window = cfg.history.for_lookback(req.lookback_days);
    let no_data = EngineError::DataUnavailable {
        required: cfg.optimizer.min_history_bars,
        actual: 0,
    };

    let Some(table) = provider
        .fetch_history(ticker, &window.period, &window.interval)
        .await
    else {
        warn!(ticker, family = %req.family, "no history for optimization");
        return Err(no_data);
    };
    let series = match normalizer::normalize(&table) {
        Ok(series) => series,
        Err(e) => {
            warn!(ticker, error = %e, "history rejected by normalizer");
            return Err(no_data);
        }
    };

    let opt_cfg = cfg.optimizer.clone();
    tokio::task::spawn_blocking(move || optimize_series(&req, &series, &opt_cfg))
        .await
        .map_err(|e| EngineError::computation(format!("optimizer task failed: {e}")))?
}
