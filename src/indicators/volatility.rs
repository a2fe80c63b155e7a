// =============================================================================
// Band / Channel Family
// =============================================================================
//
// Every band indicator returns a basis line plus an upper and lower envelope,
// all aligned with the input series.
//
//   BB     SMA(period)                   +/- stdDev * population std
//   KELT   EMA(period)                   +/- multiplier * ATR(10)
//   DONCH  (highest high + lowest low)/2, bands are the extremes
//   ENV    SMA(period)                   * (1 +/- deviation / 100)
//   STARC  SMA(period)                   +/- multiplier * ATR(period)
//   REG    same computation as BB (see `linear_regression_channel`)
// =============================================================================

use serde::Serialize;

use crate::error::EngineError;
use crate::indicators::primitives::{atr, ema, rolling_max, rolling_min, rolling_std, sma};
use crate::types::{OhlcvSeries, ParamSet};

/// Keltner always uses a 10-bar ATR regardless of its EMA period.
const KELTNER_ATR_PERIOD: usize = 10;

/// Aligned basis / upper / lower series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bands {
    pub basis: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

impl Bands {
    /// `basis +/- k * width` for every bar.
    fn symmetric(basis: Vec<f64>, width: &[f64], k: f64) -> Self {
        let upper = basis.iter().zip(width).map(|(b, w)| b + k * w).collect();
        let lower = basis.iter().zip(width).map(|(b, w)| b - k * w).collect();
        Self { basis, upper, lower }
    }

    pub fn len(&self) -> usize {
        self.basis.len()
    }
}

pub fn bollinger(series: &OhlcvSeries, params: &ParamSet) -> Result<Bands, EngineError> {
    let period = params.period("period", 20)?;
    let std_dev = params.float("stdDev", 2.0)?;
    let basis = sma(series.close(), period)?;
    let std = rolling_std(series.close(), period)?;
    Ok(Bands::symmetric(basis, &std, std_dev))
}

pub fn keltner(series: &OhlcvSeries, params: &ParamSet) -> Result<Bands, EngineError> {
    let period = params.period("period", 20)?;
    let mult = params.float("multiplier", 1.5)?;
    let basis = ema(series.close(), period)?;
    let range = atr(series.high(), series.low(), series.close(), KELTNER_ATR_PERIOD)?;
    Ok(Bands::symmetric(basis, &range, mult))
}

pub fn donchian(series: &OhlcvSeries, params: &ParamSet) -> Result<Bands, EngineError> {
    let period = params.period("period", 20)?;
    let upper = rolling_max(series.high(), period)?;
    let lower = rolling_min(series.low(), period)?;
    let basis = upper.iter().zip(&lower).map(|(u, l)| (u + l) / 2.0).collect();
    Ok(Bands { basis, upper, lower })
}

pub fn envelope(series: &OhlcvSeries, params: &ParamSet) -> Result<Bands, EngineError> {
    let period = params.period("period", 20)?;
    let k = params.float("deviation", 5.0)? / 100.0;
    let basis = sma(series.close(), period)?;
    let upper = basis.iter().map(|b| b * (1.0 + k)).collect();
    let lower = basis.iter().map(|b| b * (1.0 - k)).collect();
    Ok(Bands { basis, upper, lower })
}

pub fn starc(series: &OhlcvSeries, params: &ParamSet) -> Result<Bands, EngineError> {
    let period = params.period("period", 15)?;
    let mult = params.float("multiplier", 2.0)?;
    let basis = sma(series.close(), period)?;
    let range = atr(series.high(), series.low(), series.close(), period)?;
    Ok(Bands::symmetric(basis, &range, mult))
}

/// Registered as the linear regression channel but computed as Bollinger
/// bands, including reading `stdDev` rather than `deviation`.  Saved
/// configurations under this code depend on that shape.
pub fn linear_regression_channel(
    series: &OhlcvSeries,
    params: &ParamSet,
) -> Result<Bands, EngineError> {
    bollinger(series, params)
}
