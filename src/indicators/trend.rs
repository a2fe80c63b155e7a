// =============================================================================
// Trend / Moving-Average Family
// =============================================================================
//
// Single-line overlays computed on the close (VWMA also reads volume).  All
// window lengths are integers; fractional derived lengths (HMA's period / 2
// and sqrt(period)) are truncated.
// =============================================================================

use crate::error::EngineError;
use crate::indicators::primitives::{ema, rolling_sum, wma};
use crate::types::{OhlcvSeries, ParamSet};

/// KAMA fast / slow smoothing lengths.
const KAMA_FAST_END: f64 = 2.0;
const KAMA_SLOW_END: f64 = 30.0;

/// Floor on the McGinley denominator.
const MCGINLEY_MIN_DENOM: f64 = 0.1;

pub fn sma(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    crate::indicators::primitives::sma(series.close(), params.period("period", 20)?)
}

pub fn ema_line(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    ema(series.close(), params.period("period", 20)?)
}

pub fn wma_line(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    wma(series.close(), params.period("period", 20)?)
}

/// Hull moving average on an arbitrary input.
///
/// `WMA(2 * WMA(x, n/2) - WMA(x, n), sqrt(n))`
pub fn hull(values: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    let half = wma(values, period / 2)?;
    let full = wma(values, period)?;
    let raw: Vec<f64> = half.iter().zip(&full).map(|(h, f)| 2.0 * h - f).collect();
    wma(&raw, (period as f64).sqrt() as usize)
}

pub fn hma(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    hull(series.close(), params.period("period", 20)?)
}

/// Volume-weighted moving average.  Windows with zero total volume are NaN.
pub fn vwma(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    let period = params.period("period", 20)?;
    let pv: Vec<f64> = series
        .close()
        .iter()
        .zip(series.volume())
        .map(|(c, v)| c * v)
        .collect();
    let sum_pv = rolling_sum(&pv, period)?;
    let sum_v = rolling_sum(series.volume(), period)?;
    Ok(sum_pv
        .iter()
        .zip(&sum_v)
        .map(|(pv, v)| if *v == 0.0 { f64::NAN } else { pv / v })
        .collect())
}

pub fn dema(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    let period = params.period("period", 20)?;
    let ema1 = ema(series.close(), period)?;
    let ema2 = ema(&ema1, period)?;
    Ok(ema1.iter().zip(&ema2).map(|(a, b)| 2.0 * a - b).collect())
}

pub fn tema(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    let period = params.period("period", 20)?;
    let ema1 = ema(series.close(), period)?;
    let ema2 = ema(&ema1, period)?;
    let ema3 = ema(&ema2, period)?;
    Ok((0..ema1.len())
        .map(|i| 3.0 * ema1[i] - 3.0 * ema2[i] + ema3[i])
        .collect())
}

/// Zero-lag EMA: EMA of `close + (close - close[t - lag])`.
///
/// The first `lag` bars have no lagged value; they fall back to the close
/// itself so the de-lagged series has no leading gap.
pub fn zlema(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    let period = params.period("period", 20)?;
    let lag = period.saturating_sub(1) / 2;
    let close = series.close();
    let de_lagged: Vec<f64> = (0..close.len())
        .map(|i| {
            let lagged = if i >= lag { close[i - lag] } else { f64::NAN };
            let lagged = if lagged.is_nan() { close[i] } else { lagged };
            close[i] + (close[i] - lagged)
        })
        .collect();
    ema(&de_lagged, period)
}

/// Kaufman adaptive moving average.
///
/// Seeded at index `period - 1` with the raw close, then
/// `kama += sc * (close - kama)` with `sc = (ER * (fast - slow) + slow)^2`.
/// Nothing is produced unless the series is strictly longer than `period`.
pub fn kama(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    let period = params.period("period", 10)?;
    if period == 0 {
        return Err(EngineError::invalid_params("period must be >= 1"));
    }
    let close = series.close();
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if n <= period {
        return Ok(out);
    }

    let fast_sc = 2.0 / (KAMA_FAST_END + 1.0);
    let slow_sc = 2.0 / (KAMA_SLOW_END + 1.0);

    out[period - 1] = close[period - 1];
    for i in period..n {
        let change = (close[i] - close[i - period]).abs();
        let volatility: f64 = (i - period + 1..=i)
            .map(|j| (close[j] - close[j - 1]).abs())
            .sum();
        let er = if volatility != 0.0 { change / volatility } else { 0.0 };
        let sc = (er * (fast_sc - slow_sc) + slow_sc).powi(2);
        out[i] = out[i - 1] + sc * (close[i] - out[i - 1]);
    }
    Ok(out)
}

/// McGinley Dynamic.
pub fn mcginley(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    let period = params.period("period", 14)? as f64;
    let close = series.close();
    let mut out = Vec::with_capacity(close.len());
    let Some(&first) = close.first() else {
        return Ok(out);
    };
    out.push(first);

    for &price in &close[1..] {
        let prev = out[out.len() - 1];
        let next = if prev == 0.0 {
            price
        } else {
            let denom = period * (price / prev).powi(4);
            prev + (price - prev) / denom.max(MCGINLEY_MIN_DENOM)
        };
        out.push(next);
    }
    Ok(out)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{closes_series, series_from};
    use serde_json::json;

    fn p(period: usize) -> ParamSet {
        ParamSet::new().with("period", json!(period))
    }

    fn first_defined(v: &[f64]) -> Option<usize> {
        v.iter().position(|x| !x.is_nan())
    }

    #[test]
    fn sma_warm_up_matches_period() {
        let s = closes_series(&(1..=30).map(f64::from).collect::<Vec<_>>());
        let out = sma(&s, &p(10)).unwrap();
        assert_eq!(out.len(), 30);
        assert_eq!(first_defined(&out), Some(9));
    }

    #[test]
    fn hma_on_linear_trend_matches_closed_form() {
        let closes: Vec<f64> = (1..=60).map(f64::from).collect();
        let out = hma(&closes_series(&closes), &p(16)).unwrap();
        // WMA(n) of a unit-slope line lags by (n - 1) / 3:
        // raw = t + 1/3, then WMA(raw, 4) = t + 1/3 - 1.
        let last = out[59];
        assert!((last - (60.0 - 2.0 / 3.0)).abs() < 1e-9, "got {last}");
        assert!(out[..18].iter().all(|v| v.is_nan()));
        assert!(!out[18].is_nan());
    }

    #[test]
    fn hma_period_one_errors() {
        let s = closes_series(&[1.0, 2.0, 3.0]);
        assert!(hma(&s, &p(1)).is_err());
    }

    #[test]
    fn vwma_equal_volume_equals_sma() {
        let closes: Vec<f64> = (1..=20).map(|x| (x as f64).sin() + 10.0).collect();
        let s = closes_series(&closes);
        let a = vwma(&s, &p(5)).unwrap();
        let b = sma(&s, &p(5)).unwrap();
        for i in 4..20 {
            assert!((a[i] - b[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn vwma_zero_volume_window_is_nan() {
        let closes = [1.0, 2.0, 3.0];
        let s = series_from(&closes, &closes, &closes, &[0.0, 0.0, 0.0]);
        let out = vwma(&s, &p(2)).unwrap();
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn dema_tema_flat_series_are_flat() {
        let s = closes_series(&[50.0; 40]);
        for v in dema(&s, &p(10)).unwrap().into_iter().chain(tema(&s, &p(10)).unwrap()) {
            assert!((v - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn zlema_has_no_leading_gap() {
        let closes: Vec<f64> = (1..=10).map(f64::from).collect();
        let out = zlema(&closes_series(&closes), &p(5)).unwrap();
        assert_eq!(first_defined(&out), Some(0));
        // lag = 2; first bar de-lagged to itself
        assert!((out[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn kama_seed_and_flat_behaviour() {
        let closes = [10.0, 10.0, 10.0, 10.0, 10.0, 10.0];
        let out = kama(&closes_series(&closes), &p(3)).unwrap();
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_eq!(out[2], 10.0);
        // Zero volatility -> ER = 0 -> still moves by slow sc toward price (no-op here).
        assert!(out[3..].iter().all(|v| (v - 10.0).abs() < 1e-12));
    }

    #[test]
    fn kama_needs_more_than_period_bars() {
        let out = kama(&closes_series(&[1.0, 2.0, 3.0]), &p(3)).unwrap();
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn kama_follows_efficient_trend_fast() {
        let closes: Vec<f64> = (0..30).map(|x| 100.0 + x as f64).collect();
        let out = kama(&closes_series(&closes), &p(10)).unwrap();
        // ER = 1 on a straight line so sc = (2/3)^2; KAMA should hug price.
        assert!((closes[29] - out[29]).abs() < 2.0);
    }

    #[test]
    fn mcginley_starts_at_first_close() {
        let out = mcginley(&closes_series(&[10.0, 11.0, 12.0]), &p(14)).unwrap();
        assert_eq!(out[0], 10.0);
        assert!(out[1] > 10.0 && out[1] < 11.0);
    }

    #[test]
    fn mcginley_zero_previous_falls_back_to_price() {
        let out = mcginley(&closes_series(&[0.0, 5.0, 5.0]), &p(14)).unwrap();
        assert_eq!(out[1], 5.0);
    }

    #[test]
    fn mcginley_empty_series() {
        let out = mcginley(&closes_series(&[]), &p(14)).unwrap();
        assert!(out.is_empty());
    }
}
