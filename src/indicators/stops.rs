// =============================================================================
// Stop Family: SuperTrend, Parabolic SAR, Chandelier Exit
// =============================================================================
//
// SuperTrend and PSAR carry trend state from bar to bar, so they are written
// as explicit sequential loops.  Chandelier Exit is a plain rolling formula.
// =============================================================================

use crate::error::EngineError;
use crate::indicators::primitives::{atr, rolling_max};
use crate::types::{OhlcvSeries, ParamSet};

// =============================================================================
// SuperTrend
// =============================================================================

/// Full SuperTrend state per bar.
#[derive(Debug, Clone)]
pub struct SuperTrendTrace {
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
    /// `Some(true)` while the trend is up.  `None` during warm-up.
    pub trend_up: Vec<Option<bool>>,
}

impl SuperTrendTrace {
    /// Stop line: lower band in an up-trend, upper band in a down-trend.
    pub fn line(&self) -> Vec<f64> {
        self.trend_up
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(trend, (&lower, &upper))| match trend {
                Some(true) => lower,
                Some(false) => upper,
                None => f64::NAN,
            })
            .collect()
    }
}

/// Run the SuperTrend state machine.
///
/// Basic bands are `hl2 +/- factor * ATR(period)`.  The upper band may only
/// move down unless the previous close broke above it; the lower band may only
/// move up unless the previous close broke below it.  The trend flips down
/// when the close drops under the lower band and up when it rises over the
/// upper band.  The first `period` bars are undefined.
pub fn supertrend_trace(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    factor: f64,
) -> Result<SuperTrendTrace, EngineError> {
    let range = atr(high, low, close, period)?;
    let n = close.len();

    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];
    let mut trend_up = vec![None; n];

    let mut up = true;
    for i in period..n {
        let hl2 = (high[i] + low[i]) / 2.0;
        let basic_upper = hl2 + factor * range[i];
        let basic_lower = hl2 - factor * range[i];

        let prev_upper = if upper[i - 1].is_nan() { basic_upper } else { upper[i - 1] };
        let prev_lower = if lower[i - 1].is_nan() { basic_lower } else { lower[i - 1] };
        let prev_close = close[i - 1];

        let curr_upper = if basic_upper < prev_upper || prev_close > prev_upper {
            basic_upper
        } else {
            prev_upper
        };
        let curr_lower = if basic_lower > prev_lower || prev_close < prev_lower {
            basic_lower
        } else {
            prev_lower
        };
        upper[i] = curr_upper;
        lower[i] = curr_lower;

        if up && close[i] < curr_lower {
            up = false;
        } else if !up && close[i] > curr_upper {
            up = true;
        }

        trend_up[i] = Some(up);
    }

    Ok(SuperTrendTrace {
        upper,
        lower,
        trend_up,
    })
}

pub fn supertrend(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    let period = params.period("period", 10)?;
    let factor = params.float("factor", 3.0)?;
    let trace = supertrend_trace(series.high(), series.low(), series.close(), period, factor)?;
    Ok(trace.line())
}

// =============================================================================
// Parabolic SAR
// =============================================================================

/// Parabolic stop-and-reverse.
///
/// Starts long with `SAR[0] = low[0]` and `EP = high[0]`.  Each bar:
/// `SAR = prevSAR + af * (EP - prevSAR)`, clamped so it never sits inside the
/// previous two bars' range (below their lows when long, above their highs
/// when short).  Crossing the SAR reverses: SAR jumps to the old EP, EP resets
/// to this bar's extreme and `af` resets to `step`.  Otherwise a new extreme
/// advances EP and raises `af` by `step`, capped at `max`.
pub fn parabolic_sar(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    let step = params.float("step", 0.02)?;
    let max_step = params.float("max", 0.2)?;
    let high = series.high();
    let low = series.low();
    let n = high.len();

    let mut sar = vec![f64::NAN; n];
    if n == 0 {
        return Ok(sar);
    }

    let mut is_long = true;
    let mut af = step;
    let mut ep = high[0];
    sar[0] = low[0];

    for i in 1..n {
        let prev_sar = sar[i - 1];
        let mut next_sar = prev_sar + af * (ep - prev_sar);

        if is_long {
            next_sar = next_sar.min(low[i - 1]);
            if i >= 2 {
                next_sar = next_sar.min(low[i - 2]);
            }
        } else {
            next_sar = next_sar.max(high[i - 1]);
            if i >= 2 {
                next_sar = next_sar.max(high[i - 2]);
            }
        }

        let mut reversed = false;
        if is_long && low[i] < next_sar {
            is_long = false;
            reversed = true;
            next_sar = ep;
            ep = low[i];
            af = step;
        } else if !is_long && high[i] > next_sar {
            is_long = true;
            reversed = true;
            next_sar = ep;
            ep = high[i];
            af = step;
        }

        if !reversed {
            if is_long && high[i] > ep {
                ep = high[i];
                af = (af + step).min(max_step);
            } else if !is_long && low[i] < ep {
                ep = low[i];
                af = (af + step).min(max_step);
            }
        }

        sar[i] = next_sar;
    }

    Ok(sar)
}

// =============================================================================
// Chandelier Exit
// =============================================================================

/// Long-side chandelier exit: `highest high(period) - multiplier * ATR(period)`.
pub fn chandelier_exit(series: &OhlcvSeries, params: &ParamSet) -> Result<Vec<f64>, EngineError> {
    let period = params.period("period", 22)?;
    let mult = params.float("multiplier", 3.0)?;
    let highest = rolling_max(series.high(), period)?;
    let range = atr(series.high(), series.low(), series.close(), period)?;
    Ok(highest
        .iter()
        .zip(&range)
        .map(|(h, a)| h - a * mult)
        .collect())
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::series_from;
    use serde_json::json;

    /// Strictly rising closes with a constant true range of 2.
    fn rising(n: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let close: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let high = close.iter().map(|c| c + 1.0).collect();
        let low = close.iter().map(|c| c - 1.0).collect();
        (high, low, close)
    }

    // ---- supertrend ------------------------------------------------------

    #[test]
    fn supertrend_lower_band_ratchets_up_in_rising_market() {
        let (high, low, close) = rising(60);
        let t = supertrend_trace(&high, &low, &close, 10, 3.0).unwrap();
        let lower: Vec<f64> = t.lower.iter().copied().filter(|v| !v.is_nan()).collect();
        assert_eq!(lower.len(), 50);
        for w in lower.windows(2) {
            assert!(w[1] >= w[0], "lower band moved down: {} -> {}", w[0], w[1]);
        }
        // Trend never flips, so the line is the lower band.
        let line = t.line();
        assert!(line[..10].iter().all(|v| v.is_nan()));
        for i in 10..60 {
            assert_eq!(t.trend_up[i], Some(true));
            assert_eq!(line[i], t.lower[i]);
        }
    }

    #[test]
    fn supertrend_warm_up_is_period_bars() {
        let (high, low, close) = rising(20);
        let s = series_from(&high, &low, &close, &[1.0; 20]);
        let out = supertrend(&s, &ParamSet::new().with("period", json!(7))).unwrap();
        assert!(out[..7].iter().all(|v| v.is_nan()));
        assert!(out[7..].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn supertrend_flips_down_on_crash() {
        let (mut high, mut low, mut close) = rising(30);
        for i in 0..10 {
            let c = 120.0 - 8.0 * i as f64;
            close.push(c);
            high.push(c + 1.0);
            low.push(c - 1.0);
        }
        let t = supertrend_trace(&high, &low, &close, 5, 2.0).unwrap();
        assert_eq!(t.trend_up[39], Some(false));
        let line = t.line();
        assert_eq!(line[39], t.upper[39]);
        assert!(line[39] > close[39]);
    }

    // ---- parabolic sar ---------------------------------------------------

    #[test]
    fn psar_rising_market_stays_below_lows() {
        let (high, low, close) = rising(30);
        let s = series_from(&high, &low, &close, &[1.0; 30]);
        let sar = parabolic_sar(&s, &ParamSet::new()).unwrap();
        assert_eq!(sar[0], low[0]);
        for i in 1..30 {
            assert!(sar[i] <= low[i - 1], "bar {i}: sar {} above prior low", sar[i]);
            if i >= 2 {
                assert!(sar[i] <= low[i - 2]);
            }
        }
    }

    #[test]
    fn psar_reverses_to_prior_extreme() {
        // Up for a few bars then a gap down through the SAR.
        let high = [10.0, 11.0, 12.0, 13.0, 6.0];
        let low = [9.0, 10.0, 11.0, 12.0, 5.0];
        let close = [9.5, 10.5, 11.5, 12.5, 5.5];
        let s = series_from(&high, &low, &close, &[1.0; 5]);
        let sar = parabolic_sar(&s, &ParamSet::new()).unwrap();
        // Reversal bar takes the long-side extreme point (13).
        assert_eq!(sar[4], 13.0);
    }

    #[test]
    fn psar_af_is_capped() {
        let (high, low, close) = rising(200);
        let s = series_from(&high, &low, &close, &[1.0; 200]);
        let params = ParamSet::new().with("step", json!(0.1)).with("max", json!(0.3));
        let sar = parabolic_sar(&s, &params).unwrap();
        // With af capped at 0.3 and EP leading price by 1, SAR gaps settle.
        let gap = high[199] - sar[199];
        assert!(gap > 1.0 && gap < 10.0, "gap {gap}");
    }

    #[test]
    fn psar_empty_series() {
        let s = series_from(&[], &[], &[], &[]);
        assert!(parabolic_sar(&s, &ParamSet::new()).unwrap().is_empty());
    }

    // ---- chandelier ------------------------------------------------------

    #[test]
    fn chandelier_is_highest_high_minus_scaled_atr() {
        let (high, low, close) = rising(30);
        let s = series_from(&high, &low, &close, &[1.0; 30]);
        let params = ParamSet::new().with("period", json!(5)).with("multiplier", json!(2));
        let out = chandelier_exit(&s, &params).unwrap();
        assert!(out[..4].iter().all(|v| v.is_nan()));
        // ATR is constant at 2, highest high is the current high.
        assert!((out[29] - (high[29] - 4.0)).abs() < 1e-9);
    }
}
