// =============================================================================
// Math Primitives
// =============================================================================
//
// Rolling and exponential building blocks shared by every indicator.  Each
// function returns a vector aligned 1:1 with its input; positions without
// enough history are NaN.
//
//   SMA        mean of the trailing `period` values
//   EMA        alpha = 2 / (period + 1), seeded with the first value
//   WMA        weights 1..=period, newest weighted highest
//   TrueRange  max(H - L, |H - prevC|, |L - prevC|)
//   ATR        exponential smoothing of TR with alpha = 1 / period (Wilder)
//   RollingStd population standard deviation (divide by `period`)
//
// A window containing any NaN yields NaN.
// =============================================================================

use crate::error::EngineError;

fn check_period(period: usize) -> Result<(), EngineError> {
    if period == 0 {
        return Err(EngineError::invalid_params("period must be >= 1"));
    }
    Ok(())
}

/// Apply `f` to every full trailing window.
fn rolling<F>(series: &[f64], period: usize, f: F) -> Result<Vec<f64>, EngineError>
where
    F: Fn(&[f64]) -> f64,
{
    check_period(period)?;
    let mut out = vec![f64::NAN; series.len()];
    if series.len() < period {
        return Ok(out);
    }
    for end in period..=series.len() {
        let window = &series[end - period..end];
        out[end - 1] = if window.iter().any(|v| v.is_nan()) {
            f64::NAN
        } else {
            f(window)
        };
    }
    Ok(out)
}

/// Simple moving average.
pub fn sma(series: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    rolling(series, period, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Trailing sum.
pub fn rolling_sum(series: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    rolling(series, period, |w| w.iter().sum())
}

/// Trailing maximum.
pub fn rolling_max(series: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    rolling(series, period, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Trailing minimum.
pub fn rolling_min(series: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    rolling(series, period, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Population standard deviation over the trailing window.
pub fn rolling_std(series: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    rolling(series, period, |w| {
        let n = w.len() as f64;
        let mean = w.iter().sum::<f64>() / n;
        (w.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt()
    })
}

/// Linearly weighted moving average.
pub fn wma(series: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    let n = period as f64;
    let weight_sum = n * (n + 1.0) / 2.0;
    rolling(series, period, |w| {
        w.iter()
            .enumerate()
            .map(|(i, v)| v * (i + 1) as f64)
            .sum::<f64>()
            / weight_sum
    })
}

/// Recursive exponential smoothing with an arbitrary `alpha`.
///
/// Seeded with the first non-NaN input; leading NaNs stay NaN.  A NaN after
/// the seed carries the previous smoothed value forward.
pub fn ewm(series: &[f64], alpha: f64) -> Result<Vec<f64>, EngineError> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(EngineError::invalid_params(format!(
            "smoothing factor {alpha} outside (0, 1]"
        )));
    }
    let mut out = Vec::with_capacity(series.len());
    let mut prev: Option<f64> = None;
    for &x in series {
        let next = match (prev, x.is_nan()) {
            (None, true) => None,
            (None, false) => Some(x),
            (Some(p), true) => Some(p),
            (Some(p), false) => Some(alpha * x + (1.0 - alpha) * p),
        };
        out.push(next.unwrap_or(f64::NAN));
        prev = next;
    }
    Ok(out)
}

/// Exponential moving average, `alpha = 2 / (period + 1)`.
pub fn ema(series: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    check_period(period)?;
    ewm(series, 2.0 / (period as f64 + 1.0))
}

/// Per-bar true range.  The first bar has no previous close, so its range is
/// just `high - low`.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..high.len())
        .map(|i| {
            let hl = high[i] - low[i];
            if i == 0 {
                return hl;
            }
            let prev_close = close[i - 1];
            let hc = (high[i] - prev_close).abs();
            let lc = (low[i] - prev_close).abs();
            if hl.is_nan() || hc.is_nan() || lc.is_nan() {
                f64::NAN
            } else {
                hl.max(hc).max(lc)
            }
        })
        .collect()
}

/// Average true range with Wilder smoothing (`alpha = 1 / period`), seeded
/// with the first true range value.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    check_period(period)?;
    ewm(&true_range(high, low, close), 1.0 / period as f64)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn assert_series(got: &[f64], expected: &[f64]) {
        assert_eq!(got.len(), expected.len());
        for (i, (a, b)) in got.iter().zip(expected).enumerate() {
            if b.is_nan() {
                assert!(a.is_nan(), "index {i}: expected NaN, got {a}");
            } else {
                assert!((a - b).abs() < 1e-10, "index {i}: got {a}, expected {b}");
            }
        }
    }

    const NAN: f64 = f64::NAN;

    // ---- sma -------------------------------------------------------------

    #[test]
    fn sma_known_values() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert_series(&out, &[NAN, NAN, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn sma_period_zero_errors() {
        assert!(sma(&[1.0, 2.0], 0).is_err());
    }

    #[test]
    fn sma_short_input_is_all_nan() {
        let out = sma(&[1.0, 2.0], 5).unwrap();
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn sma_nan_poisons_its_windows_only() {
        let out = sma(&[1.0, NAN, 3.0, 4.0, 5.0], 2).unwrap();
        assert_series(&out, &[NAN, NAN, NAN, 3.5, 4.5]);
    }

    // ---- ema -------------------------------------------------------------

    #[test]
    fn ema_seeds_with_first_value() {
        let out = ema(&[10.0, 20.0, 30.0, 40.0], 3).unwrap();
        // alpha = 0.5
        assert_series(&out, &[10.0, 15.0, 22.5, 31.25]);
    }

    #[test]
    fn ema_skips_leading_nan_and_carries_gaps() {
        let out = ema(&[NAN, 2.0, NAN, 4.0], 1).unwrap();
        assert_series(&out, &[NAN, 2.0, 2.0, 4.0]);
    }

    #[test]
    fn ewm_rejects_bad_alpha() {
        assert!(ewm(&[1.0], 0.0).is_err());
        assert!(ewm(&[1.0], 1.5).is_err());
    }

    // ---- wma -------------------------------------------------------------

    #[test]
    fn wma_weights_newest_highest() {
        // (1*1 + 2*2 + 3*3) / 6 = 14/6
        let out = wma(&[1.0, 2.0, 3.0, 4.0], 3).unwrap();
        assert_series(&out, &[NAN, NAN, 14.0 / 6.0, 20.0 / 6.0]);
    }

    #[test]
    fn wma_huge_period_is_all_nan() {
        let out = wma(&[1.0, 2.0, 3.0], 10_000_000_000).unwrap();
        assert!(out.iter().all(|v| v.is_nan()));
        let out = wma(&[1.0, 2.0, 3.0], usize::MAX).unwrap();
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn wma_period_one_is_identity() {
        let input = [3.0, 1.0, 4.0];
        assert_series(&wma(&input, 1).unwrap(), &input);
    }

    // ---- rolling extremes / sum / std -------------------------------------

    #[test]
    fn rolling_extremes() {
        let s = [3.0, 1.0, 4.0, 1.0, 5.0];
        assert_series(&rolling_max(&s, 2).unwrap(), &[NAN, 3.0, 4.0, 4.0, 5.0]);
        assert_series(&rolling_min(&s, 2).unwrap(), &[NAN, 1.0, 1.0, 1.0, 1.0]);
        assert_series(&rolling_sum(&s, 3).unwrap(), &[NAN, NAN, 8.0, 6.0, 10.0]);
    }

    #[test]
    fn rolling_std_is_population() {
        // [2, 4]: mean 3, population variance 1
        let out = rolling_std(&[2.0, 4.0], 2).unwrap();
        assert_series(&out, &[NAN, 1.0]);
    }

    #[test]
    fn rolling_std_flat_is_zero() {
        let out = rolling_std(&[5.0; 6], 3).unwrap();
        assert!(out[2..].iter().all(|v| v.abs() < 1e-12));
    }

    // ---- true range / atr --------------------------------------------------

    #[test]
    fn true_range_uses_prev_close_on_gaps() {
        let high = [105.0, 115.0];
        let low = [95.0, 108.0];
        let close = [95.0, 112.0];
        let tr = true_range(&high, &low, &close);
        assert_series(&tr, &[10.0, 20.0]);
    }

    #[test]
    fn atr_is_wilder_smoothed_tr() {
        let high = [11.0, 12.0, 13.0];
        let low = [9.0, 10.0, 11.0];
        let close = [10.0, 11.0, 12.0];
        // TR = [2, 2, 2] -> ATR stays 2 from the first bar on.
        let out = atr(&high, &low, &close, 14).unwrap();
        assert_series(&out, &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn atr_responds_to_range_expansion() {
        let high = [11.0, 11.0, 20.0];
        let low = [9.0, 9.0, 10.0];
        let close = [10.0, 10.0, 15.0];
        let out = atr(&high, &low, &close, 2).unwrap();
        // TR = [2, 2, 10]; alpha 0.5 -> [2, 2, 6]
        assert_series(&out, &[2.0, 2.0, 6.0]);
    }
}
