// =============================================================================
// Indicator Registry
// =============================================================================
//
// Closed set of indicator kinds.  Dispatch is an exhaustive `match`, so adding
// an indicator means adding a variant and the compiler points at every place
// that has to handle it.  The only runtime "unknown" path is parsing the code
// string that arrives over the wire.
// =============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::EngineError;
use crate::indicators::volatility::Bands;
use crate::indicators::{stops, trend, volatility};
use crate::types::{OhlcvSeries, ParamSet};

/// Broad grouping used by the dashboard and the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorFamily {
    Trend,
    Band,
    Stop,
}

/// Every indicator the engine can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Sma,
    Ema,
    Wma,
    Hma,
    Vwma,
    Dema,
    Tema,
    Zlema,
    Kama,
    McGinley,
    Bollinger,
    Keltner,
    Donchian,
    Envelope,
    Starc,
    RegressionChannel,
    SuperTrend,
    ParabolicSar,
    Chandelier,
}

/// Output of one indicator computation, aligned with the input series.
#[derive(Debug, Clone)]
pub enum IndicatorOutput {
    Line(Vec<f64>),
    Bands(Bands),
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 19] = [
        Self::Sma,
        Self::Ema,
        Self::Wma,
        Self::Hma,
        Self::Vwma,
        Self::Dema,
        Self::Tema,
        Self::Zlema,
        Self::Kama,
        Self::McGinley,
        Self::Bollinger,
        Self::Keltner,
        Self::Donchian,
        Self::Envelope,
        Self::Starc,
        Self::RegressionChannel,
        Self::SuperTrend,
        Self::ParabolicSar,
        Self::Chandelier,
    ];

    /// Wire code stored in saved indicator configurations.
    pub fn code(self) -> &'static str {
        match self {
            Self::Sma => "SMA",
            Self::Ema => "EMA",
            Self::Wma => "WMA",
            Self::Hma => "HMA",
            Self::Vwma => "VWMA",
            Self::Dema => "DEMA",
            Self::Tema => "TEMA",
            Self::Zlema => "ZLEMA",
            Self::Kama => "KAMA",
            Self::McGinley => "MCG",
            Self::Bollinger => "BB",
            Self::Keltner => "KELT",
            Self::Donchian => "DONCH",
            Self::Envelope => "ENV",
            Self::Starc => "STARC",
            Self::RegressionChannel => "REG",
            Self::SuperTrend => "SUPERT",
            Self::ParabolicSar => "PSAR",
            Self::Chandelier => "CHAND",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Sma => "Simple Moving Average",
            Self::Ema => "Exponential Moving Average",
            Self::Wma => "Weighted Moving Average",
            Self::Hma => "Hull Moving Average",
            Self::Vwma => "Volume Weighted Moving Average",
            Self::Dema => "Double EMA",
            Self::Tema => "Triple EMA",
            Self::Zlema => "Zero-Lag EMA",
            Self::Kama => "Kaufman Adaptive MA",
            Self::McGinley => "McGinley Dynamic",
            Self::Bollinger => "Bollinger Bands",
            Self::Keltner => "Keltner Channels",
            Self::Donchian => "Donchian Channels",
            Self::Envelope => "Envelope Channel",
            Self::Starc => "STARC Bands",
            Self::RegressionChannel => "Linear Reg. Channel",
            Self::SuperTrend => "SuperTrend",
            Self::ParabolicSar => "Parabolic SAR",
            Self::Chandelier => "Chandelier Exit",
        }
    }

    pub fn family(self) -> IndicatorFamily {
        match self {
            Self::Sma
            | Self::Ema
            | Self::Wma
            | Self::Hma
            | Self::Vwma
            | Self::Dema
            | Self::Tema
            | Self::Zlema
            | Self::Kama
            | Self::McGinley => IndicatorFamily::Trend,
            Self::Bollinger
            | Self::Keltner
            | Self::Donchian
            | Self::Envelope
            | Self::Starc
            | Self::RegressionChannel => IndicatorFamily::Band,
            Self::SuperTrend | Self::ParabolicSar | Self::Chandelier => IndicatorFamily::Stop,
        }
    }

    /// Default parameter set shown when an indicator is first attached.
    pub fn default_params(self) -> ParamSet {
        let p = ParamSet::new();
        match self {
            Self::Sma
            | Self::Ema
            | Self::Wma
            | Self::Hma
            | Self::Vwma
            | Self::Dema
            | Self::Tema
            | Self::Zlema
            | Self::Donchian => p.with("period", 20),
            Self::Kama => p.with("period", 10),
            Self::McGinley => p.with("period", 14),
            Self::Bollinger => p.with("period", 20).with("stdDev", 2.0),
            Self::Keltner => p.with("period", 20).with("multiplier", 1.5),
            Self::Envelope => p.with("period", 20).with("deviation", 5.0),
            Self::Starc => p.with("period", 15).with("multiplier", 2.0),
            Self::RegressionChannel => p.with("period", 20).with("deviation", 2.0),
            Self::SuperTrend => p.with("period", 10).with("factor", 3.0),
            Self::ParabolicSar => p.with("step", 0.02).with("max", 0.2),
            Self::Chandelier => p.with("period", 22).with("multiplier", 3.0),
        }
    }

    /// Run the indicator over a normalized series.
    pub fn compute(
        self,
        series: &OhlcvSeries,
        params: &ParamSet,
    ) -> Result<IndicatorOutput, EngineError> {
        use IndicatorOutput::{Bands as B, Line as L};
        let out = match self {
            Self::Sma => L(trend::sma(series, params)?),
            Self::Ema => L(trend::ema_line(series, params)?),
            Self::Wma => L(trend::wma_line(series, params)?),
            Self::Hma => L(trend::hma(series, params)?),
            Self::Vwma => L(trend::vwma(series, params)?),
            Self::Dema => L(trend::dema(series, params)?),
            Self::Tema => L(trend::tema(series, params)?),
            Self::Zlema => L(trend::zlema(series, params)?),
            Self::Kama => L(trend::kama(series, params)?),
            Self::McGinley => L(trend::mcginley(series, params)?),
            Self::Bollinger => B(volatility::bollinger(series, params)?),
            Self::Keltner => B(volatility::keltner(series, params)?),
            Self::Donchian => B(volatility::donchian(series, params)?),
            Self::Envelope => B(volatility::envelope(series, params)?),
            Self::Starc => B(volatility::starc(series, params)?),
            Self::RegressionChannel => B(volatility::linear_regression_channel(series, params)?),
            Self::SuperTrend => L(stops::supertrend(series, params)?),
            Self::ParabolicSar => L(stops::parabolic_sar(series, params)?),
            Self::Chandelier => L(stops::chandelier_exit(series, params)?),
        };
        Ok(out)
    }

    /// Catalog entry for the dashboard's indicator menu.
    pub fn describe(self) -> Value {
        json!({
            "code": self.code(),
            "name": self.display_name(),
            "family": self.family(),
            "params": self.default_params(),
        })
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for IndicatorKind {
    type Err = EngineError;

    /// Codes are matched case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| EngineError::UnknownIndicator(s.to_string()))
    }
}

/// Full indicator catalog.
pub fn catalog() -> Vec<Value> {
    IndicatorKind::ALL.iter().map(|k| k.describe()).collect()
}
