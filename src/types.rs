// =============================================================================
// Shared types used across the overlay engine
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EngineError;

/// One OHLCV bar with a UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

// =============================================================================
// OhlcvSeries
// =============================================================================

/// Canonical price series: UTC timestamps, strictly ascending, no duplicates.
///
/// Stored column-wise so indicator math can borrow whole columns as slices.
/// The only way to build one is through [`crate::market_data::normalizer`],
/// which is what lets every indicator assume a clean index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OhlcvSeries {
    pub(crate) time: Vec<DateTime<Utc>>,
    pub(crate) open: Vec<f64>,
    pub(crate) high: Vec<f64>,
    pub(crate) low: Vec<f64>,
    pub(crate) close: Vec<f64>,
    pub(crate) volume: Vec<f64>,
}

impl OhlcvSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.time
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn close(&self) -> &[f64] {
        &self.close
    }

    pub fn volume(&self) -> &[f64] {
        &self.volume
    }

    /// Timestamps as integer epoch seconds.
    pub fn epoch_seconds(&self) -> Vec<i64> {
        self.time.iter().map(DateTime::timestamp).collect()
    }

    pub fn bar(&self, i: usize) -> Option<Bar> {
        Some(Bar {
            time: *self.time.get(i)?,
            open: self.open[i],
            high: self.high[i],
            low: self.low[i],
            close: self.close[i],
            volume: self.volume[i],
        })
    }

    pub fn last_bar(&self) -> Option<Bar> {
        self.bar(self.len().checked_sub(1)?)
    }

    pub(crate) fn push(&mut self, bar: Bar) {
        self.time.push(bar.time);
        self.open.push(bar.open);
        self.high.push(bar.high);
        self.low.push(bar.low);
        self.close.push(bar.close);
        self.volume.push(bar.volume);
    }
}

// =============================================================================
// ParamSet
// =============================================================================

/// Named indicator parameters as sent by the dashboard.
///
/// Values may be JSON numbers or numeric strings.  Unknown keys are carried
/// along untouched and ignored by indicators that do not read them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(Map<String, Value>);

impl ParamSet {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Read a float parameter, falling back to `default` when absent or null.
    pub fn float(&self, key: &str, default: f64) -> Result<f64, EngineError> {
        let value = match self.0.get(key) {
            None | Some(Value::Null) => return Ok(default),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        match value {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(EngineError::invalid_params(format!(
                "{key} must be a finite number"
            ))),
        }
    }

    /// Read a window-length parameter.  Fractional values are truncated toward
    /// zero; negative values are rejected.
    pub fn period(&self, key: &str, default: usize) -> Result<usize, EngineError> {
        if matches!(self.0.get(key), None | Some(Value::Null)) {
            return Ok(default);
        }
        let raw = self.float(key, default as f64)?;
        if raw < 0.0 {
            return Err(EngineError::invalid_params(format!(
                "{key} must not be negative (got {raw})"
            )));
        }
        Ok(raw.trunc() as usize)
    }

}

impl From<Map<String, Value>> for ParamSet {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
