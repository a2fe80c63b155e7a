// =============================================================================
// Series Normalizer
// =============================================================================
//
// Turns an arbitrary `RawTable` into a canonical `OhlcvSeries`:
//
//   1. Pick the time axis: the table index if present, otherwise the first
//      column named date / datetime / time / timestamp (case-insensitive).
//   2. Coerce every label to a UTC timestamp.  A single unparsable label fails
//      the whole table with `MalformedInput`.
//   3. Stable-sort ascending by time.
//   4. Collapse duplicate timestamps keeping the LAST occurrence.  Providers
//      emit a partial "current" bar followed by its finalized replacement
//      under the same timestamp.
//
// Indicator code downstream never re-sorts or re-cleans.
// =============================================================================

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::error::EngineError;
use crate::market_data::raw_table::{RawColumn, RawTable};
use crate::types::{Bar, OhlcvSeries};

/// Column names that may carry the time axis when the index is positional.
const TIME_COLUMNS: &[&str] = &["date", "datetime", "time", "timestamp"];

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Normalize a raw table into a clean ascending, duplicate-free series.
///
/// # Errors
/// `MalformedInput` when no time axis can be found, a label cannot be parsed,
/// a required price column is missing, or column lengths disagree.
pub fn normalize(table: &RawTable) -> Result<OhlcvSeries, EngineError> {
    let (labels, time_column) = match &table.index {
        Some(index) => (index.as_slice(), None),
        None => {
            let col = table
                .columns
                .iter()
                .find(|c| {
                    TIME_COLUMNS
                        .iter()
                        .any(|name| c.name.eq_ignore_ascii_case(name))
                })
                .ok_or_else(|| EngineError::malformed("no datetime index or date column"))?;
            (col.values.as_slice(), Some(col.name.as_str()))
        }
    };

    let rows = labels.len();
    let price = |name: &str| -> Result<&RawColumn, EngineError> {
        let col = table
            .columns
            .iter()
            .filter(|c| Some(c.name.as_str()) != time_column)
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| EngineError::malformed(format!("missing column {name}")))?;
        if col.values.len() != rows {
            return Err(EngineError::malformed(format!(
                "column {} has {} rows, index has {rows}",
                col.name,
                col.values.len()
            )));
        }
        Ok(col)
    };

    let open = price("open")?;
    let high = price("high")?;
    let low = price("low")?;
    let close = price("close")?;
    let volume = match price("volume") {
        Ok(col) => Some(col),
        Err(EngineError::MalformedInput(_)) if table.column("volume").is_none() => None,
        Err(e) => return Err(e),
    };

    let mut bars = Vec::with_capacity(rows);
    for (i, label) in labels.iter().enumerate() {
        let time = parse_timestamp(label)?;
        let vol = volume.map_or(0.0, |c| cell_f64(&c.values[i]));
        bars.push(Bar {
            time,
            open: cell_f64(&open.values[i]),
            high: cell_f64(&high.values[i]),
            low: cell_f64(&low.values[i]),
            close: cell_f64(&close.values[i]),
            volume: if vol.is_finite() && vol >= 0.0 { vol } else { 0.0 },
        });
    }

    let series = normalize_bars(bars);
    if let Some(last) = series.last_bar() {
        debug!(rows, kept = series.len(), last = %last.time, close = last.close, "raw table normalized");
    }
    Ok(series)
}

/// Sort typed bars ascending and drop duplicate timestamps, keeping the last.
pub fn normalize_bars(mut bars: Vec<Bar>) -> OhlcvSeries {
    // Stable, so "last" still means last in arrival order.
    bars.sort_by(|a, b| a.time.cmp(&b.time));

    let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match deduped.last_mut() {
            Some(last) if last.time == bar.time => *last = bar,
            _ => deduped.push(bar),
        }
    }

    let mut series = OhlcvSeries::default();
    for bar in deduped {
        series.push(bar);
    }
    series
}

/// Coerce one time label to UTC.
///
/// Numbers are epoch values whose unit (s, ms, µs, ns) is inferred from
/// magnitude.  Strings may be epoch numbers, RFC 3339, `YYYY-MM-DD HH:MM:SS`
/// with or without an offset, or a bare date.  Naive values are taken as UTC.
pub fn parse_timestamp(label: &Value) -> Result<DateTime<Utc>, EngineError> {
    let parsed = match label {
        Value::Number(n) => match n.as_i64() {
            Some(i) => from_epoch(i as i128, magnitude_scale(i.unsigned_abs() as f64)),
            None => n.as_f64().and_then(from_epoch_f64),
        },
        Value::String(s) => parse_time_str(s.trim()),
        _ => None,
    };
    parsed.ok_or_else(|| EngineError::malformed(format!("unparsable timestamp: {label}")))
}

fn parse_time_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(i) = s.parse::<i64>() {
        return from_epoch(i as i128, magnitude_scale(i.unsigned_abs() as f64));
    }
    if let Ok(f) = s.parse::<f64>() {
        return from_epoch_f64(f);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
        }
    }
    None
}

/// Nanoseconds per unit for an epoch value of the given magnitude.
fn magnitude_scale(abs: f64) -> i128 {
    if abs >= 1e17 {
        1
    } else if abs >= 1e14 {
        1_000
    } else if abs >= 1e11 {
        1_000_000
    } else {
        1_000_000_000
    }
}

fn from_epoch(value: i128, nanos_per_unit: i128) -> Option<DateTime<Utc>> {
    let nanos = value.checked_mul(nanos_per_unit)?;
    let secs = i64::try_from(nanos.div_euclid(1_000_000_000)).ok()?;
    let sub = nanos.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, sub)
}

fn from_epoch_f64(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let scale = magnitude_scale(value.abs());
    from_epoch((value * scale as f64).round() as i128, 1)
}

/// Numeric cell: numbers and numeric strings; anything else becomes NaN.
fn cell_f64(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ohlc_table(index: Option<Vec<Value>>, closes: &[f64]) -> RawTable {
        let col = |off: f64| closes.iter().map(|c| json!(c + off)).collect::<Vec<_>>();
        RawTable::new(index)
            .with_column("Open", col(0.0))
            .with_column("High", col(1.0))
            .with_column("Low", col(-1.0))
            .with_column("Close", col(0.0))
            .with_column("Volume", closes.iter().map(|_| json!(100)).collect())
    }

    // ---- time axis -------------------------------------------------------

    #[test]
    fn promotes_date_column() {
        let table = RawTable::new(None)
            .with_column("Date", vec![json!("2024-01-02"), json!("2024-01-03")])
            .with_column("open", vec![json!(1), json!(2)])
            .with_column("high", vec![json!(1), json!(2)])
            .with_column("low", vec![json!(1), json!(2)])
            .with_column("close", vec![json!(1), json!(2)])
            .with_column("volume", vec![json!(1), json!(2)]);
        let s = normalize(&table).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.timestamps()[0].to_rfc3339(), "2024-01-02T00:00:00+00:00");
    }

    #[test]
    fn positional_index_without_date_column_is_malformed() {
        let table = ohlc_table(None, &[1.0, 2.0]);
        assert!(matches!(normalize(&table), Err(EngineError::MalformedInput(_))));
    }

    #[test]
    fn unparsable_label_is_malformed() {
        let table = ohlc_table(Some(vec![json!("2024-01-02"), json!("not a date")]), &[1.0, 2.0]);
        assert!(matches!(normalize(&table), Err(EngineError::MalformedInput(_))));
    }

    #[test]
    fn local_offsets_are_converted_to_utc() {
        let ts = parse_timestamp(&json!("2024-03-01 09:30:00-05:00")).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T14:30:00+00:00");
        let ts = parse_timestamp(&json!("2024-03-01T09:30:00+01:00")).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T08:30:00+00:00");
    }

    #[test]
    fn epoch_units_are_inferred() {
        let secs = 1_700_000_000_i64;
        for v in [
            json!(secs),
            json!(secs * 1_000),
            json!(secs * 1_000_000),
            json!(secs * 1_000_000_000),
            json!(secs.to_string()),
        ] {
            assert_eq!(parse_timestamp(&v).unwrap().timestamp(), secs, "value {v}");
        }
    }

    // ---- ordering & duplicates ------------------------------------------

    #[test]
    fn sorts_ascending() {
        let index = vec![json!(300), json!(100), json!(200)];
        let s = normalize(&ohlc_table(Some(index), &[3.0, 1.0, 2.0])).unwrap();
        assert_eq!(s.epoch_seconds(), vec![100, 200, 300]);
        assert_eq!(s.close(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn duplicate_timestamp_keeps_last_occurrence() {
        let index = vec![json!(100), json!(200), json!(200)];
        let s = normalize(&ohlc_table(Some(index), &[1.0, 2.0, 2.5])).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.close(), &[1.0, 2.5]);
    }

    #[test]
    fn duplicate_keeps_last_even_when_unsorted() {
        let index = vec![json!(200), json!(100), json!(200)];
        let s = normalize(&ohlc_table(Some(index), &[7.0, 1.0, 9.0])).unwrap();
        assert_eq!(s.close(), &[1.0, 9.0]);
    }

    // ---- cells -----------------------------------------------------------

    #[test]
    fn bad_cells_become_nan_and_volume_is_clamped() {
        let table = RawTable::new(Some(vec![json!(1), json!(2)]))
            .with_column("open", vec![json!(1), json!(1)])
            .with_column("high", vec![json!(2), json!(2)])
            .with_column("low", vec![json!(0), json!(0)])
            .with_column("close", vec![json!("1.5"), Value::Null])
            .with_column("volume", vec![json!(-4), json!("x")]);
        let s = normalize(&table).unwrap();
        assert_eq!(s.close()[0], 1.5);
        assert!(s.close()[1].is_nan());
        assert_eq!(s.volume(), &[0.0, 0.0]);
    }

    #[test]
    fn missing_volume_column_means_zero_volume() {
        let table = RawTable::new(Some(vec![json!(1)]))
            .with_column("open", vec![json!(1)])
            .with_column("high", vec![json!(1)])
            .with_column("low", vec![json!(1)])
            .with_column("close", vec![json!(1)]);
        let s = normalize(&table).unwrap();
        assert_eq!(s.volume(), &[0.0]);
    }

    #[test]
    fn missing_close_is_malformed() {
        let table = RawTable::new(Some(vec![json!(1)]))
            .with_column("open", vec![json!(1)])
            .with_column("high", vec![json!(1)])
            .with_column("low", vec![json!(1)]);
        assert!(normalize(&table).is_err());
    }

    #[test]
    fn ragged_columns_are_malformed() {
        let table = ohlc_table(Some(vec![json!(1), json!(2), json!(3)]), &[1.0, 2.0]);
        assert!(matches!(normalize(&table), Err(EngineError::MalformedInput(_))));
    }

    #[test]
    fn empty_table_with_index_normalizes_to_empty() {
        let s = normalize(&ohlc_table(Some(vec![]), &[])).unwrap();
        assert!(s.is_empty());
    }
}
