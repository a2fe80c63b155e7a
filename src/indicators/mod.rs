// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator math over a normalized `OhlcvSeries`.
// `compute` is the display path: code + series + params -> chart array.
// Math failures degrade to an empty overlay; only an unknown code is
// reported back to the caller.

pub mod output;
pub mod primitives;
pub mod registry;
pub mod stops;
pub mod trend;
pub mod volatility;

pub use output::ChartSeries;
pub use registry::{catalog, IndicatorFamily, IndicatorKind, IndicatorOutput};

use tracing::{debug, warn};

use crate::error::EngineError;
use crate::market_data::{normalizer, RawTable};
use crate::types::{OhlcvSeries, ParamSet};

/// Compute one indicator over a normalized series and serialize it.
///
/// # Errors
/// `UnknownIndicator` when `code` is not registered.  Every other failure
/// yields `Ok` with an empty series.
pub fn compute(
    code: &str,
    series: &OhlcvSeries,
    params: &ParamSet,
) -> Result<ChartSeries, EngineError> {
    let kind: IndicatorKind = code.parse()?;
    Ok(compute_kind(kind, series, params))
}

fn compute_kind(kind: IndicatorKind, series: &OhlcvSeries, params: &ParamSet) -> ChartSeries {
    if series.is_empty() {
        return ChartSeries::empty();
    }
    match kind.compute(series, params) {
        Ok(out) => {
            let chart = output::serialize(&out, &series.epoch_seconds());
            debug!(indicator = %kind, bars = series.len(), points = chart.len(), "indicator computed");
            chart
        }
        Err(e) => {
            warn!(indicator = %kind, error = %e, "indicator math failed, returning empty overlay");
            ChartSeries::empty()
        }
    }
}

/// Normalize a raw table, then compute.  A table that cannot be normalized
/// yields an empty series.
pub fn compute_from_table(
    code: &str,
    table: &RawTable,
    params: &ParamSet,
) -> Result<ChartSeries, EngineError> {
    let kind: IndicatorKind = code.parse()?;
    match normalizer::normalize(table) {
        Ok(series) => compute(kind.code(), &series, params),
        Err(e) => {
            warn!(indicator = %kind, error = %e, "input table rejected, returning empty overlay");
            Ok(ChartSeries::empty())
        }
    }
}
