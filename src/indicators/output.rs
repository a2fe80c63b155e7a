// =============================================================================
// Output Serializer
// =============================================================================
//
// Converts an aligned indicator result into the chart-ready array shape:
//
//   line  -> [{ "time": 1700000000, "value": 101.2 }, ...]
//            bars whose value is NaN / inf are omitted
//   bands -> [{ "time": ..., "basis": .., "upper": .., "lower": .. }, ...]
//            a bar is kept if any component is finite; the others are null
//
// Output never contains non-finite numbers, is never longer than the input,
// and keeps the input's chronological order.
// =============================================================================

use serde::Serialize;

use crate::indicators::registry::IndicatorOutput;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinePoint {
    pub time: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandPoint {
    pub time: i64,
    pub basis: Option<f64>,
    pub upper: Option<f64>,
    pub lower: Option<f64>,
}

/// Serialized indicator, emitted as a bare JSON array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChartSeries {
    Points(Vec<LinePoint>),
    Bands(Vec<BandPoint>),
}

impl ChartSeries {
    /// The soft-fail result: an empty overlay.
    pub fn empty() -> Self {
        Self::Points(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Points(p) => p.len(),
            Self::Bands(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Pair an indicator result with epoch-second timestamps.
pub fn serialize(output: &IndicatorOutput, times: &[i64]) -> ChartSeries {
    match output {
        IndicatorOutput::Line(values) => ChartSeries::Points(
            times
                .iter()
                .zip(values)
                .filter_map(|(&time, &v)| finite(v).map(|value| LinePoint { time, value }))
                .collect(),
        ),
        IndicatorOutput::Bands(bands) => ChartSeries::Bands(
            times
                .iter()
                .enumerate()
                .take(bands.len())
                .filter_map(|(i, &time)| {
                    let point = BandPoint {
                        time,
                        basis: finite(bands.basis[i]),
                        upper: finite(bands.upper[i]),
                        lower: finite(bands.lower[i]),
                    };
                    let has_data =
                        point.basis.is_some() || point.upper.is_some() || point.lower.is_some();
                    has_data.then_some(point)
                })
                .collect(),
        ),
    }
}
