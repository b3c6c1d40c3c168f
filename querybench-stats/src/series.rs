//! Monitoring Time Series
//!
//! Monitoring backends answer range queries with one series of
//! `[value, timestamp]` points per target. A `null` value means the bucket had
//! no data yet; such a series cannot be trusted and must be re-queried.

use thiserror::Error;

/// A series contained a null datapoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("null datapoint at index {index}")]
pub struct IncompleteSeries {
    /// Index of the first null datapoint
    pub index: usize,
}

/// Mean/max/min of a complete series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSummary {
    /// Number of datapoints
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Largest value
    pub max: f64,
    /// Smallest value
    pub min: f64,
}

/// Reject series with null datapoints
pub fn require_complete(points: &[Option<f64>]) -> Result<Vec<f64>, IncompleteSeries> {
    points
        .iter()
        .enumerate()
        .map(|(index, point)| point.ok_or(IncompleteSeries { index }))
        .collect()
}

/// Summarize a series; `None` when it has no datapoints
pub fn summarize_series(values: &[f64]) -> Option<SeriesSummary> {
    if values.is_empty() {
        return None;
    }
    Some(SeriesSummary {
        count: values.len(),
        mean: values.iter().sum::<f64>() / values.len() as f64,
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
    })
}

/// Last value greater than zero, or `0.0`.
///
/// Cumulative series (e.g. `integral(...)`) carry their total in the last
/// populated bucket.
pub fn last_positive(values: &[f64]) -> f64 {
    values.iter().rev().copied().find(|v| *v > 0.0).unwrap_or(0.0)
}
