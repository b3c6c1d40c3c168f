//! Duration Summary
//!
//! Per-benchmark summary of query durations (milliseconds) shown in the local
//! suite report.

use crate::percentiles::compute_percentiles;

/// Summary of one benchmark's execution durations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DurationSummary {
    /// Number of samples
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Median
    pub median: f64,
    /// Sample standard deviation (n - 1)
    pub std_dev: f64,
    /// Fastest sample
    pub min: f64,
    /// Slowest sample
    pub max: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
}

impl DurationSummary {
    /// Relative standard deviation in percent
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean == 0.0 {
            0.0
        } else {
            self.std_dev / self.mean * 100.0
        }
    }
}

/// Summarize durations; an empty slice gives an all-zero summary
pub fn summarize_durations(samples: &[f64]) -> DurationSummary {
    if samples.is_empty() {
        return DurationSummary::default();
    }

    let count = samples.len();
    let mean = samples.iter().sum::<f64>() / count as f64;
    let std_dev = if count < 2 {
        0.0
    } else {
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    };
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let percentiles = compute_percentiles(samples);

    DurationSummary {
        count,
        mean,
        median: percentiles.p50,
        std_dev,
        min,
        max,
        p90: percentiles.p90,
        p95: percentiles.p95,
        p99: percentiles.p99,
    }
}
