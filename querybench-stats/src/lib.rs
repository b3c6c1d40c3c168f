#![warn(missing_docs)]
//! QueryBench Statistics
//!
//! Small numeric toolkit used after a suite run:
//! - Duration summaries (mean, median, stddev, percentiles) for the local report
//! - Monitoring time-series summaries (mean, max, last positive value) for
//!   cluster metrics, with null-datapoint detection

mod percentiles;
mod series;
mod summary;

pub use percentiles::{Percentiles, compute_percentile, compute_percentiles};
pub use series::{IncompleteSeries, SeriesSummary, last_positive, require_complete, summarize_series};
pub use summary::{DurationSummary, summarize_durations};
