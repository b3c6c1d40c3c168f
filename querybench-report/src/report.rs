//! Report Data Structures

use chrono::{DateTime, Utc};
use querybench_core::{ExecutionFailure, Measurement};
use querybench_stats::DurationSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete suite report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Run metadata
    pub meta: ReportMeta,
    /// One entry per planned benchmark, in execution order
    pub benchmarks: Vec<BenchmarkReport>,
    /// Totals and overall outcome
    pub summary: ReportSummary,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    /// Harness version
    pub version: String,
    /// Report generation time
    pub timestamp: DateTime<Utc>,
    /// Suite sequence id
    pub sequence_id: String,
    /// Environment tag
    pub environment: String,
    /// Host the driver ran on
    pub hostname: Option<String>,
    /// Git commit of the working directory, when available
    pub git_commit: Option<String>,
}

/// Benchmark outcome as seen by the local report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkStatus {
    /// Ran and succeeded
    Ended,
    /// Ran and failed (query, macro, measurement or reporting)
    Failed,
    /// Not started because the suite was truncated
    Skipped,
}

/// Duration statistics in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationMetrics {
    /// Number of measured executions
    pub count: usize,
    /// Mean duration
    pub mean_ms: f64,
    /// Median duration
    pub median_ms: f64,
    /// Standard deviation
    pub std_dev_ms: f64,
    /// Fastest execution
    pub min_ms: f64,
    /// Slowest execution
    pub max_ms: f64,
    /// 90th percentile
    pub p90_ms: f64,
    /// 95th percentile
    pub p95_ms: f64,
    /// 99th percentile
    pub p99_ms: f64,
}

impl From<&DurationSummary> for DurationMetrics {
    fn from(summary: &DurationSummary) -> Self {
        Self {
            count: summary.count,
            mean_ms: summary.mean,
            median_ms: summary.median,
            std_dev_ms: summary.std_dev,
            min_ms: summary.min,
            max_ms: summary.max,
            p90_ms: summary.p90,
            p95_ms: summary.p95,
            p99_ms: summary.p99,
        }
    }
}

/// Individual benchmark entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Definition name
    pub name: String,
    /// Unique name (name + variables)
    pub unique_name: String,
    /// Outcome
    pub status: BenchmarkStatus,
    /// Worker pool size
    pub concurrency: u32,
    /// Measured runs
    pub runs: u32,
    /// Variable values
    pub variables: BTreeMap<String, String>,
    /// First submission
    pub start: Option<DateTime<Utc>>,
    /// Last completion
    pub end: Option<DateTime<Utc>>,
    /// Measured executions
    pub executions: usize,
    /// Failed executions
    pub failed_executions: usize,
    /// Duration statistics over successful executions
    pub durations: Option<DurationMetrics>,
    /// Benchmark-level measurements
    pub measurements: Vec<Measurement>,
    /// Phase failures, reporting failures and the first query failure
    pub failures: Vec<ExecutionFailure>,
}

/// Report summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Planned benchmarks
    pub total_benchmarks: usize,
    /// Benchmarks that ended successfully
    pub ended: usize,
    /// Benchmarks that failed
    pub failed: usize,
    /// Benchmarks skipped by the time limit or a fatal stop
    pub skipped: usize,
    /// Measured executions across the suite
    pub total_executions: usize,
    /// Failed executions across the suite
    pub failed_executions: usize,
    /// Wall-clock suite duration
    pub total_duration_ms: f64,
    /// Suite-level failures (clock drift, suite macros, health check, reporting drain)
    pub suite_failures: Vec<String>,
    /// The suite outcome driving the exit code
    pub successful: bool,
}
