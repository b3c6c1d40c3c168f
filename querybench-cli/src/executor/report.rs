//! Report Building
//!
//! ```text
//! SuiteOutcome + DurationSummary per benchmark
//!              │
//!              ▼
//!   ┌─────────────────────┐
//!   │   BenchmarkReport   │  status, executions, durations, measurements, failures
//!   └──────────┬──────────┘
//!              │
//!              ▼
//!   ┌─────────────────────┐
//!   │     SuiteReport     │  Ready for human/JSON/CSV output
//!   └─────────────────────┘
//! ```

use super::orchestrator::{BenchmarkOutcome, SuiteOutcome};
use querybench_core::{ExecutionFailure, FailureKind};
use querybench_report::{
    BenchmarkReport, BenchmarkStatus, DurationMetrics, ReportMeta, ReportSummary, SuiteReport,
};
use querybench_stats::DurationSummary;

/// Build the local suite report
///
/// `stats` must hold one entry per benchmark outcome, in the same order.
pub fn build_report(
    outcome: &SuiteOutcome,
    stats: &[Option<DurationSummary>],
    meta: ReportMeta,
) -> SuiteReport {
    let mut summary = ReportSummary {
        total_benchmarks: outcome.benchmarks.len(),
        total_duration_ms: outcome.duration.as_secs_f64() * 1000.0,
        suite_failures: outcome
            .failures
            .iter()
            .map(|e| ExecutionFailure::from_error(FailureKind::Unexpected, e).message)
            .collect(),
        successful: outcome.is_successful(),
        ..Default::default()
    };

    let benchmarks = outcome
        .benchmarks
        .iter()
        .zip(stats.iter().chain(std::iter::repeat(&None)))
        .map(|(benchmark, durations)| {
            let entry = benchmark_report(benchmark, durations.as_ref());
            match entry.status {
                BenchmarkStatus::Ended => summary.ended += 1,
                BenchmarkStatus::Failed => summary.failed += 1,
                BenchmarkStatus::Skipped => summary.skipped += 1,
            }
            summary.total_executions += entry.executions;
            summary.failed_executions += entry.failed_executions;
            entry
        })
        .collect();

    SuiteReport {
        meta,
        benchmarks,
        summary,
    }
}

fn benchmark_report(outcome: &BenchmarkOutcome, durations: Option<&DurationSummary>) -> BenchmarkReport {
    let benchmark = outcome.benchmark();
    let mut entry = BenchmarkReport {
        name: benchmark.name().to_string(),
        unique_name: benchmark.unique_name().to_string(),
        status: BenchmarkStatus::Skipped,
        concurrency: benchmark.concurrency(),
        runs: benchmark.runs(),
        variables: benchmark.variables().clone(),
        start: None,
        end: None,
        executions: 0,
        failed_executions: 0,
        durations: durations.map(DurationMetrics::from),
        measurements: Vec::new(),
        failures: Vec::new(),
    };

    let BenchmarkOutcome::Executed(run) = outcome else {
        return entry;
    };
    let result = &run.result;
    entry.status = if run.is_successful() {
        BenchmarkStatus::Ended
    } else {
        BenchmarkStatus::Failed
    };
    entry.start = result.start();
    entry.end = result.end();
    entry.executions = result.executions().len();
    entry.failed_executions = result.failed_executions();
    entry.measurements = run.measurements.clone();
    entry.failures = result
        .failures()
        .iter()
        .chain(&run.post_failures)
        .chain(result.executions().iter().find_map(|e| e.failure()))
        .cloned()
        .collect();
    entry
}
