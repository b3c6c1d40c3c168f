//! Output Formatting
//!
//! Human-readable rendering of a suite report:
//! - One block per benchmark with a status icon (✓/✗/⊘)
//! - Duration statistics over successful executions
//! - Benchmark-level measurements and failure causes
//! - Suite summary with suite-level failures

use querybench_report::{BenchmarkStatus, SuiteReport};

/// Format a report for terminal display
pub fn format_human_output(report: &SuiteReport) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str(&format!(
        "QueryBench Results ({} @ {})\n",
        report.meta.sequence_id, report.meta.environment
    ));
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");

    for benchmark in &report.benchmarks {
        let status_icon = match benchmark.status {
            BenchmarkStatus::Ended => "✓",
            BenchmarkStatus::Failed => "✗",
            BenchmarkStatus::Skipped => "⊘",
        };
        output.push_str(&format!("  {} {}\n", status_icon, benchmark.unique_name));

        if benchmark.status == BenchmarkStatus::Skipped {
            output.push_str("      skipped\n\n");
            continue;
        }

        output.push_str(&format!(
            "      executions: {}  failed: {}  concurrency: {}\n",
            benchmark.executions, benchmark.failed_executions, benchmark.concurrency
        ));
        if let Some(d) = &benchmark.durations {
            output.push_str(&format!(
                "      mean: {:.2} ms  median: {:.2} ms  stddev: {:.2} ms\n",
                d.mean_ms, d.median_ms, d.std_dev_ms
            ));
            output.push_str(&format!(
                "      min: {:.2} ms  max: {:.2} ms  p95: {:.2} ms  p99: {:.2} ms\n",
                d.min_ms, d.max_ms, d.p95_ms, d.p99_ms
            ));
        }
        for measurement in &benchmark.measurements {
            output.push_str(&format!(
                "      {}: {:.2} {}\n",
                measurement.name, measurement.value, measurement.unit
            ));
        }
        for failure in &benchmark.failures {
            output.push_str(&format!("      error: {}\n", failure));
        }
        output.push('\n');
    }

    let summary = &report.summary;
    output.push_str(&"-".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "Summary: {} ended, {} failed, {} skipped ({} benchmarks)\n",
        summary.ended, summary.failed, summary.skipped, summary.total_benchmarks
    ));
    output.push_str(&format!(
        "Executions: {} ({} failed) in {:.1} s\n",
        summary.total_executions,
        summary.failed_executions,
        summary.total_duration_ms / 1000.0
    ));
    for failure in &summary.suite_failures {
        output.push_str(&format!("Suite failure: {}\n", failure));
    }
    output.push_str(if summary.successful {
        "Suite succeeded\n"
    } else {
        "Suite FAILED\n"
    });

    output
}
