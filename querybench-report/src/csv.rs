//! CSV Output

use crate::report::{BenchmarkStatus, SuiteReport};

/// Generate a CSV report with one row per benchmark
pub fn generate_csv_report(report: &SuiteReport) -> String {
    let mut output = String::from(
        "unique_name,status,concurrency,executions,failed_executions,mean_ms,median_ms,p95_ms,min_ms,max_ms\n",
    );

    for benchmark in &report.benchmarks {
        let status = match benchmark.status {
            BenchmarkStatus::Ended => "ended",
            BenchmarkStatus::Failed => "failed",
            BenchmarkStatus::Skipped => "skipped",
        };
        let timing = match &benchmark.durations {
            Some(d) => format!(
                "{:.3},{:.3},{:.3},{:.3},{:.3}",
                d.mean_ms, d.median_ms, d.p95_ms, d.min_ms, d.max_ms
            ),
            None => ",,,,".to_string(),
        };
        output.push_str(&format!(
            "{},{},{},{},{},{}\n",
            escape(&benchmark.unique_name),
            status,
            benchmark.concurrency,
            benchmark.executions,
            benchmark.failed_executions,
            timing
        ));
    }

    output
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
