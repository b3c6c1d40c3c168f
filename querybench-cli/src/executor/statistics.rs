//! Statistics Computation
//!
//! Per-benchmark duration summaries for the local report, computed in
//! parallel with Rayon. Only successful executions are sampled; skipped
//! benchmarks and benchmarks without a successful execution get `None`.

use super::orchestrator::BenchmarkOutcome;
use querybench_stats::{DurationSummary, summarize_durations};
use rayon::prelude::*;

/// Summarize execution durations (milliseconds), one entry per outcome
pub fn compute_statistics(outcomes: &[BenchmarkOutcome]) -> Vec<Option<DurationSummary>> {
    outcomes
        .par_iter()
        .map(|outcome| {
            let BenchmarkOutcome::Executed(run) = outcome else {
                return None;
            };
            let samples: Vec<f64> = run
                .result
                .executions()
                .iter()
                .filter(|e| e.is_successful())
                .map(|e| e.duration().as_secs_f64() * 1000.0)
                .collect();
            (!samples.is_empty()).then(|| summarize_durations(&samples))
        })
        .collect()
}
