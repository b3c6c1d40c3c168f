//! Lifecycle logging

use super::BenchmarkListener;
use crate::error::BoxError;
use async_trait::async_trait;
use querybench_core::{
    Benchmark, BenchmarkExecutionResult, Measurement, QueryExecution, QueryExecutionResult,
};
use tracing::{debug, info, warn};

/// Logs every lifecycle event; notified before any other listener
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

#[async_trait]
impl BenchmarkListener for LoggingListener {
    fn name(&self) -> &str {
        "logging"
    }

    fn priority(&self) -> i32 {
        -100
    }

    async fn benchmark_started(&self, benchmark: &Benchmark) -> Result<(), BoxError> {
        info!(
            "Benchmark {} started ({} queries × {} runs, concurrency {})",
            benchmark.unique_name(),
            benchmark.queries().len(),
            benchmark.runs(),
            benchmark.concurrency()
        );
        Ok(())
    }

    async fn benchmark_finished(
        &self,
        result: &BenchmarkExecutionResult,
        measurements: &[Measurement],
    ) -> Result<(), BoxError> {
        let benchmark = result.benchmark();
        if result.is_successful() {
            info!(
                "Benchmark {} ended: {} executions in {:?}",
                benchmark.unique_name(),
                result.executions().len(),
                result.duration().unwrap_or_default()
            );
        } else {
            warn!(
                "Benchmark {} failed: {} of {} executions failed, {} phase failures",
                benchmark.unique_name(),
                result.failed_executions(),
                result.executions().len(),
                result.failures().len()
            );
            for failure in result.failures() {
                warn!("  {}", failure);
            }
        }
        for measurement in measurements {
            debug!("  {}", measurement);
        }
        Ok(())
    }

    async fn execution_started(&self, execution: &QueryExecution) -> Result<(), BoxError> {
        debug!(
            "Query {} ({}) of {} started",
            execution.query().name,
            execution.run(),
            execution.benchmark().unique_name()
        );
        Ok(())
    }

    async fn execution_finished(
        &self,
        result: &QueryExecutionResult,
        measurements: &[Measurement],
    ) -> Result<(), BoxError> {
        match result.failure() {
            None => debug!(
                "Query {} ({}) finished in {:?}, {} rows",
                result.query_name(),
                result.execution().run(),
                result.duration(),
                result.rows()
            ),
            Some(failure) => warn!(
                "Query {} ({}) failed: {}",
                result.query_name(),
                result.execution().run(),
                failure
            ),
        }
        for measurement in measurements {
            debug!("  {}", measurement);
        }
        Ok(())
    }

    async fn concurrency_test_finished(
        &self,
        benchmark: &Benchmark,
        executions: &[QueryExecutionResult],
    ) -> Result<(), BoxError> {
        let failed = executions.iter().filter(|e| !e.is_successful()).count();
        info!(
            "Concurrency test {} finished: {} executions, {} failed",
            benchmark.unique_name(),
            executions.len(),
            failed
        );
        Ok(())
    }
}
