//! Results service reporting and clock-drift check

use super::BenchmarkListener;
use crate::clients::{
    BenchmarkStartRequest, ExecutionStartRequest, FinishRequest, FinishStatus, ServiceClient,
};
use crate::error::{BoxError, ClockDriftError};
use async_trait::async_trait;
use chrono::Utc;
use querybench_core::{
    Benchmark, BenchmarkExecutionResult, Measurement, QueryExecution, QueryExecutionResult, Unit,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Persists benchmark and execution lifecycles to the results service
pub struct ServiceListener {
    client: ServiceClient,
}

impl ServiceListener {
    /// Create a listener reporting through `client`
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BenchmarkListener for ServiceListener {
    fn name(&self) -> &str {
        "service"
    }

    async fn benchmark_started(&self, benchmark: &Benchmark) -> Result<(), BoxError> {
        self.client
            .start_benchmark(
                benchmark.unique_name(),
                benchmark.sequence_id(),
                &start_request(benchmark),
            )
            .await?;
        Ok(())
    }

    async fn benchmark_finished(
        &self,
        result: &BenchmarkExecutionResult,
        measurements: &[Measurement],
    ) -> Result<(), BoxError> {
        let benchmark = result.benchmark();
        self.client
            .finish_benchmark(
                benchmark.unique_name(),
                benchmark.sequence_id(),
                &benchmark_finish_request(result, measurements),
            )
            .await?;
        Ok(())
    }

    async fn execution_started(&self, execution: &QueryExecution) -> Result<(), BoxError> {
        let benchmark = execution.benchmark();
        self.client
            .start_execution(
                benchmark.unique_name(),
                benchmark.sequence_id(),
                execution.sequence_id(),
                &ExecutionStartRequest::default(),
            )
            .await?;
        Ok(())
    }

    async fn execution_finished(
        &self,
        result: &QueryExecutionResult,
        measurements: &[Measurement],
    ) -> Result<(), BoxError> {
        let benchmark = result.benchmark();
        self.client
            .finish_execution(
                benchmark.unique_name(),
                benchmark.sequence_id(),
                result.execution().sequence_id(),
                &execution_finish_request(result, measurements),
            )
            .await?;
        Ok(())
    }

    async fn concurrency_test_finished(
        &self,
        benchmark: &Benchmark,
        executions: &[QueryExecutionResult],
    ) -> Result<(), BoxError> {
        let (Some(first), Some(request)) =
            (executions.first(), concurrency_finish_request(executions))
        else {
            return Ok(());
        };
        let sequence_id = first.execution().sequence_id();
        self.client
            .start_execution(
                benchmark.unique_name(),
                benchmark.sequence_id(),
                sequence_id,
                &ExecutionStartRequest::default(),
            )
            .await?;
        self.client
            .finish_execution(
                benchmark.unique_name(),
                benchmark.sequence_id(),
                sequence_id,
                &request,
            )
            .await?;
        Ok(())
    }
}

fn start_request(benchmark: &Benchmark) -> BenchmarkStartRequest {
    let queries: Vec<&str> = benchmark.queries().iter().map(|q| q.name.as_str()).collect();
    BenchmarkStartRequest {
        name: benchmark.name().to_string(),
        environment_name: benchmark.environment().to_string(),
        variables: benchmark.variables().clone(),
        attributes: BTreeMap::from([
            ("dataSource".to_string(), benchmark.data_source().to_string()),
            ("runs".to_string(), benchmark.runs().to_string()),
            ("prewarmRuns".to_string(), benchmark.prewarm_runs().to_string()),
            ("concurrency".to_string(), benchmark.concurrency().to_string()),
            ("queries".to_string(), queries.join(",")),
        ]),
    }
}

fn benchmark_finish_request(
    result: &BenchmarkExecutionResult,
    measurements: &[Measurement],
) -> FinishRequest {
    let mut attributes = BTreeMap::new();
    // Concurrent runs are stored as one aggregated execution; no single statement describes them
    if result.benchmark().is_serial() {
        if let Some(statement) = result.executions().first().and_then(|e| e.statement()) {
            attributes.insert("statement".to_string(), statement.to_string());
        }
    }
    let first_failure = result
        .failures()
        .first()
        .or_else(|| result.executions().iter().find_map(|e| e.failure()));
    if let Some(failure) = first_failure {
        attributes.insert("failureMessage".to_string(), failure.message.clone());
    }

    FinishRequest {
        status: FinishStatus::from_success(result.is_successful()),
        end_time: result.end().unwrap_or_else(Utc::now),
        measurements: measurements.to_vec(),
        attributes,
    }
}

fn execution_finish_request(
    result: &QueryExecutionResult,
    measurements: &[Measurement],
) -> FinishRequest {
    let mut attributes = BTreeMap::new();
    if let Some(id) = result.correlation_id() {
        attributes.insert("queryId".to_string(), id.to_string());
    }
    if let Some(failure) = result.failure() {
        attributes.insert("failureMessage".to_string(), failure.message.clone());
    }

    FinishRequest {
        status: FinishStatus::from_success(result.is_successful()),
        end_time: result.end(),
        measurements: measurements.to_vec(),
        attributes,
    }
}

fn concurrency_finish_request(executions: &[QueryExecutionResult]) -> Option<FinishRequest> {
    let end_time = executions.iter().map(|e| e.end()).max()?;
    let successful = executions.iter().filter(|e| e.is_successful()).count();
    let order: Vec<&str> = executions.iter().map(|e| e.query_name()).collect();

    Some(FinishRequest {
        status: FinishStatus::Ended,
        end_time,
        measurements: vec![
            Measurement::new("queries_successful", Unit::None, successful as f64),
            Measurement::new(
                "queries_failed",
                Unit::None,
                (executions.len() - successful) as f64,
            ),
        ],
        attributes: BTreeMap::from([("queries_order".to_string(), order.join(","))]),
    })
}

/// Compare the local clock against the results service.
///
/// Returns the drift lower bound when it is within `tolerance`.
pub async fn check_clock_drift(
    client: &ServiceClient,
    tolerance: Duration,
) -> Result<Duration, ClockDriftError> {
    let before = Utc::now().timestamp_millis();
    let service = client.current_time_millis().await?;
    let after = Utc::now().timestamp_millis();

    let drift = drift_lower_bound(before, service, after);
    debug!("clock drift against results service: at least {:?}", drift);
    if drift > tolerance {
        return Err(ClockDriftError::Exceeded { drift, tolerance });
    }
    Ok(drift)
}

/// Smallest drift consistent with a service reading taken between `before` and `after`
fn drift_lower_bound(before: i64, service: i64, after: i64) -> Duration {
    let mean = before + (after - before) / 2;
    let approximation = (mean - service).abs();
    let precision = after - mean;
    Duration::from_millis(u64::try_from(approximation - precision).unwrap_or(0))
}
