//! Graphite lifecycle events
//!
//! Annotates the metrics backend with benchmark boundaries so dashboards can
//! overlay them. Per-execution events are only sent for serial benchmarks;
//! a concurrent run would flood the event store.

use super::BenchmarkListener;
use crate::clients::{GraphiteClient, GraphiteEvent};
use crate::error::BoxError;
use async_trait::async_trait;
use chrono::Utc;
use querybench_core::{
    Benchmark, BenchmarkExecutionResult, Measurement, QueryExecution, QueryExecutionResult,
};

/// Posts lifecycle events to graphite
pub struct GraphiteEventListener {
    client: GraphiteClient,
}

impl GraphiteEventListener {
    /// Create a listener posting through `client`
    pub fn new(client: GraphiteClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BenchmarkListener for GraphiteEventListener {
    fn name(&self) -> &str {
        "graphite"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn benchmark_started(&self, benchmark: &Benchmark) -> Result<(), BoxError> {
        self.client.store_event(&started_event(benchmark)).await?;
        Ok(())
    }

    async fn benchmark_finished(
        &self,
        result: &BenchmarkExecutionResult,
        _measurements: &[Measurement],
    ) -> Result<(), BoxError> {
        self.client.store_event(&finished_event(result)).await?;
        Ok(())
    }

    async fn execution_started(&self, execution: &QueryExecution) -> Result<(), BoxError> {
        if execution.benchmark().is_concurrent() {
            return Ok(());
        }
        self.client
            .store_event(&execution_started_event(execution))
            .await?;
        Ok(())
    }

    async fn execution_finished(
        &self,
        result: &QueryExecutionResult,
        _measurements: &[Measurement],
    ) -> Result<(), BoxError> {
        if result.benchmark().is_concurrent() {
            return Ok(());
        }
        self.client
            .store_event(&execution_finished_event(result))
            .await?;
        Ok(())
    }
}

fn started_event(benchmark: &Benchmark) -> GraphiteEvent {
    GraphiteEvent {
        what: format!("Benchmark {} started", benchmark.unique_name()),
        tags: format!("benchmark started {}", benchmark.environment()),
        data: String::new(),
        when: Utc::now().timestamp(),
    }
}

fn finished_event(result: &BenchmarkExecutionResult) -> GraphiteEvent {
    let benchmark = result.benchmark();
    GraphiteEvent {
        what: format!("Benchmark {} ended", benchmark.unique_name()),
        tags: format!("benchmark ended {}", benchmark.environment()),
        data: format!("successful {}", result.is_successful()),
        when: result.end().unwrap_or_else(Utc::now).timestamp(),
    }
}

fn execution_started_event(execution: &QueryExecution) -> GraphiteEvent {
    let benchmark = execution.benchmark();
    GraphiteEvent {
        what: format!(
            "Benchmark {}, query {} ({}) started",
            benchmark.unique_name(),
            execution.query().name,
            execution.run()
        ),
        tags: format!("execution started {}", benchmark.environment()),
        data: String::new(),
        when: Utc::now().timestamp(),
    }
}

fn execution_finished_event(result: &QueryExecutionResult) -> GraphiteEvent {
    let benchmark = result.benchmark();
    GraphiteEvent {
        what: format!(
            "Benchmark {}, query {} ({}) ended",
            benchmark.unique_name(),
            result.query_name(),
            result.execution().run()
        ),
        tags: format!("execution ended {}", benchmark.environment()),
        data: format!("duration: {} ms", result.duration().as_millis()),
        when: result.end().timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use querybench_core::{
        BenchmarkBuilder, BenchmarkExecutionResultBuilder, Query, QueryExecutionResultBuilder,
    };
    use std::sync::Arc;

    fn benchmark() -> Arc<Benchmark> {
        Arc::new(
            BenchmarkBuilder::new("q1", "seq", vec![Query::new("scan", "SELECT 1")])
                .data_source("trino")
                .environment("ci")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_benchmark_events() {
        let bm = benchmark();
        let started = started_event(&bm);
        assert_eq!(started.what, "Benchmark q1 started");
        assert_eq!(started.tags, "benchmark started ci");

        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 30).unwrap();
        let result = BenchmarkExecutionResultBuilder::new(Arc::clone(&bm))
            .start_timer(end - TimeDelta::seconds(30))
            .end_timer(end)
            .build();
        let finished = finished_event(&result);
        assert_eq!(finished.what, "Benchmark q1 ended");
        assert_eq!(finished.tags, "benchmark ended ci");
        assert_eq!(finished.data, "successful true");
        assert_eq!(finished.when, end.timestamp());
    }

    #[test]
    fn test_execution_events() {
        let bm = benchmark();
        let execution = QueryExecution::new(Arc::clone(&bm), 0, 2, 2);
        assert_eq!(
            execution_started_event(&execution).what,
            "Benchmark q1, query scan (2) started"
        );

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let result = QueryExecutionResultBuilder::started(execution, start)
            .succeeded(start + TimeDelta::milliseconds(1250));
        let finished = execution_finished_event(&result);
        assert_eq!(finished.what, "Benchmark q1, query scan (2) ended");
        assert_eq!(finished.tags, "execution ended ci");
        assert_eq!(finished.data, "duration: 1250 ms");
    }
}
