//! Benchmark Execution
//!
//! Runs one expanded benchmark end to end:
//!
//! ```text
//! before_benchmark macros ──✗──▶ failed result, no events
//!         │
//!      prewarm (failures logged only)
//!         │
//!   benchmark_started (joined)
//!         │
//!   ┌─────┴──────────────────────────────────────┐
//!   │ worker × concurrency, shared queue          │
//!   │  connect ▶ before_execution ▶ statement     │
//!   │          ▶ after_execution ▶ result         │
//!   │  (serial: execution events, deferred)       │
//!   └─────┬──────────────────────────────────────┘
//!         │
//!   concurrency_test_finished (concurrent only)
//!         │
//!   after_benchmark macros ──✗──▶ result failed, executions kept
//!         │
//!   benchmark measurements ▶ benchmark_finished (joined) ▶ reap
//! ```
//!
//! A failing query only marks its own result; siblings keep running.

use crate::error::{MacroError, ReportingError};
use crate::listeners::{Notification, ReportingDispatcher};
use crate::macros::{BorrowedConnection, MacroDispatcher};
use crate::measurements::MeasurementAggregator;
use crate::sql::{Connection, DataSources};
use chrono::Utc;
use parking_lot::Mutex;
use querybench_core::{
    Benchmark, BenchmarkExecutionResult, BenchmarkExecutionResultBuilder, ExecutionFailure,
    FailureKind, Measurable, Measurement, QueryExecution, QueryExecutionResult,
    QueryExecutionResultBuilder,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Everything one benchmark produced
#[derive(Debug, Clone)]
pub struct BenchmarkRun {
    /// The benchmark result as reported to listeners
    pub result: Arc<BenchmarkExecutionResult>,
    /// Benchmark-level measurements
    pub measurements: Vec<Measurement>,
    /// Measurement and reporting failures raised after the result was built
    pub post_failures: Vec<ExecutionFailure>,
}

impl BenchmarkRun {
    fn new(result: BenchmarkExecutionResult) -> Self {
        Self {
            result: Arc::new(result),
            measurements: Vec::new(),
            post_failures: Vec::new(),
        }
    }

    /// The result succeeded and so did everything reported about it
    pub fn is_successful(&self) -> bool {
        self.result.is_successful() && self.post_failures.is_empty()
    }
}

/// Executes single benchmarks
#[derive(Clone)]
pub struct BenchmarkExecutionDriver {
    data_sources: DataSources,
    macros: MacroDispatcher,
    measurements: MeasurementAggregator,
    reporting: ReportingDispatcher,
}

impl BenchmarkExecutionDriver {
    /// Create a driver over the given registries
    pub fn new(
        data_sources: DataSources,
        macros: MacroDispatcher,
        measurements: MeasurementAggregator,
        reporting: ReportingDispatcher,
    ) -> Self {
        Self {
            data_sources,
            macros,
            measurements,
            reporting,
        }
    }

    /// Run `benchmark`; failures are captured in the returned run, never raised
    pub async fn execute(&self, benchmark: &Arc<Benchmark>) -> BenchmarkRun {
        info!("Executing benchmark {}", benchmark);

        if let Err(err) = self
            .macros
            .run_phase(
                "before_benchmark",
                benchmark.before_benchmark_macros(),
                Some(benchmark.as_ref()),
                None,
            )
            .await
        {
            error!("Before benchmark macros of {} failed: {}", benchmark.unique_name(), err);
            return BenchmarkRun::new(
                BenchmarkExecutionResultBuilder::new(Arc::clone(benchmark))
                    .failure(ExecutionFailure::from_error(FailureKind::Macro, &err))
                    .build(),
            );
        }

        self.prewarm(benchmark).await;

        let mut post_failures = Vec::new();
        record(&mut post_failures, self.reporting.benchmark_started(benchmark).await);

        let start = Utc::now();
        let (executions, worker_failures) = self.run_executions(benchmark).await;
        let end = Utc::now();

        let executions = Arc::new(executions);
        if benchmark.is_concurrent() {
            record(
                &mut post_failures,
                self.reporting
                    .concurrency_test_finished(benchmark, &executions)
                    .await,
            );
        }

        let mut builder = BenchmarkExecutionResultBuilder::new(Arc::clone(benchmark))
            .start_timer(start)
            .end_timer(end)
            .executions(Arc::unwrap_or_clone(executions));
        for failure in worker_failures {
            builder = builder.failure(failure);
        }
        if let Err(err) = self
            .macros
            .run_phase(
                "after_benchmark",
                benchmark.after_benchmark_macros(),
                Some(benchmark.as_ref()),
                None,
            )
            .await
        {
            error!("After benchmark macros of {} failed: {}", benchmark.unique_name(), err);
            builder = builder.failure(ExecutionFailure::from_error(FailureKind::Macro, &err));
        }
        let result = Arc::new(builder.build());

        let measurements = match self
            .measurements
            .collect(Measurable::Benchmark(Arc::clone(&result)))
            .await
        {
            Ok(measurements) => {
                let measurements = Arc::new(measurements);
                record(
                    &mut post_failures,
                    self.reporting.benchmark_finished(&result, &measurements).await,
                );
                Arc::unwrap_or_clone(measurements)
            }
            Err(err) => {
                error!("Measurements of {} failed: {}", benchmark.unique_name(), err);
                post_failures.push(ExecutionFailure::from_error(FailureKind::Measurement, &err));
                Vec::new()
            }
        };

        record(
            &mut post_failures,
            self.reporting.reap_finished(benchmark.unique_name()).await,
        );

        BenchmarkRun {
            result,
            measurements,
            post_failures,
        }
    }

    /// Run every query `prewarm_runs` times; nothing is reported or counted
    async fn prewarm(&self, benchmark: &Arc<Benchmark>) {
        for run in 0..benchmark.prewarm_runs() {
            for index in 0..benchmark.queries().len() {
                let execution = QueryExecution::new(Arc::clone(benchmark), index, run, 0);
                let outcome = match self.data_sources.connect(execution.data_source()).await {
                    Ok(mut connection) => run_statement(connection.as_mut(), &execution)
                        .await
                        .map(|_| ()),
                    Err(err) => Err(ExecutionFailure::from_error(FailureKind::Unexpected, &err)),
                };
                if let Err(failure) = outcome {
                    warn!(
                        "Prewarm {} of query {} failed: {}",
                        run + 1,
                        execution.query().name,
                        failure
                    );
                }
            }
        }
    }

    /// Run all measured executions on `concurrency` workers.
    ///
    /// Results come back in sequence-id order; a worker that dies is a
    /// benchmark-level failure.
    async fn run_executions(
        &self,
        benchmark: &Arc<Benchmark>,
    ) -> (Vec<QueryExecutionResult>, Vec<ExecutionFailure>) {
        let queries = benchmark.queries().len();
        let queue: VecDeque<QueryExecution> = (0..benchmark.runs())
            .flat_map(|run| {
                (0..queries).map(move |index| (run, index))
            })
            .map(|(run, index)| {
                let sequence_id = run * queries as u32 + index as u32;
                QueryExecution::new(Arc::clone(benchmark), index, run, sequence_id)
            })
            .collect();
        let queue = Arc::new(Mutex::new(queue));

        let workers: Vec<_> = (0..benchmark.concurrency())
            .map(|worker| {
                let driver = self.clone();
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let mut done = Vec::new();
                    loop {
                        let next = queue.lock().pop_front();
                        let Some(execution) = next else { break };
                        done.push(driver.run_execution(execution).await);
                    }
                    debug!(worker, "worker finished {} executions", done.len());
                    done
                })
            })
            .collect();

        let mut executions = Vec::with_capacity(benchmark.total_executions());
        let mut failures = Vec::new();
        for outcome in futures::future::join_all(workers).await {
            match outcome {
                Ok(done) => executions.extend(done),
                Err(err) => {
                    error!("Worker of {} aborted: {}", benchmark.unique_name(), err);
                    failures.push(ExecutionFailure::from_error(FailureKind::Unexpected, &err));
                }
            }
        }
        executions.sort_by_key(|e| e.execution().sequence_id());
        (executions, failures)
    }

    async fn run_execution(&self, execution: QueryExecution) -> QueryExecutionResult {
        let benchmark = Arc::clone(execution.benchmark());
        let query_name = execution.query().name.clone();
        let run = execution.run();

        let mut connection = match self.data_sources.connect(execution.data_source()).await {
            Ok(connection) => connection,
            Err(err) => {
                let now = Utc::now();
                return QueryExecutionResultBuilder::started(execution, now)
                    .failed(now, ExecutionFailure::from_error(FailureKind::Unexpected, &err));
            }
        };

        if let Err(err) = self
            .macros
            .run_phase(
                "before_execution",
                benchmark.before_execution_macros(),
                Some(benchmark.as_ref()),
                Some(BorrowedConnection::new(
                    execution.data_source(),
                    connection.as_mut(),
                )),
            )
            .await
        {
            let now = Utc::now();
            return QueryExecutionResultBuilder::started(execution, now)
                .failed(now, macro_failure(&err));
        }

        let started = benchmark
            .is_serial()
            .then(|| self.reporting.execution_started(&execution));

        let start = Utc::now();
        let outcome = run_statement(connection.as_mut(), &execution).await;
        let end = Utc::now();

        let after = self
            .macros
            .run_phase(
                "after_execution",
                benchmark.after_execution_macros(),
                Some(benchmark.as_ref()),
                Some(BorrowedConnection::new(
                    execution.data_source(),
                    connection.as_mut(),
                )),
            )
            .await;
        drop(connection);

        let mut builder = QueryExecutionResultBuilder::started(execution, start);
        let failure = match outcome {
            Ok(statement) => {
                builder = builder
                    .statement(statement.sql)
                    .rows(statement.rows)
                    .correlation_id(statement.correlation_id);
                after.err().map(|err| macro_failure(&err))
            }
            Err(failure) => Some(failure),
        };
        let result = match failure {
            None => builder.succeeded(end),
            Some(failure) => {
                warn!(
                    "Query {} ({}) of {} failed: {}",
                    query_name,
                    run,
                    benchmark.unique_name(),
                    failure
                );
                builder.failed(end, failure)
            }
        };

        if let Some(started) = started {
            let result = Arc::new(result.clone());
            self.defer_execution_report(started, result);
        }
        result
    }

    /// Chain execution started ▶ measurements ▶ execution finished in the background
    fn defer_execution_report(&self, started: Notification, result: Arc<QueryExecutionResult>) {
        let measurements = self.measurements.clone();
        let reporting = self.reporting.clone();
        let benchmark = result.execution().benchmark().unique_name().to_string();
        self.reporting.defer(&benchmark, async move {
            started.join().await?;
            let collected = measurements
                .collect(Measurable::Execution(Arc::clone(&result)))
                .await?;
            reporting
                .execution_finished(&result, &Arc::new(collected))
                .await
        });
    }
}

struct ExecutedStatement {
    sql: String,
    rows: u64,
    correlation_id: Option<String>,
}

/// Render and run the execution's statement on `connection`
async fn run_statement(
    connection: &mut dyn Connection,
    execution: &QueryExecution,
) -> Result<ExecutedStatement, ExecutionFailure> {
    let sql = execution
        .render_statement()
        .map_err(|err| ExecutionFailure::from_error(FailureKind::Query, &err))?;
    let outcome = connection
        .execute(&sql)
        .await
        .map_err(|err| ExecutionFailure::from_error(FailureKind::Query, &err))?;
    Ok(ExecutedStatement {
        sql,
        rows: outcome.rows,
        correlation_id: outcome.correlation_id,
    })
}

fn macro_failure(err: &MacroError) -> ExecutionFailure {
    ExecutionFailure::from_error(FailureKind::Macro, err)
}

fn record(failures: &mut Vec<ExecutionFailure>, outcome: Result<(), ReportingError>) {
    if let Err(err) = outcome {
        error!("Reporting failed: {}", err);
        failures.push(ExecutionFailure::from_error(FailureKind::Reporting, &err));
    }
}
