//! Executions and Results
//!
//! ```text
//! Benchmark ──► QueryExecution (one attempt, before it runs)
//!                     │
//!                     ▼
//!              QueryExecutionResult (timing, rows, failure, correlation id)
//!                     │  × runs × queries
//!                     ▼
//!              BenchmarkExecutionResult (all executions + phase failures)
//! ```
//!
//! Unit-level failures are captured as [`ExecutionFailure`] values instead of
//! being propagated, so one failing query never aborts its siblings.

use crate::benchmark::{Benchmark, Query};
use crate::error::TemplateError;
use crate::template::render_template;
use crate::{BENCHMARK_NAME_VARIABLE, EXECUTION_SEQUENCE_ID_VARIABLE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Category of a captured failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The SQL statement failed or could not be prepared
    Query,
    /// A macro phase failed
    Macro,
    /// Post-execution measurement collection failed
    Measurement,
    /// A lifecycle listener failed
    Reporting,
    /// Anything else (connection, panicked task)
    Unexpected,
}

/// A failure captured into the data model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    /// Failure category
    pub kind: FailureKind,
    /// Message including the source chain
    pub message: String,
}

impl ExecutionFailure {
    /// Create a failure from a message
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Capture an error together with its `source()` chain
    pub fn from_error(kind: FailureKind, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self { kind, message }
    }
}

impl std::fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// One query attempt, identified before it runs
#[derive(Debug, Clone)]
pub struct QueryExecution {
    benchmark: Arc<Benchmark>,
    query_index: usize,
    run: u32,
    sequence_id: u32,
}

impl QueryExecution {
    /// Identify the attempt of query `query_index` in run `run`.
    /// An out-of-range index is clamped to the last query.
    pub fn new(benchmark: Arc<Benchmark>, query_index: usize, run: u32, sequence_id: u32) -> Self {
        let query_index = query_index.min(benchmark.queries().len().saturating_sub(1));
        Self {
            benchmark,
            query_index,
            run,
            sequence_id,
        }
    }

    /// Owning benchmark
    pub fn benchmark(&self) -> &Arc<Benchmark> {
        &self.benchmark
    }

    /// Query being executed
    pub fn query(&self) -> &Query {
        &self.benchmark.queries()[self.query_index]
    }

    /// Index of the query within the benchmark
    pub fn query_index(&self) -> usize {
        self.query_index
    }

    /// Run number (0-based)
    pub fn run(&self) -> u32 {
        self.run
    }

    /// Sequence number within the benchmark (0-based, submission order)
    pub fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    /// Data source the statement must run on
    pub fn data_source(&self) -> &str {
        self.query()
            .data_source()
            .unwrap_or_else(|| self.benchmark.data_source())
    }

    /// Render the SQL text with the benchmark variables, the benchmark name
    /// and this execution's sequence id
    pub fn render_statement(&self) -> Result<String, TemplateError> {
        let mut variables = self.benchmark.variables().clone();
        variables.insert(
            BENCHMARK_NAME_VARIABLE.to_string(),
            self.benchmark.name().to_string(),
        );
        variables.insert(
            EXECUTION_SEQUENCE_ID_VARIABLE.to_string(),
            self.sequence_id.to_string(),
        );
        render_template(&self.query().sql_template, &variables)
    }
}

/// Outcome of one [`QueryExecution`]
#[derive(Debug, Clone)]
pub struct QueryExecutionResult {
    execution: QueryExecution,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    rows: u64,
    statement: Option<String>,
    correlation_id: Option<String>,
    failure: Option<ExecutionFailure>,
}

impl QueryExecutionResult {
    /// The execution this result belongs to
    pub fn execution(&self) -> &QueryExecution {
        &self.execution
    }

    /// Owning benchmark
    pub fn benchmark(&self) -> &Arc<Benchmark> {
        self.execution.benchmark()
    }

    /// Query name
    pub fn query_name(&self) -> &str {
        &self.execution.query().name
    }

    /// Wall-clock start
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Wall-clock end, never before `start`
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// `end - start`
    pub fn duration(&self) -> Duration {
        (self.end - self.start).to_std().unwrap_or_default()
    }

    /// Rows returned or affected
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Rendered SQL, absent when rendering failed
    pub fn statement(&self) -> Option<&str> {
        self.statement.as_deref()
    }

    /// Engine-side query identifier
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Failure cause, absent on success
    pub fn failure(&self) -> Option<&ExecutionFailure> {
        self.failure.as_ref()
    }

    /// No failure recorded
    pub fn is_successful(&self) -> bool {
        self.failure.is_none()
    }
}

/// Collects the pieces of a [`QueryExecutionResult`] while the query runs
#[derive(Debug, Clone)]
pub struct QueryExecutionResultBuilder {
    execution: QueryExecution,
    start: DateTime<Utc>,
    rows: u64,
    statement: Option<String>,
    correlation_id: Option<String>,
}

impl QueryExecutionResultBuilder {
    /// Start timing `execution` at `start`
    pub fn started(execution: QueryExecution, start: DateTime<Utc>) -> Self {
        Self {
            execution,
            start,
            rows: 0,
            statement: None,
            correlation_id: None,
        }
    }

    /// Record the rendered statement
    pub fn statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    /// Record the row count
    pub fn rows(mut self, rows: u64) -> Self {
        self.rows = rows;
        self
    }

    /// Record the engine correlation id
    pub fn correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Finish successfully at `end`
    pub fn succeeded(self, end: DateTime<Utc>) -> QueryExecutionResult {
        self.finish(end, None)
    }

    /// Finish with `failure` at `end`
    pub fn failed(self, end: DateTime<Utc>, failure: ExecutionFailure) -> QueryExecutionResult {
        self.finish(end, Some(failure))
    }

    fn finish(self, end: DateTime<Utc>, failure: Option<ExecutionFailure>) -> QueryExecutionResult {
        QueryExecutionResult {
            execution: self.execution,
            start: self.start,
            end: end.max(self.start),
            rows: self.rows,
            statement: self.statement,
            correlation_id: self.correlation_id,
            failure,
        }
    }
}

/// Outcome of one benchmark: every execution plus phase-level failures
#[derive(Debug, Clone)]
pub struct BenchmarkExecutionResult {
    benchmark: Arc<Benchmark>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    executions: Vec<QueryExecutionResult>,
    failures: Vec<ExecutionFailure>,
}

impl BenchmarkExecutionResult {
    /// The benchmark
    pub fn benchmark(&self) -> &Arc<Benchmark> {
        &self.benchmark
    }

    /// First task submission, absent when no query ran
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// Last task completion, absent when no query ran
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// `end - start` when both are known
    pub fn duration(&self) -> Option<Duration> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some((end - start).to_std().unwrap_or_default()),
            _ => None,
        }
    }

    /// Measured executions in submission order
    pub fn executions(&self) -> &[QueryExecutionResult] {
        &self.executions
    }

    /// Phase-level failures (macros, unexpected errors)
    pub fn failures(&self) -> &[ExecutionFailure] {
        &self.failures
    }

    /// AND over every execution and every phase
    pub fn is_successful(&self) -> bool {
        self.failures.is_empty() && self.executions.iter().all(|e| e.is_successful())
    }

    /// Number of failed executions
    pub fn failed_executions(&self) -> usize {
        self.executions.iter().filter(|e| !e.is_successful()).count()
    }
}

/// Step-wise constructor for [`BenchmarkExecutionResult`]
#[derive(Debug, Clone)]
pub struct BenchmarkExecutionResultBuilder {
    result: BenchmarkExecutionResult,
}

impl BenchmarkExecutionResultBuilder {
    /// Start an empty result for `benchmark`
    pub fn new(benchmark: Arc<Benchmark>) -> Self {
        Self {
            result: BenchmarkExecutionResult {
                benchmark,
                start: None,
                end: None,
                executions: Vec::new(),
                failures: Vec::new(),
            },
        }
    }

    /// Mark the first submission instant
    pub fn start_timer(mut self, at: DateTime<Utc>) -> Self {
        self.result.start = Some(at);
        self
    }

    /// Mark the last completion instant
    pub fn end_timer(mut self, at: DateTime<Utc>) -> Self {
        let end = match self.result.start {
            Some(start) => at.max(start),
            None => at,
        };
        self.result.end = Some(end);
        self
    }

    /// Attach the measured executions
    pub fn executions(mut self, executions: Vec<QueryExecutionResult>) -> Self {
        self.result.executions = executions;
        self
    }

    /// Record a phase-level failure
    pub fn failure(mut self, failure: ExecutionFailure) -> Self {
        self.result.failures.push(failure);
        self
    }

    /// Freeze the result
    pub fn build(self) -> BenchmarkExecutionResult {
        self.result
    }
}

/// Whether a measurement describes a single query or a whole benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One query execution
    Query,
    /// The whole benchmark
    Benchmark,
}

/// Something measurement providers can measure
#[derive(Debug, Clone)]
pub enum Measurable {
    /// A single finished query execution
    Execution(Arc<QueryExecutionResult>),
    /// A finished benchmark
    Benchmark(Arc<BenchmarkExecutionResult>),
}

impl Measurable {
    /// Benchmark the measurable belongs to
    pub fn benchmark(&self) -> &Arc<Benchmark> {
        match self {
            Measurable::Execution(result) => result.benchmark(),
            Measurable::Benchmark(result) => result.benchmark(),
        }
    }

    /// Query or benchmark level
    pub fn granularity(&self) -> Granularity {
        match self {
            Measurable::Execution(_) => Granularity::Query,
            Measurable::Benchmark(_) => Granularity::Benchmark,
        }
    }

    /// Success of the underlying execution
    pub fn is_successful(&self) -> bool {
        match self {
            Measurable::Execution(result) => result.is_successful(),
            Measurable::Benchmark(result) => result.is_successful(),
        }
    }

    /// Measured interval start
    pub fn start(&self) -> Option<DateTime<Utc>> {
        match self {
            Measurable::Execution(result) => Some(result.start()),
            Measurable::Benchmark(result) => result.start(),
        }
    }

    /// Measured interval end
    pub fn end(&self) -> Option<DateTime<Utc>> {
        match self {
            Measurable::Execution(result) => Some(result.end()),
            Measurable::Benchmark(result) => result.end(),
        }
    }

    /// Measured interval length
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Measurable::Execution(result) => Some(result.duration()),
            Measurable::Benchmark(result) => result.duration(),
        }
    }

    /// Executions covered by this measurable
    pub fn executions(&self) -> &[QueryExecutionResult] {
        match self {
            Measurable::Execution(result) => std::slice::from_ref(result.as_ref()),
            Measurable::Benchmark(result) => result.executions(),
        }
    }
}
