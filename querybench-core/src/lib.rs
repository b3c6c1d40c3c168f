#![warn(missing_docs)]
//! QueryBench Core - Data Model
//!
//! Types shared by every stage of the execution pipeline:
//! - [`Benchmark`] / [`Query`] definitions, built once per variable combination
//! - [`QueryExecution`] and its [`QueryExecutionResult`]
//! - [`BenchmarkExecutionResult`] aggregating all executions of one benchmark
//! - [`Measurement`] triples reported to the results store
//! - Variable expansion ([`expand_variables`]) and `${var}` SQL templating

mod benchmark;
mod error;
mod execution;
mod measurement;
mod template;
mod variables;

pub use benchmark::{Benchmark, BenchmarkBuilder, DATA_SOURCE_PROPERTY, Query, unique_name};
pub use error::{ModelError, TemplateError};
pub use execution::{
    BenchmarkExecutionResult, BenchmarkExecutionResultBuilder, ExecutionFailure, FailureKind,
    Granularity, Measurable, QueryExecution, QueryExecutionResult, QueryExecutionResultBuilder,
};
pub use measurement::{Measurement, Unit};
pub use template::{is_select_statement, render_template};
pub use variables::{VariableCombination, expand_variables};

/// Variable injected into every statement: the execution's sequence number
/// within its benchmark.
pub const EXECUTION_SEQUENCE_ID_VARIABLE: &str = "execution_sequence_id";

/// Variable injected into every statement: the benchmark name.
pub const BENCHMARK_NAME_VARIABLE: &str = "name";
