#![warn(missing_docs)]
//! # QueryBench
//!
//! Benchmark harness for SQL query engines: runs parameterized sets of SQL
//! queries repeatedly, at configurable concurrency, and reports timing plus
//! engine and cluster metrics to a results service.
//!
//! - **Variable Expansion**: one benchmark per point of the variable cartesian product
//! - **Macro Phases**: shell or SQL actions around the suite, each benchmark and each execution
//! - **Bounded Concurrency**: a per-benchmark worker pool; one failing query never aborts its siblings
//! - **Synchronized Measurements**: cluster metrics are queried only once the monitoring backend has ingested the window
//! - **Ordered Reporting**: lifecycle listeners by explicit priority, failures surfaced at join points
//!
//! ## Quick Start
//!
//! ```text
//! querybench init > querybench.toml
//! querybench list
//! querybench --format json --output report.json
//! ```
//!
//! ## Embedding
//!
//! ```ignore
//! use querybench::prelude::*;
//!
//! let orchestrator = ExecutionOrchestrator::new(driver, macros, reporting, SuiteSettings::default());
//! let outcome = orchestrator.run(&plan.benchmarks).await;
//! std::process::exit(if outcome.is_successful() { 0 } else { 1 });
//! ```

// Re-export the data model
pub use querybench_core::{
    Benchmark, BenchmarkBuilder, BenchmarkExecutionResult, ExecutionFailure, FailureKind,
    Measurable, Measurement, Query, QueryExecution, QueryExecutionResult, Unit, expand_variables,
    unique_name,
};

// Re-export the pipeline
pub use querybench_cli::{
    BenchConfig, BenchmarkExecutionDriver, BenchmarkListener, BenchmarkOutcome, BenchmarkRun,
    BorrowedConnection, Connection, DataSource, DataSources, ExecutionOrchestrator,
    ExecutionSynchronizer, MacroDispatcher, MacroDriver, MeasurementAggregator,
    MeasurementProvider, ReportingDispatcher, RetryPolicy, StatementOutcome, SuiteOutcome,
    SuiteSettings, build_plan,
};

// Re-export stats and reports
pub use querybench_report::{BenchmarkStatus, OutputFormat, SuiteReport};
pub use querybench_stats::{DurationSummary, summarize_durations};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Benchmark, BenchmarkBuilder, BenchmarkExecutionDriver, BenchmarkListener,
        ExecutionOrchestrator, MacroDispatcher, MacroDriver, MeasurementAggregator,
        MeasurementProvider, Query, ReportingDispatcher, SuiteSettings,
    };
}

/// Run the QueryBench CLI harness.
///
/// Returns the process exit code:
/// ```ignore
/// fn main() {
///     std::process::exit(querybench::run().unwrap_or(1));
/// }
/// ```
pub use querybench_cli::run;
