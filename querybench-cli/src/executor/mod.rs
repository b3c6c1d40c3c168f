//! Suite Executor
//!
//! Runs a planned suite and turns its outcome into a report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Vec<Arc<Benchmark>> (from the planner)
//!       │
//!       ▼
//! ┌──────────────┐
//! │ orchestrator │  Clock check, suite macros, health checks, time limit
//! └──────┬───────┘
//!        │  per benchmark
//!        ▼
//! ┌──────────────┐
//! │    driver    │  Macros, worker pool, measurements, reporting
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │  statistics  │  Duration summaries (parallel)
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │    report    │  SuiteReport
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │  formatting  │  Human-readable output
//! └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Single benchmark execution
//! - [`orchestrator`] - Suite-level control flow and success
//! - [`statistics`] - Parallel duration statistics
//! - [`report`] - Report building
//! - [`formatting`] - Human-readable output formatting
//! - [`metadata`] - Run metadata collection

mod driver;
mod formatting;
mod metadata;
mod orchestrator;
mod report;
mod statistics;

pub use driver::{BenchmarkExecutionDriver, BenchmarkRun};
pub use formatting::format_human_output;
pub use metadata::build_report_meta;
pub use orchestrator::{BenchmarkOutcome, ExecutionOrchestrator, SuiteOutcome, SuiteSettings};
pub use report::build_report;
pub use statistics::compute_statistics;
