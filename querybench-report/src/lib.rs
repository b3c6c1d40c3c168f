#![warn(missing_docs)]
//! QueryBench Report - Suite Reports
//!
//! Local, file-oriented view of a finished suite, independent of the results
//! service:
//! - JSON (machine-readable, full detail)
//! - CSV (one row per benchmark)
//!
//! Human-readable terminal output is rendered by the CLI.

mod csv;
mod json;
mod report;

pub use csv::generate_csv_report;
pub use json::generate_json_report;
pub use report::{
    BenchmarkReport, BenchmarkStatus, DurationMetrics, ReportMeta, ReportSummary, SuiteReport,
};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// CSV for spreadsheets
    Csv,
    /// Human-readable terminal output
    Human,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

impl OutputFormat {
    /// File extension used when the report is written to the output directory
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Human => "txt",
        }
    }
}
