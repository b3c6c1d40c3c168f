//! Error types for the execution pipeline
//!
//! Unit-level failures (one query, one provider call) are captured into the
//! data model as [`querybench_core::ExecutionFailure`]. The enums here cover
//! phase-level and suite-level failures that are thrown and caught one scope up.

use chrono::{DateTime, Utc};
use querybench_core::{ModelError, TemplateError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used at trait seams where implementations bring their own error types
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Malformed configuration or benchmark descriptor; fatal before the suite starts
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid TOML for this schema
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },
    /// Duration string could not be parsed
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration {
        /// Raw value
        value: String,
        /// What was wrong
        reason: String,
    },
    /// Regex in a filter or pattern could not be compiled
    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        /// Raw pattern
        pattern: String,
        /// Underlying error
        #[source]
        source: regex::Error,
    },
    /// Benchmark model validation failed
    #[error(transparent)]
    Model(#[from] ModelError),
    /// Variable table has an unsupported value
    #[error("variable '{name}' of benchmark '{benchmark}': {reason}")]
    InvalidVariable {
        /// Benchmark definition name
        benchmark: String,
        /// Variable name
        name: String,
        /// What was wrong
        reason: String,
    },
    /// Query definition is unusable
    #[error("query '{query}': {reason}")]
    InvalidQuery {
        /// Query name
        query: String,
        /// What was wrong
        reason: String,
    },
    /// Benchmark definition is unusable
    #[error("benchmark '{benchmark}': {reason}")]
    InvalidBenchmark {
        /// Benchmark definition name
        benchmark: String,
        /// What was wrong
        reason: String,
    },
    /// Benchmark references a data source, query or macro that does not exist
    #[error("benchmark '{benchmark}' references unknown {kind} '{name}'")]
    UnknownReference {
        /// Benchmark name
        benchmark: String,
        /// "data source", "query" or "macro"
        kind: &'static str,
        /// Referenced name
        name: String,
    },
    /// A referenced macro does not resolve to exactly one driver
    #[error("{scope} references an unusable macro")]
    Macro {
        /// `benchmark '<name>'` or `runner`
        scope: String,
        /// Dispatch failure
        #[source]
        source: MacroError,
    },
    /// Two expanded benchmarks share a unique name
    #[error("duplicate benchmark '{0}'")]
    DuplicateBenchmark(String),
    /// Connection pool is smaller than the requested concurrency
    #[error(
        "data source '{data_source}' allows {max_connections} connections but benchmark '{benchmark}' needs {concurrency}"
    )]
    PoolTooSmall {
        /// Benchmark unique name
        benchmark: String,
        /// Data source name
        data_source: String,
        /// Pool capacity
        max_connections: u32,
        /// Requested concurrency
        concurrency: u32,
    },
}

/// Macro dispatch and execution failures; fatal to the current macro phase
#[derive(Debug, Error)]
pub enum MacroError {
    /// No registered driver claims the macro
    #[error("no macro driver can execute macro '{name}'")]
    NotFound {
        /// Macro name
        name: String,
    },
    /// More than one registered driver claims the macro
    #[error("macro '{name}' is claimed by multiple drivers: {}", candidates.join(", "))]
    Ambiguous {
        /// Macro name
        name: String,
        /// Names of all claiming drivers
        candidates: Vec<String>,
    },
    /// The driver ran the macro and it failed
    #[error("macro '{name}' failed")]
    Execution {
        /// Macro name
        name: String,
        /// Driver error
        #[source]
        source: BoxError,
    },
}

/// SQL execution primitive failures
#[derive(Debug, Error)]
pub enum SqlError {
    /// Data source is not registered
    #[error("unknown data source '{0}'")]
    UnknownDataSource(String),
    /// Connection pool is closed
    #[error("connection pool for '{0}' is closed")]
    PoolClosed(String),
    /// Client process could not be spawned or talked to
    #[error("client I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Engine rejected the statement
    #[error("statement failed: {0}")]
    Statement(String),
    /// SQL template could not be rendered
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// HTTP client failures against the results service, Graphite or the engine
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    /// Connection, timeout or body transfer failure
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Request URL
        url: String,
        /// Underlying error
        #[source]
        source: reqwest::Error,
    },
    /// Non-success status code
    #[error("{url} returned {status}: {body}")]
    Status {
        /// Request URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
    /// Response body did not have the expected shape
    #[error("invalid response from {url}: {reason}")]
    Decode {
        /// Request URL
        url: String,
        /// What was wrong
        reason: String,
    },
}

impl ClientError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport { .. } => true,
            ClientError::Status { status, .. } => *status >= 500 || *status == 429,
            ClientError::Build(_) | ClientError::Decode { .. } => false,
        }
    }
}

/// Failure of a single measurement provider attempt
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network fault or server error; retried
    #[error("transient failure: {0}")]
    Transient(String),
    /// Backend returned a series with missing datapoints; retried
    #[error("incomplete data: {0}")]
    IncompleteData(String),
    /// Retrying cannot help
    #[error("{0}")]
    Fatal(String),
}

impl ProviderError {
    /// Whether the aggregator should retry this failure
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient(_) | ProviderError::IncompleteData(_)
        )
    }
}

impl From<ClientError> for ProviderError {
    fn from(error: ClientError) -> Self {
        if error.is_transient() {
            ProviderError::Transient(error.to_string())
        } else {
            ProviderError::Fatal(error.to_string())
        }
    }
}

impl From<SyncError> for ProviderError {
    fn from(error: SyncError) -> Self {
        ProviderError::Fatal(error.to_string())
    }
}

/// Measurement collection failure surfaced to the join point
#[derive(Debug, Error)]
pub enum MeasurementError {
    /// Transient failures persisted through every attempt
    #[error("measurement provider '{provider}' failed after {attempts} attempts")]
    RetriesExhausted {
        /// Provider name
        provider: String,
        /// Attempts made
        attempts: u32,
        /// Last failure
        #[source]
        source: ProviderError,
    },
    /// Non-retryable provider failure
    #[error("measurement provider '{provider}' failed")]
    Fatal {
        /// Provider name
        provider: String,
        /// Failure
        #[source]
        source: ProviderError,
    },
    /// Provider task panicked or was aborted
    #[error("measurement provider '{provider}' task aborted")]
    Aborted {
        /// Provider name
        provider: String,
    },
}

/// Listener failure surfaced at a reporting join
#[derive(Debug, Error)]
pub enum ReportingError {
    /// A listener returned an error
    #[error("listener '{listener}' failed on {event}")]
    Listener {
        /// Listener name
        listener: String,
        /// Lifecycle event name
        event: &'static str,
        /// Listener error
        #[source]
        source: BoxError,
    },
    /// A notification task panicked or was aborted
    #[error("reporting task aborted on {event}")]
    Aborted {
        /// Lifecycle event name
        event: &'static str,
    },
    /// Measurements for a deferred notification could not be collected
    #[error(transparent)]
    Measurement(#[from] MeasurementError),
    /// Pending per-execution notifications did not finish in time
    #[error("timed out after {timeout:?} draining {pending} pending reporting tasks")]
    DrainTimeout {
        /// Tasks still running
        pending: usize,
        /// Drain time box
        timeout: Duration,
    },
}

/// Synchronizer wait failures
#[derive(Debug, Error)]
pub enum SyncError {
    /// Ready instant lies further in the future than the time box allows
    #[error("measurement window ready at {ready_at} exceeds max wait of {max_wait:?}")]
    WaitTooLong {
        /// Instant the backend becomes safe to query
        ready_at: DateTime<Utc>,
        /// Configured time box
        max_wait: Duration,
    },
    /// Wait was cancelled
    #[error("measurement wait cancelled")]
    Cancelled,
}

/// Local and results-service clocks disagree
#[derive(Debug, Error)]
pub enum ClockDriftError {
    /// Lower bound of the drift exceeds the tolerance
    #[error("clock drift of at least {drift:?} exceeds tolerance of {tolerance:?}")]
    Exceeded {
        /// Lower bound of the measured drift
        drift: Duration,
        /// Configured tolerance
        tolerance: Duration,
    },
    /// Service time could not be fetched
    #[error("failed to read results service time")]
    Service(#[from] ClientError),
}

/// Fatal suite-level causes
#[derive(Debug, Error)]
pub enum SuiteError {
    /// Clock check failed before start
    #[error(transparent)]
    ClockDrift(#[from] ClockDriftError),
    /// Before-suite macro phase failed
    #[error("before-suite macros failed")]
    BeforeSuite(#[source] MacroError),
    /// After-suite macro phase failed
    #[error("after-suite macros failed")]
    AfterSuite(#[source] MacroError),
    /// Health check failed between benchmarks
    #[error("health check failed before benchmark '{benchmark}'")]
    HealthCheck {
        /// Benchmark that was about to start
        benchmark: String,
        /// Macro failure
        #[source]
        source: MacroError,
    },
    /// Pending reporting failed or timed out at the final drain
    #[error(transparent)]
    Reporting(#[from] ReportingError),
}
