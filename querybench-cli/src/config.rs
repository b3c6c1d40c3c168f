//! Configuration loading from querybench.toml
//!
//! QueryBench configuration lives in a `querybench.toml` file next to the
//! benchmark definitions. The configuration is automatically discovered by
//! walking up from the current directory, or passed with `--config`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name searched for by [`BenchConfig::discover`]
pub const CONFIG_FILE_NAME: &str = "querybench.toml";

/// QueryBench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BenchConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Results service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Graphite metrics backend configuration
    #[serde(default)]
    pub graphite: GraphiteConfig,
    /// Engine statistics configuration
    #[serde(default)]
    pub engine: EngineConfig,
    /// Measurement retry configuration
    #[serde(default)]
    pub measurement: MeasurementConfig,
    /// Reporting configuration
    #[serde(default)]
    pub reporting: ReportingConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
    /// Named SQL data sources
    #[serde(default)]
    pub data_sources: BTreeMap<String, DataSourceConfig>,
    /// Named macros
    #[serde(default)]
    pub macros: BTreeMap<String, MacroConfig>,
    /// Named queries
    #[serde(default)]
    pub queries: BTreeMap<String, QueryConfig>,
    /// Benchmark definitions, in file order
    #[serde(default, rename = "benchmark")]
    pub benchmarks: Vec<BenchmarkDefinition>,
}

/// Runner configuration for suite execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Environment tag attached to every benchmark
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Suite sequence id; defaults to the local start timestamp
    #[serde(default)]
    pub sequence_id: Option<String>,
    /// Wall-clock limit measured from suite start (e.g., "2h")
    #[serde(default)]
    pub time_limit: Option<String>,
    /// Macros run once before the first benchmark
    #[serde(default)]
    pub before_all: Vec<String>,
    /// Macros run once after the last benchmark
    #[serde(default)]
    pub after_all: Vec<String>,
    /// Macros run before every benchmark; a failure stops the suite
    #[serde(default)]
    pub health_check: Vec<String>,
    /// Tolerated local vs results-service clock difference
    #[serde(default = "default_max_clock_drift")]
    pub max_clock_drift: String,
    /// Keep only benchmarks whose variable fully matches the regex
    #[serde(default)]
    pub active_variables: BTreeMap<String, String>,
    /// Default prewarm runs per benchmark
    #[serde(default = "default_prewarm_runs")]
    pub prewarm_runs: u32,
    /// Default measured runs per benchmark
    #[serde(default = "default_runs")]
    pub runs: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            sequence_id: None,
            time_limit: None,
            before_all: Vec::new(),
            after_all: Vec::new(),
            health_check: Vec::new(),
            max_clock_drift: default_max_clock_drift(),
            active_variables: BTreeMap::new(),
            prewarm_runs: default_prewarm_runs(),
            runs: default_runs(),
        }
    }
}

fn default_environment() -> String {
    "default".to_string()
}
fn default_max_clock_drift() -> String {
    "1s".to_string()
}
fn default_prewarm_runs() -> u32 {
    2
}
fn default_runs() -> u32 {
    3
}

/// Results service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL; enables the results listener and the clock drift check
    #[serde(default)]
    pub url: Option<String>,
    /// Per-request timeout
    #[serde(default = "default_service_timeout")]
    pub timeout: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: default_service_timeout(),
        }
    }
}

fn default_service_timeout() -> String {
    "30s".to_string()
}

/// Graphite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphiteConfig {
    /// Base URL
    #[serde(default)]
    pub url: Option<String>,
    /// Ingestion resolution of the metric series
    #[serde(default = "default_resolution")]
    pub resolution: String,
    /// Delay before a bucket is queryable
    #[serde(default = "default_metrics_delay")]
    pub metrics_delay: String,
    /// Longest wait for a measurement window to become ready
    #[serde(default = "default_max_wait")]
    pub max_wait: String,
    /// CPU usage expression (percent)
    #[serde(default)]
    pub cpu: Option<String>,
    /// Memory usage expression (percent)
    #[serde(default)]
    pub memory: Option<String>,
    /// Network traffic expression (bytes)
    #[serde(default)]
    pub network: Option<String>,
    /// Post lifecycle events to `/events/`
    #[serde(default)]
    pub events: bool,
}

impl Default for GraphiteConfig {
    fn default() -> Self {
        Self {
            url: None,
            resolution: default_resolution(),
            metrics_delay: default_metrics_delay(),
            max_wait: default_max_wait(),
            cpu: None,
            memory: None,
            network: None,
            events: false,
        }
    }
}

impl GraphiteConfig {
    /// Whether any cluster metric expression is configured
    pub fn has_metrics(&self) -> bool {
        self.cpu.is_some() || self.memory.is_some() || self.network.is_some()
    }
}

fn default_resolution() -> String {
    "10s".to_string()
}
fn default_metrics_delay() -> String {
    "30s".to_string()
}
fn default_max_wait() -> String {
    "5m".to_string()
}

/// Engine statistics configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Coordinator base URL
    #[serde(default)]
    pub url: Option<String>,
    /// Value of the `X-Trino-User` header
    #[serde(default)]
    pub user: Option<String>,
}

/// Measurement retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Attempts per provider, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: String,
    /// Growth factor between retries
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff: String,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff: default_max_backoff(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}
fn default_initial_backoff() -> String {
    "5s".to_string()
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_backoff() -> String {
    "1m".to_string()
}

/// Reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Time box for draining per-execution notifications at suite end
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout: String,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            drain_timeout: default_drain_timeout(),
        }
    }
}

fn default_drain_timeout() -> String {
    "10m".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human", "json", "csv"
    #[serde(default = "default_format")]
    pub format: String,
    /// Output directory for reports
    #[serde(default = "default_output_dir")]
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            directory: default_output_dir(),
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}
fn default_output_dir() -> String {
    "target/querybench".to_string()
}

/// A SQL data source backed by a command-line client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Shell command receiving the statement on stdin
    pub command: String,
    /// Maximum simultaneous connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Regex with one capture group extracting the engine query id from client output
    #[serde(default)]
    pub query_id_pattern: Option<String>,
}

fn default_max_connections() -> u32 {
    8
}

/// A named macro
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MacroConfig {
    /// Run through `bash -c`
    Shell {
        /// Command line
        command: String,
    },
    /// Run as a SQL statement
    Sql {
        /// Statement
        sql: String,
        /// Data source; defaults to the surrounding benchmark's
        #[serde(default)]
        data_source: Option<String>,
    },
}

/// A named query
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryConfig {
    /// Inline SQL template
    #[serde(default)]
    pub sql: Option<String>,
    /// SQL template file, relative to the config file
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Data source override
    #[serde(default)]
    pub data_source: Option<String>,
    /// Free-form properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl QueryConfig {
    /// Resolve the SQL template, reading `file` relative to `base_dir`
    pub fn load_sql(&self, name: &str, base_dir: &Path) -> Result<String, ConfigError> {
        match (&self.sql, &self.file) {
            (Some(sql), None) => Ok(sql.clone()),
            (None, Some(file)) => {
                let path = base_dir.join(file);
                std::fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source })
            }
            (Some(_), Some(_)) => Err(ConfigError::InvalidQuery {
                query: name.to_string(),
                reason: "both 'sql' and 'file' are set".to_string(),
            }),
            (None, None) => Err(ConfigError::InvalidQuery {
                query: name.to_string(),
                reason: "one of 'sql' or 'file' is required".to_string(),
            }),
        }
    }
}

/// A benchmark definition before variable expansion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkDefinition {
    /// Benchmark name
    pub name: String,
    /// Data source; may be omitted when exactly one is configured
    #[serde(default)]
    pub data_source: Option<String>,
    /// Query names, in execution order
    pub queries: Vec<String>,
    /// Measured runs; defaults to `runner.runs`
    #[serde(default)]
    pub runs: Option<u32>,
    /// Prewarm runs; defaults to `runner.prewarm_runs`
    #[serde(default)]
    pub prewarm_runs: Option<u32>,
    /// Worker pool size
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Macros before the benchmark
    #[serde(default)]
    pub before_benchmark: Vec<String>,
    /// Macros after the benchmark
    #[serde(default)]
    pub after_benchmark: Vec<String>,
    /// Macros before every execution
    #[serde(default)]
    pub before_execution: Vec<String>,
    /// Macros after every execution
    #[serde(default)]
    pub after_execution: Vec<String>,
    /// Variable name to a single value or a list of candidates
    #[serde(default)]
    pub variables: BTreeMap<String, toml::Value>,
}

fn default_concurrency() -> u32 {
    1
}

impl BenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }

    /// Try to discover the configuration file by walking up from the current directory
    pub fn discover() -> Option<PathBuf> {
        let dir = std::env::current_dir().ok()?;
        Self::discover_from(&dir)
    }

    /// Walk up from `start` looking for [`CONFIG_FILE_NAME`]
    pub fn discover_from(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# QueryBench Configuration

[runner]
# Environment tag attached to every benchmark
environment = "default"
# Suite sequence id (defaults to the local start timestamp)
# sequence_id = "nightly-42"
# Stop starting new benchmarks after this long (uncomment to enable)
# time_limit = "2h"
# Suite-level macros
before_all = []
after_all = []
# Run before every benchmark; a failure stops the suite
health_check = []
# Tolerated clock difference against the results service
max_clock_drift = "1s"
# Defaults for benchmarks that do not set them
prewarm_runs = 2
runs = 3

# Keep only benchmarks whose variable value fully matches
[runner.active_variables]
# schema = "tpch_sf(1|10)"

[service]
# Results service (uncomment to enable)
# url = "http://localhost:8080"
timeout = "30s"

[graphite]
# Metrics backend (uncomment to enable)
# url = "http://localhost:18088"
resolution = "10s"
metrics_delay = "30s"
max_wait = "5m"
# cpu = "avg(cluster.*.cpu.usage)"
# memory = "avg(cluster.*.memory.usage)"
# network = "sum(cluster.*.network.bytes)"
events = false

[engine]
# Coordinator for query statistics (uncomment to enable)
# url = "http://localhost:8080"
# user = "benchmark"

[measurement]
max_attempts = 4
initial_backoff = "5s"
backoff_multiplier = 2.0
max_backoff = "1m"

[reporting]
drain_timeout = "10m"

[output]
# Default output format: human, json, csv
format = "human"
directory = "target/querybench"

[data_sources.local]
# Receives each statement on stdin, one result row per output line
command = "trino --server localhost:8080 --output-format TSV"
max_connections = 8
# query_id_pattern = "Query ([0-9_a-z]+)"

[macros.drop-caches]
kind = "shell"
command = "sync"

[queries.count-lineitem]
sql = "SELECT count(*) FROM ${schema}.lineitem"

[[benchmark]]
name = "lineitem"
data_source = "local"
queries = ["count-lineitem"]
runs = 3
concurrency = 1
before_execution = ["drop-caches"]
variables = { schema = ["tpch.tiny", "tpch.sf1"] }
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m", "1h")
    pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidDuration {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = trimmed
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| trimmed.split_at(i))
            .unwrap_or((trimmed, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| invalid("invalid number"))?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid("must be a non-negative number"));
        }

        let nanos_per_unit: f64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1.0,
            "us" | "µs" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" | "" => 1_000_000_000.0,
            "m" | "min" => 60_000_000_000.0,
            "h" => 3_600_000_000_000.0,
            _ => return Err(invalid("unknown unit")),
        };

        Ok(Duration::from_nanos((value * nanos_per_unit) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BenchConfig::default();
        assert_eq!(config.runner.environment, "default");
        assert_eq!(config.runner.runs, 3);
        assert_eq!(config.runner.prewarm_runs, 2);
        assert_eq!(config.measurement.max_attempts, 4);
        assert!(config.service.url.is_none());
        assert!(!config.graphite.has_metrics());
    }

    #[test]
    fn test_parse_duration() {
        let parse = |s| BenchConfig::parse_duration(s).unwrap();
        assert_eq!(parse("3s"), Duration::from_secs(3));
        assert_eq!(parse("500ms"), Duration::from_millis(500));
        assert_eq!(parse("100us"), Duration::from_micros(100));
        assert_eq!(parse("1000ns"), Duration::from_nanos(1000));
        assert_eq!(parse("2m"), Duration::from_secs(120));
        assert_eq!(parse("1h"), Duration::from_secs(3600));
        assert_eq!(parse("1.5s"), Duration::from_millis(1500));
        assert!(BenchConfig::parse_duration("").is_err());
        assert!(BenchConfig::parse_duration("5 parsecs").is_err());
        assert!(BenchConfig::parse_duration("-1s").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [runner]
            environment = "ci"
            after_all = ["cleanup"]

            [data_sources.trino]
            command = "trino"

            [macros.cleanup]
            kind = "shell"
            command = "rm -rf /tmp/bench"

            [macros.analyze]
            kind = "sql"
            sql = "ANALYZE t"
            data_source = "trino"

            [queries.q1]
            sql = "SELECT 1"

            [[benchmark]]
            name = "simple"
            queries = ["q1"]
            concurrency = 4
            variables = { schema = ["a", "b"], scale = 10 }
        "#;

        let config: BenchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.runner.environment, "ci");
        assert_eq!(config.runner.after_all, vec!["cleanup"]);
        assert_eq!(config.data_sources["trino"].max_connections, 8);
        assert!(matches!(config.macros["cleanup"], MacroConfig::Shell { .. }));
        assert!(matches!(
            &config.macros["analyze"],
            MacroConfig::Sql { data_source: Some(ds), .. } if ds == "trino"
        ));
        assert_eq!(config.benchmarks.len(), 1);
        assert_eq!(config.benchmarks[0].concurrency, 4);
        assert_eq!(config.benchmarks[0].variables.len(), 2);
        // Defaults should still apply
        assert_eq!(config.output.format, "human");
    }

    #[test]
    fn test_default_toml_parses() {
        let config: BenchConfig = toml::from_str(&BenchConfig::default_toml()).unwrap();
        assert_eq!(config.runner.max_clock_drift, "1s");
        assert_eq!(config.benchmarks[0].name, "lineitem");
        assert!(config.queries.contains_key("count-lineitem"));
    }

    #[test]
    fn test_query_file_resolution() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("q.sql"), "SELECT 42").unwrap();

        let from_file = QueryConfig {
            file: Some(PathBuf::from("q.sql")),
            ..Default::default()
        };
        assert_eq!(from_file.load_sql("q", dir.path()).unwrap(), "SELECT 42");

        let neither = QueryConfig::default();
        assert!(matches!(
            neither.load_sql("q", dir.path()),
            Err(ConfigError::InvalidQuery { .. })
        ));
    }

    #[test]
    fn test_discover_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "").unwrap();

        let found = BenchConfig::discover_from(&nested).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));
    }
}
