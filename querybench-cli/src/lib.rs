#![warn(missing_docs)]
//! QueryBench CLI Library
//!
//! Execution pipeline and command line harness. `querybench::run()` (or
//! `querybench_cli::run()`) loads `querybench.toml`, plans the suite, runs it
//! and renders the report. The returned code is the process exit code: `0`
//! iff the suite succeeded.
//!
//! # Example
//!
//! ```ignore
//! fn main() {
//!     let code = querybench_cli::run().unwrap_or(1);
//!     std::process::exit(code);
//! }
//! ```

mod clients;
mod config;
mod error;
mod executor;
mod listeners;
mod macros;
mod measurements;
mod planner;
mod sql;
mod synchronizer;

pub use clients::{
    BenchmarkStartRequest, EngineClient, ExecutionStartRequest, FinishRequest, FinishStatus,
    GraphiteClient, GraphiteEvent, HttpClient, Series, ServiceClient,
};
pub use config::*;
pub use error::*;
pub use executor::{
    BenchmarkExecutionDriver, BenchmarkOutcome, BenchmarkRun, ExecutionOrchestrator,
    SuiteOutcome, SuiteSettings, build_report, build_report_meta, compute_statistics,
    format_human_output,
};
pub use listeners::{
    BenchmarkListener, DeferredFailure, Drained, GraphiteEventListener, LoggingListener,
    Notification, ReportingDispatcher, ServiceListener, check_clock_drift,
};
pub use macros::{
    BorrowedConnection, MacroDispatcher, MacroDriver, ShellMacroDriver, SqlMacro, SqlMacroDriver,
};
pub use measurements::{
    ClusterMetricsProvider, DurationProvider, EngineStatsProvider, MeasurementAggregator,
    MeasurementProvider, RetryPolicy, ThroughputProvider, parse_stat_value,
};
pub use planner::{ExecutionPlan, PlanOptions, SEQUENCE_ID_FORMAT, build_plan, default_sequence_id};
pub use sql::{CommandDataSource, Connection, DataSource, DataSources, StatementOutcome};
pub use synchronizer::{Clock, ExecutionSynchronizer, MeasurementWindow, SystemClock};

use clap::{Parser, Subcommand};
use querybench_report::{OutputFormat, generate_csv_report, generate_json_report};
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// QueryBench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "querybench")]
#[command(author, version, about = "QueryBench - benchmark harness for SQL query engines")]
pub struct Cli {
    /// Optional subcommand (Run, List, Init); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Filter benchmarks by regex on name or unique name
    #[arg(default_value = ".*")]
    pub filter: String,

    /// Config file (discovered from the current directory if not specified)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: human, json, csv (defaults to [output].format)
    #[arg(long)]
    pub format: Option<String>,

    /// Output file (stdout for human output if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Suite sequence id
    #[arg(long)]
    pub sequence_id: Option<String>,

    /// Environment tag
    #[arg(long)]
    pub environment: Option<String>,

    /// Stop starting benchmarks after this long (e.g., "2h")
    #[arg(long)]
    pub time_limit: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log warnings and hide the progress bar
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the suite (default)
    Run,
    /// Print the expanded plan without executing
    List,
    /// Print a default querybench.toml
    Init,
}

/// Run the QueryBench CLI with the process arguments.
///
/// # Returns
/// The process exit code, or an error for configuration problems.
pub fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the QueryBench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<i32> {
    init_logging(&cli);

    if cli.command == Some(Commands::Init) {
        print!("{}", BenchConfig::default_toml());
        return Ok(0);
    }

    let config_path = cli
        .config
        .clone()
        .or_else(BenchConfig::discover)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no {} found; create one with `querybench init > {}`",
                CONFIG_FILE_NAME,
                CONFIG_FILE_NAME
            )
        })?;
    let config = BenchConfig::load(&config_path)?;
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    info!("Loaded configuration from {}", config_path.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        match cli.command {
            Some(Commands::List) => list_benchmarks(&cli, &config, &base_dir),
            _ => run_suite(&cli, &config, &base_dir).await,
        }
    })
}

fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        "querybench=debug"
    } else if cli.quiet {
        "querybench=warn"
    } else {
        "querybench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout carries the report
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Everything built from configuration before the suite starts
struct Registries {
    data_sources: DataSources,
    macros: MacroDispatcher,
    measurements: MeasurementAggregator,
    reporting: ReportingDispatcher,
    service: Option<ServiceClient>,
}

fn build_registries(config: &BenchConfig) -> anyhow::Result<Registries> {
    let data_sources = DataSources::from_config(&config.data_sources)?;

    let mut shell_macros = BTreeMap::new();
    let mut sql_macros = BTreeMap::new();
    for (name, definition) in &config.macros {
        match definition {
            MacroConfig::Shell { command } => {
                shell_macros.insert(name.clone(), command.clone());
            }
            MacroConfig::Sql { sql, data_source } => {
                sql_macros.insert(
                    name.clone(),
                    SqlMacro {
                        sql: sql.clone(),
                        data_source: data_source.clone(),
                    },
                );
            }
        }
    }
    let macros = MacroDispatcher::new()
        .with_driver(Arc::new(ShellMacroDriver::new(shell_macros)))
        .with_driver(Arc::new(SqlMacroDriver::new(sql_macros, data_sources.clone())));

    let http = HttpClient::new(BenchConfig::parse_duration(&config.service.timeout)?)?;

    let mut measurements = MeasurementAggregator::new(RetryPolicy::from_config(&config.measurement)?)
        .with_provider(Arc::new(DurationProvider))
        .with_provider(Arc::new(ThroughputProvider));
    if let Some(url) = &config.engine.url {
        let client = EngineClient::new(url, config.engine.user.clone(), http.clone());
        measurements = measurements.with_provider(Arc::new(EngineStatsProvider::new(client)));
    }

    let graphite = config
        .graphite
        .url
        .as_ref()
        .map(|url| GraphiteClient::new(url, http.clone()));
    if let Some(client) = graphite.as_ref().filter(|_| config.graphite.has_metrics()) {
        let synchronizer = ExecutionSynchronizer::new(
            BenchConfig::parse_duration(&config.graphite.resolution)?,
            BenchConfig::parse_duration(&config.graphite.metrics_delay)?,
            BenchConfig::parse_duration(&config.graphite.max_wait)?,
        );
        measurements = measurements.with_provider(Arc::new(ClusterMetricsProvider::new(
            client.clone(),
            synchronizer,
            config.graphite.cpu.clone(),
            config.graphite.memory.clone(),
            config.graphite.network.clone(),
        )));
    }

    let service = config.service.url.as_ref().map(|url| {
        ServiceClient::new(
            url,
            http.clone()
                .with_retries(3, std::time::Duration::from_secs(1)),
        )
    });

    let mut listeners: Vec<Arc<dyn BenchmarkListener>> = vec![Arc::new(LoggingListener)];
    if let Some(client) = &service {
        listeners.push(Arc::new(ServiceListener::new(client.clone())));
    }
    if let Some(client) = graphite.filter(|_| config.graphite.events) {
        listeners.push(Arc::new(GraphiteEventListener::new(client)));
    }

    Ok(Registries {
        data_sources,
        macros,
        measurements,
        reporting: ReportingDispatcher::new(listeners),
        service,
    })
}

fn plan_suite(
    cli: &Cli,
    config: &BenchConfig,
    base_dir: &Path,
    registries: &Registries,
) -> anyhow::Result<ExecutionPlan> {
    let filter = Regex::new(&cli.filter).map_err(|source| ConfigError::InvalidRegex {
        pattern: cli.filter.clone(),
        source,
    })?;
    let options = PlanOptions {
        sequence_id: cli
            .sequence_id
            .clone()
            .or_else(|| config.runner.sequence_id.clone())
            .unwrap_or_else(default_sequence_id),
        environment: cli
            .environment
            .clone()
            .unwrap_or_else(|| config.runner.environment.clone()),
        filter: Some(&filter),
    };
    Ok(build_plan(
        config,
        base_dir,
        &options,
        &registries.macros,
        &registries.data_sources,
    )?)
}

fn suite_settings(cli: &Cli, config: &BenchConfig) -> Result<SuiteSettings, ConfigError> {
    let time_limit = cli
        .time_limit
        .as_deref()
        .or(config.runner.time_limit.as_deref())
        .map(BenchConfig::parse_duration)
        .transpose()?;
    Ok(SuiteSettings {
        time_limit,
        before_all: config.runner.before_all.clone(),
        after_all: config.runner.after_all.clone(),
        health_check: config.runner.health_check.clone(),
        max_clock_drift: BenchConfig::parse_duration(&config.runner.max_clock_drift)?,
        drain_timeout: BenchConfig::parse_duration(&config.reporting.drain_timeout)?,
        show_progress: !cli.quiet && std::io::stderr().is_terminal(),
    })
}

fn list_benchmarks(cli: &Cli, config: &BenchConfig, base_dir: &Path) -> anyhow::Result<i32> {
    let registries = build_registries(config)?;
    let plan = plan_suite(cli, config, base_dir, &registries)?;

    println!("QueryBench Plan:");
    for benchmark in &plan.benchmarks {
        println!("├── {} [{}]", benchmark, benchmark.data_source());
        for query in benchmark.queries() {
            println!("│   ├── {}", query.name);
        }
    }
    println!("{} benchmarks planned.", plan.benchmarks.len());

    let executions: usize = plan.benchmarks.iter().map(|b| b.total_executions()).sum();
    println!("{} query executions.", executions);
    Ok(0)
}

async fn run_suite(cli: &Cli, config: &BenchConfig, base_dir: &Path) -> anyhow::Result<i32> {
    let format: OutputFormat = cli
        .format
        .as_deref()
        .unwrap_or(config.output.format.as_str())
        .parse()
        .map_err(anyhow::Error::msg)?;
    let settings = suite_settings(cli, config)?;
    let registries = build_registries(config)?;
    let plan = plan_suite(cli, config, base_dir, &registries)?;

    let Some(first) = plan.benchmarks.first() else {
        warn!("No benchmarks matched '{}'", cli.filter);
        return Ok(0);
    };
    let sequence_id = first.sequence_id().to_string();
    let environment = first.environment().to_string();
    info!(
        "Running {} benchmarks (sequence {}, environment {})",
        plan.benchmarks.len(),
        sequence_id,
        environment
    );

    let Registries {
        data_sources,
        macros,
        measurements,
        reporting,
        service,
    } = registries;
    let driver =
        BenchmarkExecutionDriver::new(data_sources, macros.clone(), measurements, reporting.clone());
    let mut orchestrator = ExecutionOrchestrator::new(driver, macros, reporting, settings);
    if let Some(service) = service {
        orchestrator = orchestrator.with_service(service);
    }

    let outcome = orchestrator.run(&plan.benchmarks).await;
    let stats = compute_statistics(&outcome.benchmarks);
    let report = build_report(&outcome, &stats, build_report_meta(&sequence_id, &environment));

    let output = match format {
        OutputFormat::Json => generate_json_report(&report)?,
        OutputFormat::Csv => generate_csv_report(&report),
        OutputFormat::Human => format_human_output(&report),
    };
    // machine-readable reports default to the output directory
    let path = cli.output.clone().or_else(|| {
        (format != OutputFormat::Human)
            .then(|| report_path(&config.output.directory, &sequence_id, format.extension()))
    });
    write_output(path.as_deref(), &output)?;

    if outcome.is_successful() {
        Ok(0)
    } else {
        for failure in &report.summary.suite_failures {
            warn!("Suite failure: {}", failure);
        }
        Ok(1)
    }
}

/// Default location of a machine-readable report
fn report_path(directory: &str, sequence_id: &str, extension: &str) -> PathBuf {
    let stem: String = sequence_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    Path::new(directory).join(format!("{}.{}", stem, extension))
}

fn write_output(path: Option<&Path>, output: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::File::create(path)?;
            file.write_all(output.as_bytes())?;
            info!("Report written to: {}", path.display());
        }
        None => print!("{}", output),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(toml_str: &str) -> BenchConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["querybench"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.filter, ".*");

        let cli = Cli::try_parse_from([
            "querybench",
            "lineitem",
            "--sequence-id",
            "nightly-1",
            "--time-limit",
            "1h",
            "list",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Commands::List));
        assert_eq!(cli.filter, "lineitem");
        assert_eq!(cli.sequence_id.as_deref(), Some("nightly-1"));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["querybench", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_cli_time_limit_overrides_config() {
        let config = config(
            r#"
            [runner]
            time_limit = "2h"
            after_all = ["cleanup"]
            "#,
        );
        let mut cli = Cli::try_parse_from(["querybench"]).unwrap();
        let settings = suite_settings(&cli, &config).unwrap();
        assert_eq!(settings.time_limit, Some(Duration::from_secs(7200)));
        assert_eq!(settings.after_all, vec!["cleanup"]);
        assert_eq!(settings.max_clock_drift, Duration::from_secs(1));
        assert_eq!(settings.drain_timeout, Duration::from_secs(600));

        cli.time_limit = Some("30m".to_string());
        let settings = suite_settings(&cli, &config).unwrap();
        assert_eq!(settings.time_limit, Some(Duration::from_secs(1800)));

        cli.time_limit = Some("soon".to_string());
        assert!(suite_settings(&cli, &config).is_err());
    }

    #[test]
    fn test_registries_follow_configuration() {
        let minimal = build_registries(&config("")).unwrap();
        assert_eq!(
            minimal.measurements.provider_names().collect::<Vec<_>>(),
            vec!["duration", "throughput"]
        );
        assert_eq!(minimal.reporting.listener_names(), vec!["logging"]);
        assert!(minimal.service.is_none());

        let full = build_registries(&config(
            r#"
            [service]
            url = "http://results:8080"

            [engine]
            url = "http://coordinator:8080"

            [graphite]
            url = "http://graphite:18088"
            cpu = "avg(cpu)"
            events = true
            "#,
        ))
        .unwrap();
        assert_eq!(
            full.measurements.provider_names().collect::<Vec<_>>(),
            vec!["duration", "throughput", "engine", "cluster"]
        );
        assert_eq!(
            full.reporting.listener_names(),
            vec!["logging", "service", "graphite"]
        );
        assert!(full.service.is_some());
    }

    #[test]
    fn test_report_path_sanitizes_sequence_id() {
        let path = report_path("target/querybench", "2026-10-19T10:00:00:123", "json");
        assert_eq!(
            path,
            Path::new("target/querybench").join("2026-10-19T10_00_00_123.json")
        );
    }

    #[test]
    fn test_write_output_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("suite.csv");
        write_output(Some(&path), "a,b\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n");
    }

    #[test]
    fn test_list_runs_without_executing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
            [data_sources.local]
            command = "false"

            [queries.q1]
            sql = "SELECT 1"

            [[benchmark]]
            name = "ping"
            queries = ["q1"]
            variables = { schema = ["a", "b"] }
            "#,
        )
        .unwrap();
        let config = BenchConfig::load(&path).unwrap();
        let cli = Cli::try_parse_from(["querybench", "list"]).unwrap();
        assert_eq!(list_benchmarks(&cli, &config, dir.path()).unwrap(), 0);
    }
}
