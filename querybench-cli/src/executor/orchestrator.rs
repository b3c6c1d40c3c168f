//! Suite Orchestration
//!
//! ```text
//! clock drift check ──✗──▶ abort, nothing executed
//! before_all macros ──✗──▶ abort, nothing executed
//! for each benchmark (expansion order):
//!     time limit passed?  ──▶ skip the rest
//!     health check        ──✗──▶ stop the suite
//!     driver.execute()
//! after_all macros    ──✗──▶ suite failed
//! drain deferred reporting ──✗──▶ charged to the benchmark that deferred it
//! ```
//!
//! One benchmark runs to completion, including its reporting join, before
//! the next one starts.

use super::driver::{BenchmarkExecutionDriver, BenchmarkRun};
use crate::clients::ServiceClient;
use crate::error::SuiteError;
use crate::listeners::{DeferredFailure, ReportingDispatcher, check_clock_drift};
use crate::macros::MacroDispatcher;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use querybench_core::{Benchmark, ExecutionFailure, FailureKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Suite-level settings
#[derive(Debug, Clone)]
pub struct SuiteSettings {
    /// Skip benchmarks not started within this time from suite start
    pub time_limit: Option<Duration>,
    /// Macros run once before the first benchmark
    pub before_all: Vec<String>,
    /// Macros run once after the last benchmark
    pub after_all: Vec<String>,
    /// Macros run before every benchmark; a failure stops the suite
    pub health_check: Vec<String>,
    /// Largest tolerated drift against the results service clock
    pub max_clock_drift: Duration,
    /// Time box for pending reporting at suite end
    pub drain_timeout: Duration,
    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

impl Default for SuiteSettings {
    fn default() -> Self {
        Self {
            time_limit: None,
            before_all: Vec::new(),
            after_all: Vec::new(),
            health_check: Vec::new(),
            max_clock_drift: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(600),
            show_progress: false,
        }
    }
}

/// What happened to one planned benchmark
#[derive(Debug, Clone)]
pub enum BenchmarkOutcome {
    /// The driver ran it
    Executed(BenchmarkRun),
    /// Not started: time limit reached or the suite stopped early
    Skipped(Arc<Benchmark>),
}

impl BenchmarkOutcome {
    /// The benchmark
    pub fn benchmark(&self) -> &Arc<Benchmark> {
        match self {
            BenchmarkOutcome::Executed(run) => run.result.benchmark(),
            BenchmarkOutcome::Skipped(benchmark) => benchmark,
        }
    }
}

/// Outcome of a whole suite
#[derive(Debug)]
pub struct SuiteOutcome {
    /// One entry per planned benchmark, in plan order
    pub benchmarks: Vec<BenchmarkOutcome>,
    /// Fatal suite-level failures
    pub failures: Vec<SuiteError>,
    /// Suite start
    pub started_at: DateTime<Utc>,
    /// Wall-clock suite duration
    pub duration: Duration,
}

impl SuiteOutcome {
    fn executed_mut(&mut self, unique_name: &str) -> Option<&mut BenchmarkRun> {
        self.benchmarks.iter_mut().find_map(|outcome| match outcome {
            BenchmarkOutcome::Executed(run)
                if run.result.benchmark().unique_name() == unique_name =>
            {
                Some(run)
            }
            _ => None,
        })
    }

    /// Every executed benchmark succeeded and nothing fatal happened.
    ///
    /// Skipped benchmarks do not count against success.
    pub fn is_successful(&self) -> bool {
        self.failures.is_empty()
            && self.benchmarks.iter().all(|outcome| match outcome {
                BenchmarkOutcome::Executed(run) => run.is_successful(),
                BenchmarkOutcome::Skipped(_) => true,
            })
    }
}

/// Drives a planned suite
pub struct ExecutionOrchestrator {
    driver: BenchmarkExecutionDriver,
    macros: MacroDispatcher,
    reporting: ReportingDispatcher,
    service: Option<ServiceClient>,
    settings: SuiteSettings,
}

impl ExecutionOrchestrator {
    /// Create an orchestrator
    pub fn new(
        driver: BenchmarkExecutionDriver,
        macros: MacroDispatcher,
        reporting: ReportingDispatcher,
        settings: SuiteSettings,
    ) -> Self {
        Self {
            driver,
            macros,
            reporting,
            service: None,
            settings,
        }
    }

    /// Check the clock against this results service before starting
    pub fn with_service(mut self, service: ServiceClient) -> Self {
        self.service = Some(service);
        self
    }

    /// Run `benchmarks` in order
    pub async fn run(&self, benchmarks: &[Arc<Benchmark>]) -> SuiteOutcome {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut outcome = SuiteOutcome {
            benchmarks: Vec::with_capacity(benchmarks.len()),
            failures: Vec::new(),
            started_at,
            duration: Duration::ZERO,
        };

        if benchmarks.is_empty() {
            warn!("No benchmarks selected");
            return outcome;
        }

        if let Err(err) = self.prepare().await {
            error!("Suite aborted: {}", err);
            outcome.failures.push(err);
            outcome.benchmarks = skip_all(benchmarks);
            outcome.duration = start.elapsed();
            return outcome;
        }

        let progress = self.progress_bar(benchmarks.len());
        let mut remaining = benchmarks.iter();
        for benchmark in remaining.by_ref() {
            if self
                .settings
                .time_limit
                .is_some_and(|limit| start.elapsed() > limit)
            {
                warn!("Time limit for running benchmarks has run out");
                outcome
                    .benchmarks
                    .push(BenchmarkOutcome::Skipped(Arc::clone(benchmark)));
                break;
            }

            if let Err(source) = self
                .macros
                .run_phase(
                    "health_check",
                    &self.settings.health_check,
                    Some(benchmark.as_ref()),
                    None,
                )
                .await
            {
                let err = SuiteError::HealthCheck {
                    benchmark: benchmark.unique_name().to_string(),
                    source,
                };
                error!("Suite stopped: {}", err);
                outcome.failures.push(err);
                outcome
                    .benchmarks
                    .push(BenchmarkOutcome::Skipped(Arc::clone(benchmark)));
                break;
            }

            progress.set_message(benchmark.unique_name().to_string());
            let run = self.driver.execute(benchmark).await;
            outcome.benchmarks.push(BenchmarkOutcome::Executed(run));
            progress.inc(1);
        }
        outcome.benchmarks.extend(
            remaining.map(|benchmark| BenchmarkOutcome::Skipped(Arc::clone(benchmark))),
        );
        progress.finish_and_clear();

        if let Err(err) = self
            .macros
            .run_phase("after_all", &self.settings.after_all, None, None)
            .await
        {
            error!("After all macros failed: {}", err);
            outcome.failures.push(SuiteError::AfterSuite(err));
        }

        info!(
            "Waiting for {} pending reports",
            self.reporting.pending()
        );
        let drained = self.reporting.drain(self.settings.drain_timeout).await;
        for DeferredFailure { benchmark, error } in drained.failures {
            match outcome.executed_mut(&benchmark) {
                Some(run) => run
                    .post_failures
                    .push(ExecutionFailure::from_error(FailureKind::Reporting, &error)),
                None => outcome.failures.push(SuiteError::Reporting(error)),
            }
        }
        if let Some(err) = drained.timeout {
            error!("Reporting failed: {}", err);
            outcome.failures.push(SuiteError::Reporting(err));
        }

        outcome.duration = start.elapsed();
        outcome
    }

    async fn prepare(&self) -> Result<(), SuiteError> {
        if let Some(service) = &self.service {
            check_clock_drift(service, self.settings.max_clock_drift).await?;
        }
        if !self.settings.before_all.is_empty() {
            info!("Running before all macros: {:?}", self.settings.before_all);
        }
        self.macros
            .run_phase("before_all", &self.settings.before_all, None, None)
            .await
            .map_err(SuiteError::BeforeSuite)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

fn skip_all(benchmarks: &[Arc<Benchmark>]) -> Vec<BenchmarkOutcome> {
    benchmarks
        .iter()
        .map(|benchmark| BenchmarkOutcome::Skipped(Arc::clone(benchmark)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BoxError, SqlError};
    use crate::listeners::BenchmarkListener;
    use crate::macros::{BorrowedConnection, MacroDriver};
    use crate::measurements::MeasurementAggregator;
    use crate::sql::{Connection, DataSource, DataSources, StatementOutcome};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use querybench_core::{BenchmarkBuilder, Measurement, Query, QueryExecutionResult};

    struct NoopSource;

    struct NoopConnection;

    #[async_trait]
    impl Connection for NoopConnection {
        async fn execute(&mut self, _sql: &str) -> Result<StatementOutcome, SqlError> {
            Ok(StatementOutcome::default())
        }
    }

    #[async_trait]
    impl DataSource for NoopSource {
        fn name(&self) -> &str {
            "noop"
        }

        fn max_connections(&self) -> u32 {
            1
        }

        async fn connect(&self) -> Result<Box<dyn Connection>, SqlError> {
            Ok(Box::new(NoopConnection))
        }
    }

    /// Runs every macro; those named in `failing` fail. Slow ones sleep a minute.
    struct ScriptedMacros {
        ran: Arc<Mutex<Vec<String>>>,
        failing: Vec<&'static str>,
    }

    #[async_trait]
    impl MacroDriver for ScriptedMacros {
        fn name(&self) -> &str {
            "scripted"
        }

        fn can_execute(&self, _macro_name: &str) -> bool {
            true
        }

        async fn execute(
            &self,
            macro_name: &str,
            _benchmark: Option<&Benchmark>,
            _connection: Option<BorrowedConnection<'_>>,
        ) -> Result<(), BoxError> {
            self.ran.lock().push(macro_name.to_string());
            if macro_name.starts_with("slow") {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.failing.iter().any(|f| *f == macro_name) {
                return Err("scripted failure".into());
            }
            Ok(())
        }
    }

    fn orchestrator(
        settings: SuiteSettings,
        failing: Vec<&'static str>,
    ) -> (ExecutionOrchestrator, Arc<Mutex<Vec<String>>>) {
        orchestrator_with(settings, failing, Vec::new())
    }

    fn orchestrator_with(
        settings: SuiteSettings,
        failing: Vec<&'static str>,
        listeners: Vec<Arc<dyn BenchmarkListener>>,
    ) -> (ExecutionOrchestrator, Arc<Mutex<Vec<String>>>) {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let macros = MacroDispatcher::new().with_driver(Arc::new(ScriptedMacros {
            ran: Arc::clone(&ran),
            failing,
        }));
        let mut sources = DataSources::new();
        sources.register(Arc::new(NoopSource));
        let reporting = ReportingDispatcher::new(listeners);
        let driver = BenchmarkExecutionDriver::new(
            sources,
            macros.clone(),
            MeasurementAggregator::default(),
            reporting.clone(),
        );
        (
            ExecutionOrchestrator::new(driver, macros, reporting, settings),
            ran,
        )
    }

    fn benchmarks(names: &[&str], before: &[&str]) -> Vec<Arc<Benchmark>> {
        names
            .iter()
            .map(|name| {
                Arc::new(
                    BenchmarkBuilder::new(*name, "seq", vec![Query::new("q", "SELECT 1")])
                        .data_source("noop")
                        .runs(1)
                        .prewarm_runs(0)
                        .before_benchmark_macros(before.iter().map(|m| m.to_string()).collect())
                        .build()
                        .unwrap(),
                )
            })
            .collect()
    }

    fn executed(outcome: &SuiteOutcome) -> Vec<&str> {
        outcome
            .benchmarks
            .iter()
            .filter_map(|b| match b {
                BenchmarkOutcome::Executed(run) => Some(run.result.benchmark().name()),
                BenchmarkOutcome::Skipped(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_after_suite_failure_fails_suite_but_not_benchmarks() {
        let settings = SuiteSettings {
            after_all: vec!["cleanup".to_string()],
            ..Default::default()
        };
        let (orchestrator, _) = orchestrator(settings, vec!["cleanup"]);

        let outcome = orchestrator.run(&benchmarks(&["a", "b"], &[])).await;
        assert!(!outcome.is_successful());
        assert!(matches!(&outcome.failures[..], [SuiteError::AfterSuite(_)]));
        match &outcome.benchmarks[0] {
            BenchmarkOutcome::Executed(run) => assert!(run.is_successful()),
            BenchmarkOutcome::Skipped(_) => panic!("benchmark a was skipped"),
        }
    }

    #[tokio::test]
    async fn test_health_check_failure_stops_suite() {
        let settings = SuiteSettings {
            health_check: vec!["healthy".to_string()],
            after_all: vec!["after".to_string()],
            ..Default::default()
        };
        let (orchestrator, ran) = orchestrator(settings, vec!["healthy"]);

        let outcome = orchestrator.run(&benchmarks(&["a", "b"], &[])).await;
        assert!(executed(&outcome).is_empty());
        assert_eq!(outcome.benchmarks.len(), 2);
        assert!(matches!(
            &outcome.failures[0],
            SuiteError::HealthCheck { benchmark, .. } if benchmark == "a"
        ));
        // after-all still runs
        assert_eq!(*ran.lock(), vec!["healthy", "after"]);
    }

    #[tokio::test]
    async fn test_before_suite_failure_runs_nothing() {
        let settings = SuiteSettings {
            before_all: vec!["setup".to_string()],
            after_all: vec!["after".to_string()],
            ..Default::default()
        };
        let (orchestrator, ran) = orchestrator(settings, vec!["setup"]);

        let outcome = orchestrator.run(&benchmarks(&["a"], &[])).await;
        assert!(!outcome.is_successful());
        assert!(executed(&outcome).is_empty());
        assert_eq!(*ran.lock(), vec!["setup"]);
    }

    #[tokio::test]
    async fn test_failed_benchmark_does_not_stop_suite() {
        let (orchestrator, _) = orchestrator(SuiteSettings::default(), vec!["broken"]);

        let mut plan = benchmarks(&["a"], &["broken"]);
        plan.extend(benchmarks(&["b"], &[]));
        let outcome = orchestrator.run(&plan).await;
        assert_eq!(executed(&outcome), vec!["a", "b"]);
        assert!(outcome.failures.is_empty());
        assert!(!outcome.is_successful());
    }

    /// Rejects every execution report of one benchmark, after a delay
    struct LateRejecter {
        benchmark: &'static str,
    }

    #[async_trait]
    impl BenchmarkListener for LateRejecter {
        fn name(&self) -> &str {
            "late"
        }

        async fn execution_finished(
            &self,
            result: &QueryExecutionResult,
            _measurements: &[Measurement],
        ) -> Result<(), BoxError> {
            let benchmark = result.benchmark().unique_name();
            if benchmark != self.benchmark {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            Err(format!("report of {}'s execution rejected", benchmark).into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reporting_failure_charged_to_its_benchmark() {
        let (orchestrator, _) = orchestrator_with(
            SuiteSettings::default(),
            Vec::new(),
            vec![Arc::new(LateRejecter { benchmark: "a" })],
        );

        // a's report fails while b is still running
        let mut plan = benchmarks(&["a"], &[]);
        plan.extend(benchmarks(&["b"], &["slow-setup"]));
        let outcome = orchestrator.run(&plan).await;

        assert!(!outcome.is_successful());
        assert!(outcome.failures.is_empty());
        let runs: Vec<&BenchmarkRun> = outcome
            .benchmarks
            .iter()
            .filter_map(|b| match b {
                BenchmarkOutcome::Executed(run) => Some(run),
                BenchmarkOutcome::Skipped(_) => None,
            })
            .collect();
        assert_eq!(runs.len(), 2);
        assert!(!runs[0].is_successful());
        assert_eq!(runs[0].post_failures[0].kind, FailureKind::Reporting);
        assert!(runs[0].post_failures[0].message.contains("execution_finished"));
        assert!(runs[1].is_successful());
        assert!(runs[1].post_failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_limit_skips_remaining_benchmarks() {
        let settings = SuiteSettings {
            time_limit: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let (orchestrator, _) = orchestrator(settings, Vec::new());

        let mut plan = benchmarks(&["a"], &["slow-setup"]);
        plan.extend(benchmarks(&["b", "c"], &[]));
        let outcome = orchestrator.run(&plan).await;

        assert_eq!(executed(&outcome), vec!["a"]);
        assert_eq!(outcome.benchmarks.len(), 3);
        assert!(outcome.is_successful());
    }

    #[tokio::test]
    async fn test_empty_suite_succeeds() {
        let (orchestrator, ran) = orchestrator(
            SuiteSettings {
                before_all: vec!["setup".to_string()],
                ..Default::default()
            },
            Vec::new(),
        );
        let outcome = orchestrator.run(&[]).await;
        assert!(outcome.is_successful());
        assert!(ran.lock().is_empty());
    }
}
