//! Measurement Collection
//!
//! After a query or benchmark execution completes, every applicable provider
//! is run as its own task and the results are merged:
//!
//! ```text
//!                 ┌──────────────┐
//!            ┌───▶│   duration   │────┐
//!            │    └──────────────┘    │
//!            │    ┌──────────────┐    │
//! Measurable ┼───▶│  throughput  │────┼──▶ join (registration order) ──▶ Vec<Measurement>
//!            │    └──────────────┘    │
//!            │    ┌──────────────┐    │
//!            └───▶│   cluster    │────┘   retried on transient failure
//!                 └──────────────┘
//! ```
//!
//! Providers decide applicability per measurable. Query-level and
//! benchmark-level measurements of the same kind are mutually exclusive.

mod cluster;
mod duration;
mod engine;
mod throughput;

pub use cluster::ClusterMetricsProvider;
pub use duration::DurationProvider;
pub use engine::{EngineStatsProvider, parse_stat_value};
pub use throughput::ThroughputProvider;

use crate::config::{BenchConfig, MeasurementConfig};
use crate::error::{ConfigError, MeasurementError, ProviderError};
use async_trait::async_trait;
use querybench_core::{Measurable, Measurement};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A source of measurements for finished executions
#[async_trait]
pub trait MeasurementProvider: Send + Sync {
    /// Provider name, used in logs and errors
    fn name(&self) -> &str;

    /// Whether this provider contributes for `measurable`
    fn applies_to(&self, measurable: &Measurable) -> bool;

    /// Load measurements; called only when [`applies_to`](Self::applies_to) holds
    async fn load(&self, measurable: &Measurable) -> Result<Vec<Measurement>, ProviderError>;
}

/// Retry schedule for transient provider failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_backoff: Duration,
    /// Growth factor between delays
    pub multiplier: f64,
    /// Upper bound for one delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Build from the `[measurement]` section
    pub fn from_config(config: &MeasurementConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: BenchConfig::parse_duration(&config.initial_backoff)?,
            multiplier: config.backoff_multiplier,
            max_backoff: BenchConfig::parse_duration(&config.max_backoff)?,
        })
    }

    /// Delay after failed attempt `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// Fans out to registered providers and joins their results
#[derive(Clone, Default)]
pub struct MeasurementAggregator {
    providers: Vec<Arc<dyn MeasurementProvider>>,
    retry: RetryPolicy,
}

impl MeasurementAggregator {
    /// Create an aggregator with no providers
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            providers: Vec::new(),
            retry,
        }
    }

    /// Register a provider; results are merged in registration order
    pub fn register(&mut self, provider: Arc<dyn MeasurementProvider>) {
        self.providers.push(provider);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_provider(mut self, provider: Arc<dyn MeasurementProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Registered provider names
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name())
    }

    /// Collect measurements from every applicable provider.
    ///
    /// All provider tasks are joined before returning; the first failure in
    /// registration order is surfaced.
    pub async fn collect(&self, measurable: Measurable) -> Result<Vec<Measurement>, MeasurementError> {
        let handles: Vec<_> = self
            .providers
            .iter()
            .filter(|p| p.applies_to(&measurable))
            .map(|provider| {
                let name = provider.name().to_string();
                let handle = tokio::spawn(load_with_retry(
                    Arc::clone(provider),
                    measurable.clone(),
                    self.retry.clone(),
                ));
                (name, handle)
            })
            .collect();

        let mut measurements = Vec::new();
        let mut first_error = None;
        for (provider, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(_) => Err(MeasurementError::Aborted { provider }),
            };
            match outcome {
                Ok(loaded) => measurements.extend(loaded),
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(measurements),
        }
    }
}

async fn load_with_retry(
    provider: Arc<dyn MeasurementProvider>,
    measurable: Measurable,
    retry: RetryPolicy,
) -> Result<Vec<Measurement>, MeasurementError> {
    let mut attempt = 1;
    loop {
        match provider.load(&measurable).await {
            Ok(measurements) => {
                debug!(
                    provider = provider.name(),
                    "loaded {} measurements",
                    measurements.len()
                );
                return Ok(measurements);
            }
            Err(error) if error.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.delay(attempt);
                warn!(
                    provider = provider.name(),
                    "attempt {}/{} failed: {}; retrying in {:?}",
                    attempt,
                    retry.max_attempts,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) if error.is_transient() => {
                return Err(MeasurementError::RetriesExhausted {
                    provider: provider.name().to_string(),
                    attempts: attempt,
                    source: error,
                });
            }
            Err(error) => {
                return Err(MeasurementError::Fatal {
                    provider: provider.name().to_string(),
                    source: error,
                });
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use querybench_core::{
        Benchmark, BenchmarkBuilder, BenchmarkExecutionResultBuilder, ExecutionFailure,
        FailureKind, Query, QueryExecution, QueryExecutionResultBuilder, Unit,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    pub(crate) fn benchmark(concurrency: u32, runs: u32) -> Arc<Benchmark> {
        Arc::new(
            BenchmarkBuilder::new("bench", "seq", vec![Query::new("q", "SELECT 1")])
                .data_source("ds")
                .concurrency(concurrency)
                .runs(runs)
                .build()
                .unwrap(),
        )
    }

    /// Benchmark measurable with `runs` executions of 100ms each spanning `span_ms`
    pub(crate) fn benchmark_measurable(
        benchmark: &Arc<Benchmark>,
        span_ms: i64,
        failing: bool,
    ) -> Measurable {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let executions = (0..benchmark.runs())
            .map(|run| {
                let exec = QueryExecution::new(Arc::clone(benchmark), 0, run, run);
                let builder = QueryExecutionResultBuilder::started(exec, t0)
                    .correlation_id(Some(format!("q{}", run)));
                let end = t0 + TimeDelta::milliseconds(100);
                if failing {
                    builder.failed(end, ExecutionFailure::new(FailureKind::Query, "boom"))
                } else {
                    builder.succeeded(end)
                }
            })
            .collect();
        Measurable::Benchmark(Arc::new(
            BenchmarkExecutionResultBuilder::new(Arc::clone(benchmark))
                .start_timer(t0)
                .end_timer(t0 + TimeDelta::milliseconds(span_ms))
                .executions(executions)
                .build(),
        ))
    }

    pub(crate) fn execution_measurable(benchmark: &Arc<Benchmark>, ms: i64) -> Measurable {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let exec = QueryExecution::new(Arc::clone(benchmark), 0, 0, 0);
        Measurable::Execution(Arc::new(
            QueryExecutionResultBuilder::started(exec, t0)
                .correlation_id(Some("q0".to_string()))
                .succeeded(t0 + TimeDelta::milliseconds(ms)),
        ))
    }

    struct Flaky {
        name: &'static str,
        failures_before_success: u32,
        error: fn() -> ProviderError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl MeasurementProvider for Flaky {
        fn name(&self) -> &str {
            self.name
        }

        fn applies_to(&self, _measurable: &Measurable) -> bool {
            true
        }

        async fn load(&self, _measurable: &Measurable) -> Result<Vec<Measurement>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err((self.error)())
            } else {
                Ok(vec![Measurement::new(self.name, Unit::None, 1.0)])
            }
        }
    }

    fn flaky(name: &'static str, failures: u32, error: fn() -> ProviderError) -> Arc<Flaky> {
        Arc::new(Flaky {
            name,
            failures_before_success: failures,
            error,
            calls: AtomicU32::new(0),
        })
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let p = policy();
        assert_eq!(p.delay(1), Duration::from_secs(5));
        assert_eq!(p.delay(2), Duration::from_secs(10));
        assert_eq!(p.delay(3), Duration::from_secs(20));
        assert_eq!(p.delay(5), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let provider = flaky("net", 2, || ProviderError::Transient("reset".into()));
        let aggregator = MeasurementAggregator::new(policy()).with_provider(provider.clone());
        let started = tokio::time::Instant::now();

        let measurements = aggregator
            .collect(benchmark_measurable(&benchmark(2, 1), 1000, false))
            .await
            .unwrap();

        assert_eq!(measurements.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_as_failure() {
        let provider = flaky("graphite", u32::MAX, || {
            ProviderError::IncompleteData("null datapoint".into())
        });
        let aggregator = MeasurementAggregator::new(policy()).with_provider(provider.clone());

        let err = aggregator
            .collect(benchmark_measurable(&benchmark(2, 1), 1000, false))
            .await
            .unwrap_err();

        assert!(matches!(err, MeasurementError::RetriesExhausted { attempts: 4, .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fatal_failures_are_not_retried() {
        let provider = flaky("engine", u32::MAX, || ProviderError::Fatal("404".into()));
        let aggregator = MeasurementAggregator::new(policy()).with_provider(provider.clone());

        let err = aggregator
            .collect(benchmark_measurable(&benchmark(2, 1), 1000, false))
            .await
            .unwrap_err();

        assert!(matches!(err, MeasurementError::Fatal { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_results_merge_in_registration_order() {
        let aggregator = MeasurementAggregator::new(policy())
            .with_provider(flaky("b", 0, || ProviderError::Fatal(String::new())))
            .with_provider(flaky("a", 0, || ProviderError::Fatal(String::new())));

        let names: Vec<_> = aggregator
            .collect(benchmark_measurable(&benchmark(2, 1), 1000, false))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_concurrent_benchmark_granularity_is_exclusive() {
        let aggregator = MeasurementAggregator::new(policy())
            .with_provider(Arc::new(DurationProvider))
            .with_provider(Arc::new(ThroughputProvider));
        let bm = benchmark(5, 10);

        let benchmark_level = aggregator
            .collect(benchmark_measurable(&bm, 2000, false))
            .await
            .unwrap();
        let throughput: Vec<_> = benchmark_level
            .iter()
            .filter(|m| m.name == "throughput")
            .collect();
        assert_eq!(throughput.len(), 1);
        assert_eq!(throughput[0].unit, Unit::QueryPerSecond);
        assert!((throughput[0].value - 5.0).abs() < 1e-9);

        let query_level = aggregator.collect(execution_measurable(&bm, 100)).await.unwrap();
        assert!(query_level.is_empty());
    }
}
