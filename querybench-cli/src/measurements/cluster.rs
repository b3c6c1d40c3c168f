//! Cluster resource metrics from Graphite

use super::MeasurementProvider;
use crate::clients::{GraphiteClient, Series};
use crate::error::ProviderError;
use crate::synchronizer::ExecutionSynchronizer;
use async_trait::async_trait;
use querybench_core::{Granularity, Measurable, Measurement, Unit};
use querybench_stats::{last_positive, require_complete, summarize_series};
use std::collections::BTreeMap;

const NETWORK_TOTAL: &str = "network_total";

/// Cluster CPU, memory and network usage over a concurrent benchmark.
///
/// Waits through the [`ExecutionSynchronizer`] until the benchmark's window
/// has been ingested, then issues one range query for all expressions.
pub struct ClusterMetricsProvider {
    client: GraphiteClient,
    synchronizer: ExecutionSynchronizer,
    /// (metric name, expression, unit)
    metrics: Vec<(String, String, Unit)>,
}

impl ClusterMetricsProvider {
    /// Create a provider for the configured expressions
    pub fn new(
        client: GraphiteClient,
        synchronizer: ExecutionSynchronizer,
        cpu: Option<String>,
        memory: Option<String>,
        network: Option<String>,
    ) -> Self {
        let mut metrics = Vec::new();
        if let Some(expr) = cpu {
            metrics.push(("cpu".to_string(), expr, Unit::Percent));
        }
        if let Some(expr) = memory {
            metrics.push(("memory".to_string(), expr, Unit::Percent));
        }
        if let Some(expr) = network {
            metrics.push((
                NETWORK_TOTAL.to_string(),
                format!("integral({})", expr),
                Unit::Bytes,
            ));
            metrics.push(("network".to_string(), expr, Unit::Bytes));
        }
        Self {
            client,
            synchronizer,
            metrics,
        }
    }

    fn targets(&self) -> Vec<(String, String)> {
        self.metrics
            .iter()
            .map(|(name, expr, _)| (name.clone(), expr.clone()))
            .collect()
    }

    fn to_measurements(
        &self,
        series: &BTreeMap<String, Series>,
    ) -> Result<Vec<Measurement>, ProviderError> {
        let mut measurements = Vec::new();
        for (name, _, unit) in &self.metrics {
            let points = series.get(name).ok_or_else(|| {
                ProviderError::IncompleteData(format!("no series returned for '{}'", name))
            })?;
            let values = require_complete(points).map_err(|e| {
                ProviderError::IncompleteData(format!("series '{}': {}", name, e))
            })?;

            if name == NETWORK_TOTAL {
                measurements.push(Measurement::new(
                    format!("cluster-{}", name),
                    *unit,
                    last_positive(&values),
                ));
            } else if let Some(summary) = summarize_series(&values) {
                measurements.push(Measurement::new(format!("cluster-{}_max", name), *unit, summary.max));
                measurements.push(Measurement::new(format!("cluster-{}_mean", name), *unit, summary.mean));
            }
        }
        Ok(measurements)
    }
}

#[async_trait]
impl MeasurementProvider for ClusterMetricsProvider {
    fn name(&self) -> &str {
        "cluster"
    }

    fn applies_to(&self, measurable: &Measurable) -> bool {
        !self.metrics.is_empty()
            && measurable.granularity() == Granularity::Benchmark
            && measurable.benchmark().is_concurrent()
            && measurable.is_successful()
    }

    async fn load(&self, measurable: &Measurable) -> Result<Vec<Measurement>, ProviderError> {
        let (Some(start), Some(end)) = (measurable.start(), measurable.end()) else {
            return Ok(Vec::new());
        };
        let targets = self.targets();
        let series = self
            .synchronizer
            .run_when_ready(start, end, |window| async move {
                self.client
                    .render(&targets, window.from, window.to)
                    .await
                    .map_err(ProviderError::from)
            })
            .await?;

        match series {
            Some(series) => self.to_measurements(&series),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::HttpClient;
    use crate::measurements::tests::{benchmark, benchmark_measurable};
    use std::time::Duration;

    fn provider() -> ClusterMetricsProvider {
        ClusterMetricsProvider::new(
            GraphiteClient::new(
                "http://127.0.0.1:9",
                HttpClient::new(Duration::from_millis(100)).unwrap(),
            ),
            ExecutionSynchronizer::new(
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(300),
            ),
            Some("cpu.expr".to_string()),
            None,
            Some("net.expr".to_string()),
        )
    }

    #[test]
    fn test_targets_include_network_integral() {
        let targets = provider().targets();
        assert_eq!(
            targets,
            vec![
                ("cpu".to_string(), "cpu.expr".to_string()),
                ("network_total".to_string(), "integral(net.expr)".to_string()),
                ("network".to_string(), "net.expr".to_string()),
            ]
        );
    }

    #[test]
    fn test_measurements_from_series() {
        let series = BTreeMap::from([
            ("cpu".to_string(), vec![Some(10.0), Some(30.0)]),
            ("network".to_string(), vec![Some(100.0), Some(300.0)]),
            ("network_total".to_string(), vec![Some(100.0), Some(400.0), Some(0.0)]),
        ]);
        let measurements = provider().to_measurements(&series).unwrap();
        let by_name: BTreeMap<_, _> = measurements
            .iter()
            .map(|m| (m.name.as_str(), (m.unit, m.value)))
            .collect();

        assert_eq!(by_name["cluster-cpu_max"], (Unit::Percent, 30.0));
        assert_eq!(by_name["cluster-cpu_mean"], (Unit::Percent, 20.0));
        assert_eq!(by_name["cluster-network_max"], (Unit::Bytes, 300.0));
        assert_eq!(by_name["cluster-network_total"], (Unit::Bytes, 400.0));
    }

    #[test]
    fn test_null_datapoint_is_incomplete() {
        let series = BTreeMap::from([
            ("cpu".to_string(), vec![Some(10.0), None]),
            ("network".to_string(), vec![Some(1.0)]),
            ("network_total".to_string(), vec![Some(1.0)]),
        ]);
        let err = provider().to_measurements(&series).unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_short_benchmark_yields_nothing() {
        // 1s benchmark is shorter than one 10s bucket, so no request is made
        let measurable = benchmark_measurable(&benchmark(4, 2), 1000, false);
        let p = provider();
        assert!(p.applies_to(&measurable));
        assert!(p.load(&measurable).await.unwrap().is_empty());
    }
}
