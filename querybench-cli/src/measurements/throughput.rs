//! Queries per second for concurrent benchmarks

use super::MeasurementProvider;
use crate::error::ProviderError;
use async_trait::async_trait;
use querybench_core::{Granularity, Measurable, Measurement, Unit};

/// `throughput` = executions / duration, for successful concurrent benchmarks
#[derive(Debug, Clone, Copy, Default)]
pub struct ThroughputProvider;

#[async_trait]
impl MeasurementProvider for ThroughputProvider {
    fn name(&self) -> &str {
        "throughput"
    }

    fn applies_to(&self, measurable: &Measurable) -> bool {
        measurable.granularity() == Granularity::Benchmark
            && measurable.benchmark().is_concurrent()
            && measurable.is_successful()
    }

    async fn load(&self, measurable: &Measurable) -> Result<Vec<Measurement>, ProviderError> {
        let Some(duration) = measurable.duration() else {
            return Ok(Vec::new());
        };
        let millis = duration.as_secs_f64() * 1000.0;
        if millis <= 0.0 {
            return Ok(Vec::new());
        }
        let executions = measurable.executions().len() as f64;
        Ok(vec![Measurement::new(
            "throughput",
            Unit::QueryPerSecond,
            executions / millis * 1000.0,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::tests::{benchmark, benchmark_measurable, execution_measurable};

    #[test]
    fn test_applicability() {
        let provider = ThroughputProvider;
        let concurrent = benchmark(5, 4);
        assert!(provider.applies_to(&benchmark_measurable(&concurrent, 1000, false)));
        assert!(!provider.applies_to(&benchmark_measurable(&concurrent, 1000, true)));
        assert!(!provider.applies_to(&execution_measurable(&concurrent, 10)));
        assert!(!provider.applies_to(&benchmark_measurable(&benchmark(1, 4), 1000, false)));
    }

    #[tokio::test]
    async fn test_value() {
        let measurable = benchmark_measurable(&benchmark(5, 4), 500, false);
        let measurements = ThroughputProvider.load(&measurable).await.unwrap();
        assert_eq!(measurements.len(), 1);
        assert!((measurements[0].value - 8.0).abs() < 1e-9);
    }
}
