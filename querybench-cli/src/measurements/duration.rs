//! Wall-clock duration

use super::MeasurementProvider;
use crate::error::ProviderError;
use async_trait::async_trait;
use querybench_core::{Granularity, Measurable, Measurement};

/// `duration` in milliseconds: per query for serial benchmarks, per benchmark for concurrent ones
#[derive(Debug, Clone, Copy, Default)]
pub struct DurationProvider;

#[async_trait]
impl MeasurementProvider for DurationProvider {
    fn name(&self) -> &str {
        "duration"
    }

    fn applies_to(&self, measurable: &Measurable) -> bool {
        match measurable.granularity() {
            Granularity::Query => measurable.benchmark().is_serial(),
            Granularity::Benchmark => measurable.benchmark().is_concurrent(),
        }
    }

    async fn load(&self, measurable: &Measurable) -> Result<Vec<Measurement>, ProviderError> {
        Ok(measurable
            .duration()
            .map(|d| Measurement::millis("duration", d.as_secs_f64() * 1000.0))
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::tests::{benchmark, benchmark_measurable, execution_measurable};

    #[tokio::test]
    async fn test_serial_measures_each_query() {
        let serial = benchmark(1, 3);
        let provider = DurationProvider;

        let query = execution_measurable(&serial, 250);
        assert!(provider.applies_to(&query));
        let measurements = provider.load(&query).await.unwrap();
        assert_eq!(measurements, vec![Measurement::millis("duration", 250.0)]);

        assert!(!provider.applies_to(&benchmark_measurable(&serial, 1000, false)));
    }

    #[tokio::test]
    async fn test_concurrent_measures_whole_benchmark() {
        let concurrent = benchmark(4, 3);
        let provider = DurationProvider;

        assert!(!provider.applies_to(&execution_measurable(&concurrent, 250)));
        let whole = benchmark_measurable(&concurrent, 1500, true);
        assert!(provider.applies_to(&whole));
        assert_eq!(
            provider.load(&whole).await.unwrap(),
            vec![Measurement::millis("duration", 1500.0)]
        );
    }
}
