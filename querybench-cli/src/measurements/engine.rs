//! Engine query statistics

use super::MeasurementProvider;
use crate::clients::EngineClient;
use crate::error::ProviderError;
use async_trait::async_trait;
use futures::future::try_join_all;
use querybench_core::{Granularity, Measurable, Measurement, Unit};
use serde_json::{Map, Value};

const TIME_STATS: &[&str] = &[
    "planningTime",
    "analysisTime",
    "totalCpuTime",
    "totalScheduledTime",
    "queuedTime",
    "elapsedTime",
    "finishingTime",
    "physicalInputReadTime",
];

const SIZE_STATS: &[&str] = &[
    "rawInputDataSize",
    "physicalInputDataSize",
    "physicalWrittenDataSize",
    "internalNetworkInputDataSize",
    "peakTotalMemoryReservation",
];

/// Engine-side timings and data sizes looked up by correlation id.
///
/// Serial benchmarks get one set per query; concurrent benchmarks get the
/// sum over all executions at benchmark level.
pub struct EngineStatsProvider {
    client: EngineClient,
}

impl EngineStatsProvider {
    /// Create a provider backed by `client`
    pub fn new(client: EngineClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MeasurementProvider for EngineStatsProvider {
    fn name(&self) -> &str {
        "engine"
    }

    fn applies_to(&self, measurable: &Measurable) -> bool {
        match measurable.granularity() {
            Granularity::Query => measurable.benchmark().is_serial(),
            Granularity::Benchmark => measurable.benchmark().is_concurrent(),
        }
    }

    async fn load(&self, measurable: &Measurable) -> Result<Vec<Measurement>, ProviderError> {
        let ids: Vec<&str> = measurable
            .executions()
            .iter()
            .filter_map(|e| e.correlation_id())
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let stats = try_join_all(ids.iter().map(|id| self.client.query_stats(id))).await?;
        let per_query: Vec<Vec<Measurement>> = stats
            .iter()
            .map(stats_to_measurements)
            .collect::<Result<_, _>>()?;
        Ok(sum_by_name(per_query))
    }
}

fn stats_to_measurements(stats: &Map<String, Value>) -> Result<Vec<Measurement>, ProviderError> {
    let units = TIME_STATS
        .iter()
        .map(|name| (*name, Unit::Milliseconds))
        .chain(SIZE_STATS.iter().map(|name| (*name, Unit::Bytes)));

    let mut measurements = Vec::new();
    for (name, unit) in units {
        let Some(value) = stats.get(name) else {
            continue;
        };
        let parsed = parse_stat_value(value, unit).ok_or_else(|| {
            ProviderError::Fatal(format!("cannot parse engine stat {} = {}", name, value))
        })?;
        measurements.push(Measurement::new(name, unit, parsed));
    }
    Ok(measurements)
}

fn sum_by_name(per_query: Vec<Vec<Measurement>>) -> Vec<Measurement> {
    let mut iter = per_query.into_iter();
    let Some(mut total) = iter.next() else {
        return Vec::new();
    };
    for measurements in iter {
        for m in measurements {
            match total.iter_mut().find(|t| t.name == m.name) {
                Some(existing) => existing.value += m.value,
                None => total.push(m),
            }
        }
    }
    total
}

/// Parse a stat given as a plain number or a unit string (`"1.50s"`, `"12.3MB"`)
/// into milliseconds or bytes.
pub fn parse_stat_value(value: &Value, unit: Unit) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            let split = s
                .char_indices()
                .find(|(_, c)| c.is_alphabetic())
                .map(|(i, _)| i)
                .unwrap_or(s.len());
            let (number, suffix) = s.split_at(split);
            let number: f64 = number.trim().parse().ok()?;
            let factor = match unit {
                Unit::Milliseconds => time_factor(suffix)?,
                Unit::Bytes => size_factor(suffix)?,
                _ => return None,
            };
            Some(number * factor)
        }
        _ => None,
    }
}

fn time_factor(suffix: &str) -> Option<f64> {
    Some(match suffix {
        "ns" => 1e-6,
        "us" => 1e-3,
        "ms" | "" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        "d" => 86_400_000.0,
        _ => return None,
    })
}

fn size_factor(suffix: &str) -> Option<f64> {
    let power = match suffix {
        "B" | "" => 0,
        "kB" | "KB" => 1,
        "MB" => 2,
        "GB" => 3,
        "TB" => 4,
        "PB" => 5,
        _ => return None,
    };
    Some(1024_f64.powi(power))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_stat_value() {
        let ms = |v: Value| parse_stat_value(&v, Unit::Milliseconds);
        let bytes = |v: Value| parse_stat_value(&v, Unit::Bytes);

        assert_eq!(ms(json!("1.50s")), Some(1500.0));
        assert_eq!(ms(json!("250.00ms")), Some(250.0));
        assert_eq!(ms(json!("2.00m")), Some(120_000.0));
        assert_eq!(ms(json!(42)), Some(42.0));
        assert_eq!(bytes(json!("2kB")), Some(2048.0));
        assert_eq!(bytes(json!("1.5MB")), Some(1.5 * 1024.0 * 1024.0));
        assert_eq!(bytes(json!("17B")), Some(17.0));
        assert_eq!(ms(json!("fast")), None);
        assert_eq!(bytes(json!("3 parsecs")), None);
        assert_eq!(ms(json!(null)), None);
    }

    #[test]
    fn test_stats_to_measurements_skips_missing() {
        let stats = json!({"elapsedTime": "2.00s", "rawInputDataSize": "1kB", "state": "FINISHED"});
        let measurements = stats_to_measurements(stats.as_object().unwrap()).unwrap();
        assert_eq!(
            measurements,
            vec![
                Measurement::millis("elapsedTime", 2000.0),
                Measurement::bytes("rawInputDataSize", 1024.0),
            ]
        );
    }

    #[test]
    fn test_sum_by_name() {
        let summed = sum_by_name(vec![
            vec![Measurement::millis("elapsedTime", 10.0)],
            vec![
                Measurement::millis("elapsedTime", 5.0),
                Measurement::bytes("rawInputDataSize", 3.0),
            ],
        ]);
        assert_eq!(
            summed,
            vec![
                Measurement::millis("elapsedTime", 15.0),
                Measurement::bytes("rawInputDataSize", 3.0),
            ]
        );
    }
}
