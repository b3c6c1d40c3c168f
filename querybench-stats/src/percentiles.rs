//! Percentile Computation
//!
//! Linear interpolation between nearest ranks over the raw durations. Slow
//! executions are kept: the tail is what the percentiles are for.

/// Standard latency percentiles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentiles {
    /// 50th percentile (median)
    pub p50: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
}

/// Percentile of an already sorted slice
fn percentile_of_sorted(sorted: &[f64], percentile: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (percentile / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = (lower + 1).min(n - 1);
            sorted[lower] + (rank - lower as f64) * (sorted[upper] - sorted[lower])
        }
    }
}

fn sorted_copy(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Compute a single percentile (0-100) from unsorted samples
pub fn compute_percentile(samples: &[f64], percentile: f64) -> f64 {
    percentile_of_sorted(&sorted_copy(samples), percentile)
}

/// Compute p50/p90/p95/p99 with a single sort
pub fn compute_percentiles(samples: &[f64]) -> Percentiles {
    let sorted = sorted_copy(samples);
    Percentiles {
        p50: percentile_of_sorted(&sorted, 50.0),
        p90: percentile_of_sorted(&sorted, 90.0),
        p95: percentile_of_sorted(&sorted, 95.0),
        p99: percentile_of_sorted(&sorted, 99.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_of_odd_count() {
        assert!((compute_percentile(&[5.0, 1.0, 3.0, 2.0, 4.0], 50.0) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_interpolates_between_ranks() {
        // rank = 0.9 * 3 = 2.7 -> 30 + 0.7 * 10
        assert!((compute_percentile(&[10.0, 20.0, 30.0, 40.0], 90.0) - 37.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_and_empty() {
        assert_eq!(compute_percentile(&[42.0], 99.0), 42.0);
        assert_eq!(compute_percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_all_percentiles_ordered() {
        let samples: Vec<f64> = (1..=200u32).rev().map(f64::from).collect();
        let p = compute_percentiles(&samples);
        assert!(p.p50 < p.p90 && p.p90 < p.p95 && p.p95 < p.p99);
        assert!(p.p99 <= 200.0);
    }
}
