//! Execution Synchronizer
//!
//! The metrics backend stores fixed-resolution buckets and ingests them with a
//! delay. A measured interval can only be queried once every bucket it covers
//! has landed:
//!
//! ```text
//!   start                       end
//!     │◀──────── measured ────────▶│
//!     │                    │◀─ R ─▶│   last bucket only partially covered
//!     │◀──── window ──────▶│
//!                         to ◀─ D ─▶ ready_at   safe to query
//! ```
//!
//! `to = end - R`; when `start >= to` no complete bucket exists and there is
//! nothing to wait for. Otherwise the caller waits until the absolute instant
//! `to + D`. Waits are independent of each other; nothing is shared between
//! concurrent windows.

use crate::error::SyncError;
use chrono::{DateTime, TimeDelta, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Source of absolute wall-clock instants
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Queryable part of a measured interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementWindow {
    /// Interval start
    pub from: DateTime<Utc>,
    /// Interval end with the partial last bucket dropped
    pub to: DateTime<Utc>,
    /// Earliest instant at which every bucket in the window has landed
    pub ready_at: DateTime<Utc>,
}

/// Aligns metric queries with backend ingestion
#[derive(Clone)]
pub struct ExecutionSynchronizer {
    resolution: TimeDelta,
    delay: TimeDelta,
    max_wait: Duration,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl ExecutionSynchronizer {
    /// Create a synchronizer on the system clock
    pub fn new(resolution: Duration, delay: Duration, max_wait: Duration) -> Self {
        Self {
            resolution: to_delta(resolution),
            delay: to_delta(delay),
            max_wait,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        }
    }

    /// Use a different clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Abort pending waits when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The clock used for waits
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Compute the queryable window, or `None` when no complete bucket exists
    pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<MeasurementWindow> {
        let to = end - self.resolution;
        if start >= to {
            return None;
        }
        Some(MeasurementWindow {
            from: start,
            to,
            ready_at: to + self.delay,
        })
    }

    /// Sleep until the clock reaches `instant`; returns at once if it already has
    pub async fn wait_until(&self, instant: DateTime<Utc>) -> Result<(), SyncError> {
        let Ok(remaining) = (instant - self.clock.now()).to_std() else {
            return Ok(());
        };
        if remaining.is_zero() {
            return Ok(());
        }
        if remaining > self.max_wait {
            return Err(SyncError::WaitTooLong {
                ready_at: instant,
                max_wait: self.max_wait,
            });
        }

        debug!("waiting {:?} for metrics to land (until {})", remaining, instant);
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            _ = tokio::time::sleep(remaining) => Ok(()),
        }
    }

    /// Run `query` once the window for `[start, end]` is safe to query.
    ///
    /// Returns `Ok(None)` without waiting when the interval covers no complete bucket.
    pub async fn run_when_ready<F, Fut, T, E>(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        query: F,
    ) -> Result<Option<T>, E>
    where
        F: FnOnce(MeasurementWindow) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SyncError>,
    {
        let Some(window) = self.window(start, end) else {
            debug!("interval {} - {} shorter than one bucket, skipping", start, end);
            return Ok(None);
        };
        self.wait_until(window.ready_at).await?;
        query(window).await.map(Some)
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Clock that follows tokio's (paused) time from a fixed base instant
    pub(crate) struct TokioClock {
        base: DateTime<Utc>,
        origin: tokio::time::Instant,
    }

    impl TokioClock {
        pub(crate) fn starting_at(base: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self {
                base,
                origin: tokio::time::Instant::now(),
            })
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> DateTime<Utc> {
            self.base + to_delta(self.origin.elapsed())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn sync(clock: Arc<dyn Clock>) -> ExecutionSynchronizer {
        ExecutionSynchronizer::new(
            Duration::from_secs(5),
            Duration::from_secs(2),
            Duration::from_secs(60),
        )
        .with_clock(clock)
    }

    #[test]
    fn test_window_drops_partial_bucket() {
        let s = sync(Arc::new(SystemClock));
        let window = s.window(t0(), t0() + TimeDelta::seconds(10)).unwrap();
        assert_eq!(window.to, t0() + TimeDelta::seconds(5));
        assert_eq!(window.ready_at, t0() + TimeDelta::seconds(7));

        assert!(s.window(t0(), t0() + TimeDelta::seconds(3)).is_none());
        assert!(s.window(t0(), t0() + TimeDelta::seconds(5)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_issued_no_earlier_than_ready_instant() {
        let clock = TokioClock::starting_at(t0());
        let s = sync(clock.clone());
        let started = tokio::time::Instant::now();

        let issued_at = s
            .run_when_ready(t0(), t0() + TimeDelta::seconds(10), |_| async {
                Ok::<_, SyncError>(clock.now())
            })
            .await
            .unwrap()
            .unwrap();

        assert!(issued_at >= t0() + TimeDelta::seconds(7));
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_interval_returns_immediately() {
        let s = sync(TokioClock::starting_at(t0()));
        let started = tokio::time::Instant::now();

        let result = s
            .run_when_ready(t0(), t0() + TimeDelta::seconds(3), |_| async {
                Ok::<_, SyncError>(())
            })
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_instant_does_not_wait() {
        let s = sync(TokioClock::starting_at(t0() + TimeDelta::minutes(1)));
        let started = tokio::time::Instant::now();
        s.wait_until(t0()).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_beyond_time_box_fails() {
        let s = sync(TokioClock::starting_at(t0()));
        let err = s.wait_until(t0() + TimeDelta::hours(1)).await.unwrap_err();
        assert!(matches!(err, SyncError::WaitTooLong { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait() {
        let token = CancellationToken::new();
        let s = sync(TokioClock::starting_at(t0())).with_cancellation(token.clone());
        token.cancel();
        let err = s.wait_until(t0() + TimeDelta::seconds(30)).await.unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waits_do_not_serialize() {
        let clock = TokioClock::starting_at(t0());
        let s = sync(clock);
        let started = tokio::time::Instant::now();

        let (a, b) = tokio::join!(
            s.wait_until(t0() + TimeDelta::seconds(7)),
            s.wait_until(t0() + TimeDelta::seconds(7)),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }
}
