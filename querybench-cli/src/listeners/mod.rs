//! Lifecycle Reporting
//!
//! Listeners are notified of benchmark and execution lifecycle events. The
//! dispatcher sorts them once by explicit priority (lower first, ties keep
//! registration order) and polls their futures in that order inside one task
//! per event.
//!
//! ```text
//!                       ┌──────────────────┐
//! benchmark_started ───▶│ logging  (-100)  │
//! benchmark_finished    │ service  (0)     │──▶ joined before the next benchmark
//! concurrency_test      │ graphite (10)    │
//!                       └──────────────────┘
//! execution_started ──┐
//! execution_finished ─┴──▶ deferred ──▶ reaped after their benchmark, drained at suite end
//! ```
//!
//! Failures are never dropped: the first failing listener of a joined event
//! is returned to the caller, and deferred failures resurface at reap or drain
//! tagged with the benchmark that deferred them.

mod graphite;
mod logging;
mod service;

pub use graphite::GraphiteEventListener;
pub use logging::LoggingListener;
pub use service::{ServiceListener, check_clock_drift};

use crate::error::{BoxError, ReportingError};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use querybench_core::{
    Benchmark, BenchmarkExecutionResult, Measurement, QueryExecution, QueryExecutionResult,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Receives lifecycle events; every method defaults to a no-op
#[async_trait]
pub trait BenchmarkListener: Send + Sync {
    /// Listener name, used in errors
    fn name(&self) -> &str;

    /// Notification order; lower runs first
    fn priority(&self) -> i32 {
        0
    }

    /// A benchmark passed its before-benchmark macros and prewarm
    async fn benchmark_started(&self, _benchmark: &Benchmark) -> Result<(), BoxError> {
        Ok(())
    }

    /// A benchmark completed, with its benchmark-level measurements
    async fn benchmark_finished(
        &self,
        _result: &BenchmarkExecutionResult,
        _measurements: &[Measurement],
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// A serial benchmark's query execution is about to run
    async fn execution_started(&self, _execution: &QueryExecution) -> Result<(), BoxError> {
        Ok(())
    }

    /// A serial benchmark's query execution completed, with its measurements
    async fn execution_finished(
        &self,
        _result: &QueryExecutionResult,
        _measurements: &[Measurement],
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// All executions of a concurrent benchmark completed
    async fn concurrency_test_finished(
        &self,
        _benchmark: &Benchmark,
        _executions: &[QueryExecutionResult],
    ) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A spawned notification of every listener for one event
pub struct Notification {
    event: &'static str,
    handle: JoinHandle<Vec<(String, Result<(), BoxError>)>>,
}

impl Notification {
    /// Wait for every listener; returns the first failure in listener order
    pub async fn join(self) -> Result<(), ReportingError> {
        let outcomes = self
            .handle
            .await
            .map_err(|_| ReportingError::Aborted { event: self.event })?;

        let mut first = None;
        for (listener, outcome) in outcomes {
            if let Err(source) = outcome {
                error!(listener = %listener, "{} notification failed: {}", self.event, source);
                first.get_or_insert(ReportingError::Listener {
                    listener,
                    event: self.event,
                    source,
                });
            }
        }
        first.map_or(Ok(()), Err)
    }
}

struct PendingTask {
    benchmark: String,
    handle: JoinHandle<Result<(), ReportingError>>,
}

/// A deferred reporting failure
#[derive(Debug)]
pub struct DeferredFailure {
    /// Unique name of the benchmark whose execution was being reported
    pub benchmark: String,
    /// The failure
    pub error: ReportingError,
}

/// Outcome of waiting for every deferred reporting task
#[derive(Debug, Default)]
pub struct Drained {
    /// Failed tasks, in deferral order
    pub failures: Vec<DeferredFailure>,
    /// Set when the time box ran out; unfinished tasks were aborted
    pub timeout: Option<ReportingError>,
}

impl Drained {
    /// Every task finished in time and none failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.timeout.is_none()
    }
}

/// Fans lifecycle events out to ordered listeners
#[derive(Clone, Default)]
pub struct ReportingDispatcher {
    listeners: Arc<Vec<Arc<dyn BenchmarkListener>>>,
    pending: Arc<Mutex<Vec<PendingTask>>>,
}

impl ReportingDispatcher {
    /// Create a dispatcher; listeners are stably sorted by priority
    pub fn new(listeners: Vec<Arc<dyn BenchmarkListener>>) -> Self {
        let mut listeners = listeners;
        listeners.sort_by_key(|l| l.priority());
        Self {
            listeners: Arc::new(listeners),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Listener names in notification order
    pub fn listener_names(&self) -> Vec<String> {
        self.listeners.iter().map(|l| l.name().to_string()).collect()
    }

    fn notify<F>(&self, event: &'static str, call: F) -> Notification
    where
        F: Fn(Arc<dyn BenchmarkListener>) -> BoxFuture<'static, Result<(), BoxError>>,
    {
        let calls: Vec<_> = self
            .listeners
            .iter()
            .map(|l| (l.name().to_string(), call(Arc::clone(l))))
            .collect();
        debug!("notifying {} listeners of {}", calls.len(), event);
        let handle = tokio::spawn(async move {
            let (names, futures): (Vec<_>, Vec<_>) = calls.into_iter().unzip();
            let outcomes = join_all(futures).await;
            names.into_iter().zip(outcomes).collect()
        });
        Notification { event, handle }
    }

    /// Notify benchmark start and wait for every listener
    pub async fn benchmark_started(&self, benchmark: &Arc<Benchmark>) -> Result<(), ReportingError> {
        let benchmark = Arc::clone(benchmark);
        self.notify("benchmark_started", move |l| {
            let benchmark = Arc::clone(&benchmark);
            async move { l.benchmark_started(&benchmark).await }.boxed()
        })
        .join()
        .await
    }

    /// Notify benchmark completion and wait for every listener
    pub async fn benchmark_finished(
        &self,
        result: &Arc<BenchmarkExecutionResult>,
        measurements: &Arc<Vec<Measurement>>,
    ) -> Result<(), ReportingError> {
        let result = Arc::clone(result);
        let measurements = Arc::clone(measurements);
        self.notify("benchmark_finished", move |l| {
            let result = Arc::clone(&result);
            let measurements = Arc::clone(&measurements);
            async move { l.benchmark_finished(&result, &measurements).await }.boxed()
        })
        .join()
        .await
    }

    /// Notify completion of a concurrent benchmark's executions and wait
    pub async fn concurrency_test_finished(
        &self,
        benchmark: &Arc<Benchmark>,
        executions: &Arc<Vec<QueryExecutionResult>>,
    ) -> Result<(), ReportingError> {
        let benchmark = Arc::clone(benchmark);
        let executions = Arc::clone(executions);
        self.notify("concurrency_test_finished", move |l| {
            let benchmark = Arc::clone(&benchmark);
            let executions = Arc::clone(&executions);
            async move { l.concurrency_test_finished(&benchmark, &executions).await }.boxed()
        })
        .join()
        .await
    }

    /// Start notifying execution start without waiting
    pub fn execution_started(&self, execution: &QueryExecution) -> Notification {
        let execution = Arc::new(execution.clone());
        self.notify("execution_started", move |l| {
            let execution = Arc::clone(&execution);
            async move { l.execution_started(&execution).await }.boxed()
        })
    }

    /// Notify execution completion and wait for every listener
    pub async fn execution_finished(
        &self,
        result: &Arc<QueryExecutionResult>,
        measurements: &Arc<Vec<Measurement>>,
    ) -> Result<(), ReportingError> {
        let result = Arc::clone(result);
        let measurements = Arc::clone(measurements);
        self.notify("execution_finished", move |l| {
            let result = Arc::clone(&result);
            let measurements = Arc::clone(&measurements);
            async move { l.execution_finished(&result, &measurements).await }.boxed()
        })
        .join()
        .await
    }

    /// Run reporting work for `benchmark` in the background; its outcome is
    /// checked by [`reap_finished`](Self::reap_finished) or [`drain`](Self::drain)
    pub fn defer<F>(&self, benchmark: &str, task: F)
    where
        F: Future<Output = Result<(), ReportingError>> + Send + 'static,
    {
        self.pending.lock().push(PendingTask {
            benchmark: benchmark.to_string(),
            handle: tokio::spawn(task),
        });
    }

    /// Number of deferred tasks not yet checked
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Check `benchmark`'s deferred tasks that already completed.
    ///
    /// Unfinished tasks, and tasks of other benchmarks, stay pending.
    pub async fn reap_finished(&self, benchmark: &str) -> Result<(), ReportingError> {
        let finished: Vec<PendingTask> = {
            let mut pending = self.pending.lock();
            let (finished, running): (Vec<_>, Vec<_>) = pending
                .drain(..)
                .partition(|task| task.benchmark == benchmark && task.handle.is_finished());
            *pending = running;
            finished
        };

        let mut first = None;
        for task in finished {
            if let Err(err) = flatten(task.handle.await) {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Wait for every deferred task, giving up after `timeout`
    pub async fn drain(&self, timeout: Duration) -> Drained {
        let tasks: Vec<PendingTask> = std::mem::take(&mut *self.pending.lock());
        let deadline = tokio::time::Instant::now() + timeout;

        let mut drained = Drained::default();
        let mut tasks = tasks.into_iter();
        while let Some(mut task) = tasks.next() {
            match tokio::time::timeout_at(deadline, &mut task.handle).await {
                Ok(outcome) => {
                    if let Err(error) = flatten(outcome) {
                        drained.failures.push(DeferredFailure {
                            benchmark: task.benchmark,
                            error,
                        });
                    }
                }
                Err(_) => {
                    task.handle.abort();
                    let rest: Vec<_> = tasks.collect();
                    rest.iter().for_each(|task| task.handle.abort());
                    drained.timeout = Some(ReportingError::DrainTimeout {
                        pending: rest.len() + 1,
                        timeout,
                    });
                    break;
                }
            }
        }
        drained
    }
}

fn flatten(
    outcome: Result<Result<(), ReportingError>, tokio::task::JoinError>,
) -> Result<(), ReportingError> {
    match outcome {
        Ok(result) => {
            if let Err(err) = &result {
                error!("deferred reporting failed: {}", err);
            }
            result
        }
        Err(_) => Err(ReportingError::Aborted {
            event: "deferred execution report",
        }),
    }
}
