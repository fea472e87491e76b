//! Batch orchestration.
//!
//! The [`Dispatcher`] owns one batch end to end: it allocates the job and
//! result queues, starts the collector and the worker pool, feeds jobs in
//! ascending id order, and tears everything down in the one order that
//! cannot lose a result:
//!
//! ```text
//! Idle -> JobsQueued -> WorkersRunning -> JobsExhausted
//!      -> WorkersDrained -> ResultsExhausted -> Done
//! ```
//!
//! The result sink is closed only after the pool handle reports that every
//! worker has exited. Closing it any earlier lets a worker `put()` into a
//! closed queue, which fails the batch with a `QueueError`.

use std::sync::Arc;

use chrono::Utc;
use fanout_core::config::BatchConfig;
use fanout_core::types::{BatchId, IntoOutcome, Job, JobResult, Timestamp};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::collector::{ResultCollector, ResultSink};
use crate::error::{EngineError, EngineResult};
use crate::queue::{BatchQueue, JOB_QUEUE, RESULT_QUEUE};
use crate::worker::{work_fn, WorkerPool};

// ---------------------------------------------------------------------------
// DispatchState
// ---------------------------------------------------------------------------

/// Lifecycle of a single batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    JobsQueued,
    WorkersRunning,
    JobsExhausted,
    WorkersDrained,
    ResultsExhausted,
    Done,
}

impl DispatchState {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchState::Idle => "idle",
            DispatchState::JobsQueued => "jobs_queued",
            DispatchState::WorkersRunning => "workers_running",
            DispatchState::JobsExhausted => "jobs_exhausted",
            DispatchState::WorkersDrained => "workers_drained",
            DispatchState::ResultsExhausted => "results_exhausted",
            DispatchState::Done => "done",
        }
    }
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BatchSummary
// ---------------------------------------------------------------------------

/// Outcome of a batch that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub job_count: u64,
    pub worker_count: usize,
    /// Jobs turned into results by the pool.
    pub processed: u64,
    /// Results whose work function failed.
    pub failed: u64,
    /// Results handed to the sink.
    pub handled: u64,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl BatchSummary {
    /// Whether every job completed without a work-function failure.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.handled == self.job_count
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Dispatcher {
    config: BatchConfig,
    batch_id: BatchId,
    state: DispatchState,
}

impl Dispatcher {
    /// Validate `config` and prepare a dispatcher in the `Idle` state.
    ///
    /// Configuration errors surface here, before any task is spawned.
    pub fn new(config: BatchConfig) -> EngineResult<Self> {
        config.validate()?;
        if i64::try_from(config.job_count).is_err() {
            return Err(EngineError::InvalidConfiguration(format!(
                "job_count must not exceed {}",
                i64::MAX
            )));
        }
        Ok(Self {
            config,
            batch_id: uuid::Uuid::now_v7(),
            state: DispatchState::Idle,
        })
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run the batch to completion.
    pub async fn run<F, R, S>(self, work: F, sink: S) -> EngineResult<BatchSummary>
    where
        F: Fn(i64) -> R + Send + Sync + 'static,
        R: IntoOutcome,
        S: ResultSink,
    {
        self.run_with_cancel(work, sink, CancellationToken::new())
            .await
    }

    /// Run the batch, stopping early if `cancel` fires.
    ///
    /// On cancellation the dispatcher stops enqueueing, workers stop at
    /// their next `take()`, results already emitted are still handed to
    /// the sink, and the call returns [`EngineError::Cancelled`].
    pub async fn run_with_cancel<F, R, S>(
        mut self,
        work: F,
        sink: S,
        cancel: CancellationToken,
    ) -> EngineResult<BatchSummary>
    where
        F: Fn(i64) -> R + Send + Sync + 'static,
        R: IntoOutcome,
        S: ResultSink,
    {
        let started_at = Utc::now();
        let capacity = self.config.effective_capacity();
        tracing::info!(
            batch_id = %self.batch_id,
            job_count = self.config.job_count,
            worker_count = self.config.worker_count,
            capacity,
            "Batch started",
        );

        let jobs = Arc::new(BatchQueue::<Job>::new(JOB_QUEUE, capacity));
        let results = Arc::new(BatchQueue::<JobResult>::new(RESULT_QUEUE, capacity));
        self.transition(DispatchState::JobsQueued);

        let abort = cancel.child_token();

        // Collector first, so no emitted result is ever waiting on a consumer
        // that has not started.
        let collector = ResultCollector::start(Arc::clone(&results), sink, abort.clone());

        let pool = match WorkerPool::start(
            self.config.worker_count,
            Arc::clone(&jobs),
            Arc::clone(&results),
            work_fn(work),
            abort.clone(),
        ) {
            Ok(pool) => pool,
            Err(e) => {
                results.close();
                let _ = collector.wait().await;
                return Err(e);
            }
        };
        self.transition(DispatchState::WorkersRunning);

        let enqueued = self.enqueue_jobs(&jobs, &pool.abort_token()).await;

        jobs.close();
        self.transition(DispatchState::JobsExhausted);

        let pool_result = pool.wait().await;
        self.transition(DispatchState::WorkersDrained);

        results.close();
        self.transition(DispatchState::ResultsExhausted);

        let collector_result = collector.wait().await;
        self.transition(DispatchState::Done);

        let finished_at = Utc::now();

        let outcome = match (enqueued, pool_result, collector_result) {
            (_, Err(e), _) if e.is_fatal() => Err(e),
            (_, _, Err(e)) => Err(e),
            (Err(e), _, _) => Err(e),
            (_, Err(e), _) => Err(e),
            (Ok(enqueued), Ok(_), Ok(_)) if enqueued < self.config.job_count => {
                Err(EngineError::Cancelled)
            }
            (Ok(_), Ok(pool), Ok(collector)) => Ok(BatchSummary {
                batch_id: self.batch_id,
                job_count: self.config.job_count,
                worker_count: self.config.worker_count,
                processed: pool.processed,
                failed: collector.failed,
                handled: collector.handled,
                started_at,
                finished_at,
            }),
        };

        match &outcome {
            Ok(summary) => {
                debug_assert_eq!(summary.processed, summary.handled);
                tracing::info!(
                    batch_id = %self.batch_id,
                    processed = summary.processed,
                    failed = summary.failed,
                    handled = summary.handled,
                    elapsed_ms = summary.elapsed().num_milliseconds(),
                    "Batch complete",
                );
            }
            Err(EngineError::Cancelled) => {
                tracing::warn!(batch_id = %self.batch_id, "Batch cancelled");
            }
            Err(e) => {
                tracing::error!(batch_id = %self.batch_id, error = %e, "Batch failed");
            }
        }

        outcome
    }

    /// Feed jobs `1..=job_count` into the job source in ascending id order.
    ///
    /// Returns the number of jobs enqueued, which is short of `job_count`
    /// only if `abort` fired first.
    async fn enqueue_jobs(
        &self,
        jobs: &BatchQueue<Job>,
        abort: &CancellationToken,
    ) -> EngineResult<u64> {
        let mut enqueued = 0;
        for id in 1..=self.config.job_count {
            // `new` rejects job counts beyond i64::MAX.
            let value = i64::try_from(id).unwrap_or(i64::MAX);
            tokio::select! {
                biased;
                _ = abort.cancelled() => {
                    tracing::debug!(
                        batch_id = %self.batch_id,
                        enqueued,
                        "Enqueue stopped early, pool aborted",
                    );
                    break;
                }
                put = jobs.put(Job::new(id, value)) => put?,
            }
            enqueued += 1;
        }
        Ok(enqueued)
    }

    fn transition(&mut self, next: DispatchState) {
        tracing::debug!(
            batch_id = %self.batch_id,
            from = %self.state,
            to = %next,
            "Dispatch state transition",
        );
        self.state = next;
    }
}

/// Run one batch of `job_count` jobs on `worker_count` workers.
///
/// Jobs carry `value == id`. Returns once every job has been processed and
/// every result handed to `sink`.
pub async fn run_batch<F, R, S>(
    job_count: u64,
    worker_count: usize,
    work: F,
    sink: S,
) -> EngineResult<BatchSummary>
where
    F: Fn(i64) -> R + Send + Sync + 'static,
    R: IntoOutcome,
    S: ResultSink,
{
    Dispatcher::new(BatchConfig::new(job_count, worker_count))?
        .run(work, sink)
        .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn new_dispatcher_is_idle() {
        let dispatcher = Dispatcher::new(BatchConfig::default()).expect("default config is valid");
        assert_eq!(dispatcher.state(), DispatchState::Idle);
        assert_eq!(dispatcher.config().job_count, 100);
    }

    #[test]
    fn invalid_config_rejected_before_start() {
        assert_matches!(
            Dispatcher::new(BatchConfig::new(5, 0)),
            Err(EngineError::InvalidConfiguration(_))
        );
        assert_matches!(
            Dispatcher::new(BatchConfig::new(u64::MAX, 1)),
            Err(EngineError::InvalidConfiguration(_))
        );
    }

    #[test]
    fn batch_ids_are_unique() {
        let a = Dispatcher::new(BatchConfig::default()).expect("valid");
        let b = Dispatcher::new(BatchConfig::default()).expect("valid");
        assert_ne!(a.batch_id(), b.batch_id());
    }

    #[test]
    fn state_names() {
        assert_eq!(DispatchState::WorkersDrained.to_string(), "workers_drained");
        assert_eq!(DispatchState::Done.as_str(), "done");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn jobs_enqueued_in_ascending_order() {
        // A single worker sees jobs in submission order.
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |r: JobResult| seen.lock().unwrap().push(r.job_id)
        };

        let summary = run_batch(20, 1, |v| v, sink).await.expect("batch should succeed");
        assert!(summary.is_success());
        assert_eq!(*seen.lock().unwrap(), (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn summary_counts_failures() {
        let summary = run_batch(
            6,
            2,
            |v| if v % 3 == 0 { Err("multiple of three") } else { Ok(v) },
            |_r: JobResult| {},
        )
        .await
        .expect("failed jobs do not fail the batch");

        assert_eq!(summary.processed, 6);
        assert_eq!(summary.handled, 6);
        assert_eq!(summary.failed, 2);
        assert!(!summary.is_success());
        assert!(summary.finished_at >= summary.started_at);
    }

    #[tokio::test]
    async fn summary_serializes() {
        let summary = run_batch(3, 1, |v| v, |_r: JobResult| {})
            .await
            .expect("batch should succeed");
        let json = serde_json::to_value(&summary).expect("summary is serializable");
        assert_eq!(json["job_count"], 3);
        assert_eq!(json["handled"], 3);
        assert_eq!(json["batch_id"], summary.batch_id.to_string());
    }
}
