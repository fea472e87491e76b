//! Workers and the fixed-size worker pool.
//!
//! Each [`Worker`] is a tokio task that repeatedly takes one job from the
//! shared job source, applies the work function on the blocking pool, and
//! puts one result into the shared result sink until it observes
//! end-of-stream. The
//! [`WorkerPool`] spawns N of them at once and hands back a [`PoolHandle`]
//! whose `wait()` resolves only after every worker has exited.

use std::any::Any;
use std::sync::Arc;

use fanout_core::types::{IntoOutcome, Job, JobOutcome, JobResult};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::completion::{CompletionGroup, CompletionToken};
use crate::error::{EngineError, EngineResult};
use crate::queue::BatchQueue;

/// Type-erased work function shared by every worker in a pool.
pub type WorkFn = Arc<dyn Fn(i64) -> JobOutcome + Send + Sync + 'static>;

/// Wrap any `Fn(i64) -> R` into a [`WorkFn`].
///
/// `R` is `i64` for infallible work or `Result<i64, E>` for fallible work.
pub fn work_fn<F, R>(f: F) -> WorkFn
where
    F: Fn(i64) -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
    Arc::new(move |value| f(value).into_outcome())
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// What a single worker did before it exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    /// Jobs taken and turned into results (including failed ones).
    pub processed: u64,
    /// Jobs whose work function failed or panicked.
    pub failed: u64,
    /// Whether the worker stopped because the batch was aborted.
    pub cancelled: bool,
}

pub struct Worker {
    index: usize,
    jobs: Arc<BatchQueue<Job>>,
    results: Arc<BatchQueue<JobResult>>,
    work: WorkFn,
    cancel: CancellationToken,
    // Dropped when `run` finishes, signalling the pool exactly once.
    _completion: CompletionToken,
}

impl Worker {
    pub fn new(
        index: usize,
        jobs: Arc<BatchQueue<Job>>,
        results: Arc<BatchQueue<JobResult>>,
        work: WorkFn,
        cancel: CancellationToken,
        completion: CompletionToken,
    ) -> Self {
        Self {
            index,
            jobs,
            results,
            work,
            cancel,
            _completion: completion,
        }
    }

    /// Drain the job source until end-of-stream or cancellation.
    ///
    /// A `put()` into a closed result sink is fatal and returned as
    /// [`EngineError::Queue`]; the job's result is never silently dropped.
    pub async fn run(self) -> EngineResult<WorkerReport> {
        let mut report = WorkerReport {
            worker: self.index,
            ..WorkerReport::default()
        };
        tracing::debug!(worker = self.index, "Worker started");

        loop {
            let job = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                job = self.jobs.take() => job,
            };

            let Some(job) = job else {
                break;
            };

            let outcome = self.apply(job.value).await;
            let failed = outcome.is_failed();
            if let JobOutcome::Failed(reason) = &outcome {
                tracing::warn!(worker = self.index, job_id = job.id, reason = %reason, "Job failed");
            } else {
                tracing::trace!(worker = self.index, job_id = job.id, "Job processed");
            }
            let result = JobResult::new(&job, outcome);

            tokio::select! {
                biased;
                put = self.results.put(result) => {
                    if let Err(e) = put {
                        tracing::error!(worker = self.index, job_id = job.id, error = %e, "Failed to emit result");
                        return Err(e.into());
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::debug!(worker = self.index, job_id = job.id, "Result discarded on cancellation");
                    report.cancelled = true;
                    break;
                }
            }
            report.processed += 1;
            if failed {
                report.failed += 1;
            }
        }

        tracing::debug!(
            worker = self.index,
            processed = report.processed,
            failed = report.failed,
            cancelled = report.cancelled,
            "Worker exited",
        );
        Ok(report)
    }

    /// Run the work function on the blocking pool. A panic becomes a failed
    /// outcome for this job only.
    async fn apply(&self, value: i64) -> JobOutcome {
        let work = Arc::clone(&self.work);
        match tokio::task::spawn_blocking(move || work(value)).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => JobOutcome::Failed(format!(
                "work function panicked: {}",
                panic_message(e.into_panic().as_ref())
            )),
            Err(e) => JobOutcome::Failed(format!("work function did not complete: {e}")),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// Aggregate of every worker's report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub workers: Vec<WorkerReport>,
    pub processed: u64,
    pub failed: u64,
}

/// Spawns a fixed-size set of workers sharing one job source and one
/// result sink.
pub struct WorkerPool;

impl WorkerPool {
    /// Spawn exactly `worker_count` workers.
    ///
    /// `abort` is observed by every worker at each `take()`/`put()`
    /// boundary. The pool cancels it itself when a worker hits a fatal
    /// error, so the rest of the pool stops instead of draining a batch
    /// that has already failed.
    pub fn start(
        worker_count: usize,
        jobs: Arc<BatchQueue<Job>>,
        results: Arc<BatchQueue<JobResult>>,
        work: WorkFn,
        abort: CancellationToken,
    ) -> EngineResult<PoolHandle> {
        if worker_count < 1 {
            return Err(EngineError::InvalidConfiguration(
                "worker_count must be at least 1".to_string(),
            ));
        }

        let group = CompletionGroup::new();
        let tasks = (0..worker_count)
            .map(|index| {
                let worker = Worker::new(
                    index,
                    Arc::clone(&jobs),
                    Arc::clone(&results),
                    Arc::clone(&work),
                    abort.clone(),
                    group.token(),
                );
                let abort = abort.clone();
                tokio::spawn(async move {
                    // Fires only if the worker unwinds.
                    let guard = abort.clone().drop_guard();
                    let result = worker.run().await;
                    let _ = guard.disarm();
                    if matches!(&result, Err(e) if e.is_fatal()) {
                        abort.cancel();
                    }
                    result
                })
            })
            .collect();

        tracing::debug!(worker_count, "Worker pool started");

        Ok(PoolHandle {
            group,
            tasks,
            abort,
        })
    }
}

/// Completion handle for a running [`WorkerPool`].
///
/// `wait()` consumes the handle, so the pool's done-signals can only be
/// awaited once.
pub struct PoolHandle {
    group: CompletionGroup,
    tasks: Vec<JoinHandle<EngineResult<WorkerReport>>>,
    abort: CancellationToken,
}

impl PoolHandle {
    pub fn worker_count(&self) -> usize {
        self.tasks.len()
    }

    /// Workers that have not exited yet.
    pub fn active_workers(&self) -> usize {
        self.group.outstanding()
    }

    /// Token cancelled when the pool aborts (fatal worker error or caller
    /// cancellation). Producers feeding the job source should observe it.
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Wait until every worker has exited, then collect their reports.
    ///
    /// Returns the first fatal error if any worker failed,
    /// [`EngineError::Cancelled`] if any worker stopped on cancellation,
    /// and the aggregated [`PoolReport`] otherwise.
    pub async fn wait(self) -> EngineResult<PoolReport> {
        self.group.wait().await;

        let mut report = PoolReport::default();
        let mut first_error = None;

        for (index, task) in self.tasks.into_iter().enumerate() {
            match task.await {
                Ok(Ok(worker)) => {
                    report.processed += worker.processed;
                    report.failed += worker.failed;
                    report.workers.push(worker);
                }
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!(worker = index, error = %e, "Worker task panicked");
                    first_error.get_or_insert(EngineError::WorkerPanicked { worker: index });
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if report.workers.iter().any(|w| w.cancelled) {
            return Err(EngineError::Cancelled);
        }
        Ok(report)
    }
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("worker_count", &self.worker_count())
            .field("active_workers", &self.active_workers())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
