//! Single-consumer result collector.
//!
//! [`ResultCollector`] spawns one task that drains the result sink until
//! end-of-stream and hands each [`JobResult`] to a [`ResultSink`], one at a
//! time, in arrival order. It never observes cancellation: whatever the
//! workers emitted is always handled before the collector exits.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use fanout_core::types::JobResult;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::completion::{CompletionGroup, CompletionToken};
use crate::error::{EngineError, EngineResult};
use crate::queue::BatchQueue;
use crate::worker::panic_message;

/// Destination for collected results (printing, persisting, aggregating).
///
/// Called sequentially from a single task, so implementations need no
/// internal synchronization.
pub trait ResultSink: Send + 'static {
    fn handle(&mut self, result: JobResult);
}

impl<F> ResultSink for F
where
    F: FnMut(JobResult) + Send + 'static,
{
    fn handle(&mut self, result: JobResult) {
        self(result)
    }
}

/// Counts reported by the collector once it has drained the result sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorReport {
    pub handled: u64,
    pub failed: u64,
}

pub struct ResultCollector;

impl ResultCollector {
    /// Spawn the collector task.
    ///
    /// If the sink panics, the collector cancels `abort` so producers
    /// blocked on a full result sink are released, and reports
    /// [`EngineError::CollectorPanicked`].
    pub fn start<S: ResultSink>(
        results: Arc<BatchQueue<JobResult>>,
        sink: S,
        abort: CancellationToken,
    ) -> CollectorHandle {
        let group = CompletionGroup::new();
        let completion = group.token();
        let task = tokio::spawn(collect(results, sink, abort, completion));
        CollectorHandle { group, task }
    }
}

async fn collect<S: ResultSink>(
    results: Arc<BatchQueue<JobResult>>,
    mut sink: S,
    abort: CancellationToken,
    _completion: CompletionToken,
) -> EngineResult<CollectorReport> {
    let mut report = CollectorReport::default();
    tracing::debug!(queue = results.name(), "Result collector started");

    while let Some(result) = results.take().await {
        let job_id = result.job_id;
        let failed = result.is_failed();

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| sink.handle(result))) {
            tracing::error!(
                job_id,
                error = %panic_message(payload.as_ref()),
                "Result sink panicked",
            );
            abort.cancel();
            return Err(EngineError::CollectorPanicked);
        }

        report.handled += 1;
        if failed {
            report.failed += 1;
        }
    }

    tracing::debug!(handled = report.handled, "Result collector exited");
    Ok(report)
}

/// Completion handle for a running [`ResultCollector`].
pub struct CollectorHandle {
    group: CompletionGroup,
    task: JoinHandle<EngineResult<CollectorReport>>,
}

impl CollectorHandle {
    pub fn is_finished(&self) -> bool {
        self.group.outstanding() == 0
    }

    /// Wait until the collector has observed end-of-stream and exited.
    pub async fn wait(self) -> EngineResult<CollectorReport> {
        self.group.wait().await;
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Result collector task failed");
                Err(EngineError::CollectorPanicked)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
