//! Fanout batch engine.
//!
//! Distributes a fixed batch of jobs across a bounded pool of concurrent
//! workers and collects every result before returning:
//!
//! - [`BatchQueue`] -- bounded MPMC queue with one-time close, used as both
//!   the job source and the result sink.
//! - [`CompletionGroup`] -- "wait for N done-signals" primitive.
//! - [`WorkerPool`] -- fixed-size set of workers draining the job source.
//! - [`ResultCollector`] -- single consumer feeding results to a
//!   [`ResultSink`].
//! - [`Dispatcher`] / [`run_batch`] -- orchestrates one batch end to end.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), fanout_engine::EngineError> {
//! let summary = fanout_engine::run_batch(100, 3, |v| v * v, |r: fanout_core::JobResult| {
//!     println!("{} -> {:?}", r.job_id, r.output());
//! })
//! .await?;
//! assert_eq!(summary.handled, 100);
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod completion;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod worker;

pub use collector::{CollectorHandle, CollectorReport, ResultCollector, ResultSink};
pub use completion::{CompletionGroup, CompletionToken};
pub use dispatcher::{run_batch, BatchSummary, DispatchState, Dispatcher};
pub use error::{EngineError, EngineResult, QueueError};
pub use queue::BatchQueue;
pub use worker::{work_fn, PoolHandle, PoolReport, WorkFn, Worker, WorkerPool, WorkerReport};
