//! `fanout-worker` library crate.
//!
//! Everything the standalone batch program needs besides `main`: settings,
//! the default work function and sink, tracing setup, and the exit-code
//! policy. Split out so integration tests can drive a full run.

pub mod output;
pub mod settings;
pub mod telemetry;
pub mod work;

use std::process::ExitCode;

use anyhow::Context;
use fanout_engine::{BatchSummary, Dispatcher, EngineError};
use tokio_util::sync::CancellationToken;

use crate::output::LineSink;
use crate::settings::WorkerSettings;

/// Run one batch with the default square work function, printing each
/// result to stdout.
pub async fn run(
    settings: WorkerSettings,
    cancel: CancellationToken,
) -> anyhow::Result<BatchSummary> {
    let dispatcher = Dispatcher::new(settings.batch).context("invalid batch configuration")?;
    let sink = LineSink::new(std::io::stdout(), settings.output);

    let summary = dispatcher
        .run_with_cancel(work::square, sink, cancel)
        .await
        .context("batch did not complete")?;

    Ok(summary)
}

/// Process exit status for a finished run.
///
/// Success only when the batch completed and no job failed.
pub fn exit_code(outcome: &anyhow::Result<BatchSummary>) -> ExitCode {
    match outcome {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(summary) => {
            tracing::error!(failed = summary.failed, "Batch finished with failed jobs");
            ExitCode::FAILURE
        }
        Err(e) => {
            match e.downcast_ref::<EngineError>() {
                Some(EngineError::Cancelled) => tracing::warn!("Batch cancelled"),
                _ => tracing::error!(error = ?e, "Batch failed"),
            }
            ExitCode::FAILURE
        }
    }
}
