//! `fanout-worker` -- run one batch of squared jobs and print the results.
//!
//! # Environment variables
//!
//! | Variable                | Required | Default    | Description                              |
//! |-------------------------|----------|------------|------------------------------------------|
//! | `FANOUT_JOB_COUNT`      | no       | `100`      | Jobs in the batch                        |
//! | `FANOUT_WORKER_COUNT`   | no       | `3`        | Concurrent workers (at least 1)          |
//! | `FANOUT_QUEUE_CAPACITY` | no       | job count  | Job/result queue capacity                |
//! | `FANOUT_OUTPUT`         | no       | `text`     | `text` or `json` result lines on stdout  |
//! | `FANOUT_LOG_FORMAT`     | no       | `pretty`   | `pretty` or `json` logs on stderr        |

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;

use fanout_worker::settings::{LogFormat, WorkerSettings};
use fanout_worker::{exit_code, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    telemetry::init(LogFormat::from_env());

    let settings = match WorkerSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        job_count = settings.batch.job_count,
        worker_count = settings.batch.worker_count,
        output = ?settings.output,
        "Starting fanout-worker",
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, cancelling batch");
        signal_cancel.cancel();
    });

    let outcome = fanout_worker::run(settings, cancel).await;
    signal_handle.abort();

    if let Ok(summary) = &outcome {
        tracing::info!(
            batch_id = %summary.batch_id,
            handled = summary.handled,
            failed = summary.failed,
            elapsed_ms = summary.elapsed().num_milliseconds(),
            "Batch finished",
        );
    }

    exit_code(&outcome)
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
