use std::fmt;

use serde::{Deserialize, Serialize};

/// Jobs are numbered sequentially from 1 within a batch.
pub type JobId = u64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifies a single batch run in logs and summaries.
pub type BatchId = uuid::Uuid;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One unit of input work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub value: i64,
}

impl Job {
    pub fn new(id: JobId, value: i64) -> Self {
        Self { id, value }
    }
}

// ---------------------------------------------------------------------------
// JobOutcome
// ---------------------------------------------------------------------------

/// What the work function produced for one job.
///
/// A failing job is tagged rather than dropped, so the sink and the batch
/// summary always account for every job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "output", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed(i64),
    Failed(String),
}

impl JobOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, JobOutcome::Failed(_))
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Completed(output) => write!(f, "{output}"),
            JobOutcome::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Conversion from a work function's return value into a [`JobOutcome`].
///
/// Infallible work functions return `i64`; fallible ones return
/// `Result<i64, E>` and their errors become [`JobOutcome::Failed`].
pub trait IntoOutcome {
    fn into_outcome(self) -> JobOutcome;
}

impl IntoOutcome for i64 {
    fn into_outcome(self) -> JobOutcome {
        JobOutcome::Completed(self)
    }
}

impl<E: fmt::Display> IntoOutcome for Result<i64, E> {
    fn into_outcome(self) -> JobOutcome {
        match self {
            Ok(output) => JobOutcome::Completed(output),
            Err(e) => JobOutcome::Failed(e.to_string()),
        }
    }
}

impl IntoOutcome for JobOutcome {
    fn into_outcome(self) -> JobOutcome {
        self
    }
}

// ---------------------------------------------------------------------------
// JobResult
// ---------------------------------------------------------------------------

/// The output of exactly one [`Job`], correlated back by `job_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,

    /// Input value of the originating job.
    pub value: i64,

    #[serde(flatten)]
    pub outcome: JobOutcome,
}

impl JobResult {
    pub fn new(job: &Job, outcome: JobOutcome) -> Self {
        Self {
            job_id: job.id,
            value: job.value,
            outcome,
        }
    }

    /// The computed output, or `None` if the job failed.
    pub fn output(&self) -> Option<i64> {
        match self.outcome {
            JobOutcome::Completed(output) => Some(output),
            JobOutcome::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.outcome.is_failed()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_carries_job_identity() {
        let job = Job::new(7, 7);
        let result = JobResult::new(&job, 49_i64.into_outcome());
        assert_eq!(result.job_id, 7);
        assert_eq!(result.value, 7);
        assert_eq!(result.output(), Some(49));
        assert!(!result.is_failed());
    }

    #[test]
    fn err_becomes_failed_outcome() {
        let outcome = Err::<i64, _>("overflow").into_outcome();
        assert_eq!(outcome, JobOutcome::Failed("overflow".to_string()));

        let result = JobResult::new(&Job::new(3, 3), outcome);
        assert_eq!(result.output(), None);
        assert!(result.is_failed());
    }

    #[test]
    fn ok_becomes_completed_outcome() {
        let outcome = Ok::<i64, String>(9).into_outcome();
        assert_eq!(outcome, JobOutcome::Completed(9));
    }

    #[test]
    fn result_serializes_flat() {
        let result = JobResult::new(&Job::new(2, 2), JobOutcome::Completed(4));
        let json = serde_json::to_value(&result).expect("serialization should succeed");

        assert_eq!(json["job_id"], 2);
        assert_eq!(json["value"], 2);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["output"], 4);
    }

    #[test]
    fn failed_result_serializes_reason() {
        let result = JobResult::new(&Job::new(5, 5), JobOutcome::Failed("boom".into()));
        let json = serde_json::to_value(&result).expect("serialization should succeed");

        assert_eq!(json["status"], "failed");
        assert_eq!(json["output"], "boom");
    }

    #[test]
    fn outcome_display() {
        assert_eq!(JobOutcome::Completed(16).to_string(), "16");
        assert_eq!(
            JobOutcome::Failed("bad".into()).to_string(),
            "failed (bad)"
        );
    }
}
