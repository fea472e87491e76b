//! Batch configuration.
//!
//! Loaded from environment variables by the standalone program, or built
//! directly by library callers. Validation happens before any concurrent
//! work starts.

use std::str::FromStr;

use crate::error::CoreError;

/// Default number of jobs in a batch.
pub const DEFAULT_JOB_COUNT: u64 = 100;

/// Default number of concurrent workers.
pub const DEFAULT_WORKER_COUNT: usize = 3;

/// Upper bound on queue capacity. Batches larger than this get
/// backpressure instead of an unbounded allocation.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

pub const ENV_JOB_COUNT: &str = "FANOUT_JOB_COUNT";
pub const ENV_WORKER_COUNT: &str = "FANOUT_WORKER_COUNT";
pub const ENV_QUEUE_CAPACITY: &str = "FANOUT_QUEUE_CAPACITY";

/// Shape of one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Total jobs to dispatch. Zero is a valid, empty batch.
    pub job_count: u64,
    /// Pool size. Must be at least 1.
    pub worker_count: usize,
    /// Capacity of the job and result queues. `None` means "batch size",
    /// so producers never wait on a full queue.
    pub queue_capacity: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            job_count: DEFAULT_JOB_COUNT,
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: None,
        }
    }
}

impl BatchConfig {
    pub fn new(job_count: u64, worker_count: usize) -> Self {
        Self {
            job_count,
            worker_count,
            queue_capacity: None,
        }
    }

    /// Bound both queues to `capacity`, introducing backpressure between
    /// the dispatcher and the workers.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Check the configuration.
    ///
    /// Rules:
    /// - `worker_count` must be at least 1.
    /// - An explicit `queue_capacity` must be at least 1.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.worker_count < 1 {
            return Err(CoreError::InvalidConfiguration(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == Some(0) {
            return Err(CoreError::InvalidConfiguration(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Capacity actually used for the job and result queues.
    ///
    /// Never zero: an empty batch still gets a one-slot queue. Clamped to
    /// [`MAX_QUEUE_CAPACITY`].
    pub fn effective_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or_else(|| usize::try_from(self.job_count).unwrap_or(usize::MAX))
            .clamp(1, MAX_QUEUE_CAPACITY)
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default           |
    /// |-------------------------|-------------------|
    /// | `FANOUT_JOB_COUNT`      | `100`             |
    /// | `FANOUT_WORKER_COUNT`   | `3`               |
    /// | `FANOUT_QUEUE_CAPACITY` | unset (job count) |
    ///
    /// The result is validated; unparsable values (including negative
    /// counts) are reported as [`CoreError::InvalidConfiguration`].
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads from an arbitrary
    /// key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let job_count = parse_var(&lookup, ENV_JOB_COUNT)?.unwrap_or(DEFAULT_JOB_COUNT);
        let worker_count =
            parse_var(&lookup, ENV_WORKER_COUNT)?.unwrap_or(DEFAULT_WORKER_COUNT);
        let queue_capacity = parse_var(&lookup, ENV_QUEUE_CAPACITY)?;

        let config = Self {
            job_count,
            worker_count,
            queue_capacity,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(|e| {
        CoreError::InvalidConfiguration(format!("{key} must be a non-negative integer ({e}): {raw:?}"))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
