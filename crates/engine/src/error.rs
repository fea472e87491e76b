use fanout_core::error::CoreError;

/// A `put()` was attempted on a queue that has already been closed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue closed: put into `{queue}` after close")]
    Closed { queue: &'static str },
}

/// Engine-level error type for batch runs.
///
/// Wraps [`CoreError`] for configuration problems detected before any task
/// is spawned, and adds the runtime variants that abort a batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An ordering violation in the orchestration. Never transient.
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Worker {worker} panicked outside the work function")]
    WorkerPanicked { worker: usize },

    #[error("Result collector panicked")]
    CollectorPanicked,

    #[error("Batch cancelled")]
    Cancelled,
}

/// Convenience alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Whether the error signals a programming error in the orchestration
    /// rather than bad input or a caller-requested stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Queue(_) | EngineError::WorkerPanicked { .. } | EngineError::CollectorPanicked
        )
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidConfiguration(msg) => EngineError::InvalidConfiguration(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_errors_are_fatal() {
        let err = EngineError::from(QueueError::Closed { queue: "results" });
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Queue closed: put into `results` after close"
        );
    }

    #[test]
    fn configuration_and_cancel_are_not_fatal() {
        let err = EngineError::from(CoreError::InvalidConfiguration("bad".into()));
        assert_eq!(err, EngineError::InvalidConfiguration("bad".into()));
        assert!(!err.is_fatal());
        assert!(!EngineError::Cancelled.is_fatal());
    }
}
