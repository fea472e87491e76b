//! Default work function.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkError {
    #[error("square of {value} overflows i64")]
    Overflow { value: i64 },
}

/// Square `value`, reporting overflow as a job failure instead of wrapping.
pub fn square(value: i64) -> Result<i64, WorkError> {
    value
        .checked_mul(value)
        .ok_or(WorkError::Overflow { value })
}
