//! `fanout-core` -- data model, errors, and configuration for the batch engine.
//!
//! Pure types with no async code. The engine crate builds the concurrent
//! dispatch/collection machinery on top of these.

pub mod config;
pub mod error;
pub mod types;

pub use config::BatchConfig;
pub use error::CoreError;
pub use types::{BatchId, IntoOutcome, Job, JobId, JobOutcome, JobResult, Timestamp};
