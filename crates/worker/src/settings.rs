//! Runtime settings for the standalone batch program.
//!
//! Wraps [`BatchConfig`] with the options only the driving program cares
//! about: how results are printed and how logs are formatted.

use std::str::FromStr;

use fanout_core::config::BatchConfig;
use fanout_core::error::CoreError;

pub const ENV_OUTPUT: &str = "FANOUT_OUTPUT";
pub const ENV_LOG_FORMAT: &str = "FANOUT_LOG_FORMAT";

/// How the default sink renders each result on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `job <id>: <value> -> <output>`
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for OutputFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(CoreError::InvalidConfiguration(format!(
                "{ENV_OUTPUT} must be \"text\" or \"json\", got {other:?}"
            ))),
        }
    }
}

/// Log line format for the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Read `FANOUT_LOG_FORMAT`. Anything other than `json` means pretty.
    ///
    /// Infallible: logging has to come up before configuration errors can
    /// be reported.
    pub fn from_env() -> Self {
        match std::env::var(ENV_LOG_FORMAT) {
            Ok(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub batch: BatchConfig,
    pub output: OutputFormat,
}

impl WorkerSettings {
    /// Load settings from environment variables with defaults.
    ///
    /// | Env Var                 | Default           |
    /// |-------------------------|-------------------|
    /// | `FANOUT_JOB_COUNT`      | `100`             |
    /// | `FANOUT_WORKER_COUNT`   | `3`               |
    /// | `FANOUT_QUEUE_CAPACITY` | unset (job count) |
    /// | `FANOUT_OUTPUT`         | `text`            |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let batch = BatchConfig::from_lookup(&lookup)?;
        let output = match lookup(ENV_OUTPUT) {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => OutputFormat::default(),
        };
        Ok(Self { batch, output })
    }
}
