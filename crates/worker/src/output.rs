//! Default result sink: one line per result on a writer (stdout in the
//! binary).

use std::io::Write;

use fanout_core::types::{JobOutcome, JobResult};
use fanout_engine::ResultSink;

use crate::settings::OutputFormat;

/// Render a result as `job <id>: <value> -> <output>`.
pub fn format_text(result: &JobResult) -> String {
    match &result.outcome {
        JobOutcome::Completed(output) => {
            format!("job {}: {} -> {}", result.job_id, result.value, output)
        }
        JobOutcome::Failed(reason) => {
            format!("job {}: {} -> FAILED: {}", result.job_id, result.value, reason)
        }
    }
}

/// Render a result as a single-line JSON object.
pub fn format_json(result: &JobResult) -> String {
    serde_json::to_string(result).unwrap_or_else(|e| {
        tracing::error!(job_id = result.job_id, error = %e, "Failed to serialize result");
        format!("{{\"job_id\":{},\"status\":\"unserializable\"}}", result.job_id)
    })
}

/// [`ResultSink`] that writes each result as a line to `writer`.
///
/// Write errors do not stop the batch; the first one is logged and later
/// ones are counted.
pub struct LineSink<W> {
    writer: W,
    format: OutputFormat,
    write_errors: u64,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            write_errors: 0,
        }
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, result: &JobResult) {
        let line = match self.format {
            OutputFormat::Text => format_text(result),
            OutputFormat::Json => format_json(result),
        };
        if let Err(e) = writeln!(self.writer, "{line}") {
            if self.write_errors == 0 {
                tracing::error!(error = %e, "Failed to write result");
            }
            self.write_errors += 1;
        }
    }
}

impl<W: Write + Send + 'static> ResultSink for LineSink<W> {
    fn handle(&mut self, result: JobResult) {
        self.write_line(&result);
    }
}

#[cfg(test)]
mod tests {
    use fanout_core::types::Job;

    use super::*;

    fn completed(id: u64, output: i64) -> JobResult {
        JobResult::new(&Job::new(id, id as i64), JobOutcome::Completed(output))
    }

    #[test]
    fn text_line_shows_id_value_and_output() {
        assert_eq!(format_text(&completed(7, 49)), "job 7: 7 -> 49");
    }

    #[test]
    fn text_line_marks_failures() {
        let result = JobResult::new(&Job::new(3, 3), JobOutcome::Failed("overflow".into()));
        assert_eq!(format_text(&result), "job 3: 3 -> FAILED: overflow");
    }

    #[test]
    fn json_line_is_parseable() {
        let line = format_json(&completed(2, 4));
        let parsed: serde_json::Value = serde_json::from_str(&line).expect("valid JSON");
        assert_eq!(parsed["job_id"], 2);
        assert_eq!(parsed["output"], 4);
        assert_eq!(parsed["status"], "completed");
    }

    #[test]
    fn line_sink_writes_one_line_per_result() {
        let mut sink = LineSink::new(Vec::new(), OutputFormat::Text);
        sink.handle(completed(1, 1));
        sink.handle(completed(2, 4));

        assert_eq!(sink.write_errors(), 0);
        let written = String::from_utf8(sink.into_inner()).expect("utf-8 output");
        assert_eq!(written, "job 1: 1 -> 1\njob 2: 2 -> 4\n");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_are_counted_not_fatal() {
        let mut sink = LineSink::new(BrokenPipe, OutputFormat::Json);
        sink.handle(completed(1, 1));
        sink.handle(completed(2, 4));
        assert_eq!(sink.write_errors(), 2);
    }
}
