//! Human-readable console output.
//!
//! Entries below WARN go to stdout, WARN and above to stderr. This sink is
//! the engine's guaranteed fallback and also carries its failure notices.

use std::fmt::Write as _;
use std::io::Write as _;

use crate::entry::LogEntry;
use crate::error::SinkError;
use crate::level::LogLevel;

use super::Sink;

/// Writes one line per entry, plus indented lines for data and errors.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    /// Print the data map, error and stack trace below the headline
    verbose: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self { verbose: true }
    }

    /// Headline only.
    pub fn compact() -> Self {
        Self { verbose: false }
    }

    /// Render an entry the way it is printed.
    pub fn render(&self, entry: &LogEntry) -> String {
        let mut out = String::new();
        let ts = entry.timestamp.format("%H:%M:%S%.3f");
        let _ = write!(out, "{} {:<5}", ts, entry.level.as_str());
        if let Some(tag) = &entry.tag {
            let _ = write!(out, " [{}]", tag);
        }
        let _ = write!(out, " {}", entry.message);

        if !self.verbose {
            return out;
        }
        if let Some(data) = &entry.data {
            if !data.is_empty() {
                let rendered = serde_json::to_string(data).unwrap_or_default();
                let _ = write!(out, "\n    data: {}", rendered);
            }
        }
        if let Some(error) = &entry.error {
            match &entry.error_type {
                Some(ty) => {
                    let _ = write!(out, "\n    error ({}): {}", ty, error);
                }
                None => {
                    let _ = write!(out, "\n    error: {}", error);
                }
            }
        }
        if let Some(trace) = &entry.stack_trace {
            for line in trace.lines() {
                let _ = write!(out, "\n      {}", line);
            }
        }
        out
    }

    /// Fallback channel for failures elsewhere in the engine.
    pub fn notice(&self, message: &str) {
        eprintln!("[logcast] {}", message);
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        let line = self.render(entry);
        if entry.level >= LogLevel::Warn {
            let mut err = std::io::stderr().lock();
            writeln!(err, "{}", line)?;
        } else {
            let mut out = std::io::stdout().lock();
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        std::io::stdout().flush()?;
        std::io::stderr().flush()?;
        Ok(())
    }
}
