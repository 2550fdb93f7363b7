//! Output backends.
//!
//! ```text
//!                   Engine::dispatch(&LogEntry)
//!                              │
//!        ┌──────────────┬──────┴───────┬──────────────────┐
//!        ▼              ▼              ▼                  ▼
//!   ConsoleSink     FileSink       RemoteSink         CrashSink
//!   stdout/stderr   buffered JSONL  queue → worker    breadcrumbs →
//!                   + rotation      → transport       crash reporter
//! ```
//!
//! Sinks own their internal state exclusively. The engine calls the trait
//! methods below from a dedicated worker thread per sink and catches every
//! error (and panic) they produce.

pub mod console;
pub mod crash;
pub mod file;
pub mod remote;

use std::sync::Arc;

use crate::entry::LogEntry;
use crate::error::SinkError;

pub use console::ConsoleSink;
pub use crash::{BreadcrumbRecorder, CrashReporter, CrashSink};
pub use file::{read_all_entries, FileSink};
pub use remote::{InMemoryTransport, RemoteSink, TelemetryTransport};

/// A destination for log entries.
///
/// Calls for one sink arrive in order on that sink's worker thread. A sink
/// that blocks only delays its own queue, but `write` should still be quick:
/// callers wait briefly for it before moving on.
pub trait Sink: Send + Sync {
    /// Short identifier used in diagnostics ("console", "file", ...).
    fn name(&self) -> &str;

    /// Prepare resources. Called once before the first `write`.
    fn initialize(&self) -> Result<(), SinkError> {
        Ok(())
    }

    fn write(&self, entry: &LogEntry) -> Result<(), SinkError>;

    /// Push buffered state to its destination.
    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Release resources. No calls follow.
    fn dispose(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Whether `flush` makes entries durable. Such sinks are flushed
    /// synchronously on the escalation path.
    fn supports_durable_flush(&self) -> bool {
        false
    }
}

/// Constructs a fresh sink each time the engine initializes.
pub type SinkFactory = Arc<dyn Fn() -> Result<Arc<dyn Sink>, SinkError> + Send + Sync>;
