//! Crash-reporting escalation sink.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::entry::LogEntry;
use crate::error::SinkError;
use crate::level::LogLevel;

use super::Sink;

/// Crash-reporting backend (Sentry-style SDKs, platform crash services...).
pub trait CrashReporter: Send + Sync {
    /// Record a short trail message attached to the next crash report.
    fn record_breadcrumb(&self, breadcrumb: &str) -> Result<(), SinkError>;

    /// Report a non-fatal error entry.
    fn record_error(&self, entry: &LogEntry) -> Result<(), SinkError>;

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Forwards ERROR and FATAL entries to a [`CrashReporter`].
pub struct CrashSink {
    reporter: Arc<dyn CrashReporter>,
}

impl CrashSink {
    pub fn new(reporter: Arc<dyn CrashReporter>) -> Self {
        Self { reporter }
    }

    /// Escalation path: forward a breadcrumb independently of `write`.
    pub fn breadcrumb(&self, message: &str) -> Result<(), SinkError> {
        self.reporter.record_breadcrumb(message)
    }

    /// Breadcrumb text for an escalated entry: `[ERROR] tag: message`.
    pub fn breadcrumb_for(entry: &LogEntry) -> String {
        match &entry.tag {
            Some(tag) => format!("[{}] {}: {}", entry.level, tag, entry.message),
            None => format!("[{}] {}", entry.level, entry.message),
        }
    }
}

impl Sink for CrashSink {
    fn name(&self) -> &str {
        "crash"
    }

    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        if entry.level < LogLevel::Error {
            return Ok(());
        }
        self.reporter.record_error(entry)
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.reporter.flush()
    }
}

/// Bounded in-memory [`CrashReporter`].
///
/// Keeps the most recent `capacity` breadcrumbs and error messages.
pub struct BreadcrumbRecorder {
    capacity: usize,
    breadcrumbs: Mutex<VecDeque<String>>,
    errors: Mutex<VecDeque<String>>,
}

impl BreadcrumbRecorder {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            breadcrumbs: Mutex::new(VecDeque::with_capacity(capacity)),
            errors: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn breadcrumbs(&self) -> Vec<String> {
        self.breadcrumbs.lock().iter().cloned().collect()
    }

    /// Messages of reported error entries.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().iter().cloned().collect()
    }

    fn push(&self, queue: &Mutex<VecDeque<String>>, item: String) {
        let mut queue = queue.lock();
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(item);
    }
}

impl Default for BreadcrumbRecorder {
    fn default() -> Self {
        Self::new(100)
    }
}

impl CrashReporter for BreadcrumbRecorder {
    fn record_breadcrumb(&self, breadcrumb: &str) -> Result<(), SinkError> {
        self.push(&self.breadcrumbs, breadcrumb.to_string());
        Ok(())
    }

    fn record_error(&self, entry: &LogEntry) -> Result<(), SinkError> {
        self.push(&self.errors, entry.message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_forwards_only_errors() {
        let recorder = Arc::new(BreadcrumbRecorder::new(10));
        let sink = CrashSink::new(recorder.clone());

        sink.write(&LogEntry::new(LogLevel::Warn, "meh")).unwrap();
        sink.write(&LogEntry::new(LogLevel::Error, "broken")).unwrap();
        sink.write(&LogEntry::new(LogLevel::Fatal, "dead")).unwrap();

        assert_eq!(recorder.errors(), vec!["broken", "dead"]);
        assert!(recorder.breadcrumbs().is_empty());
    }

    #[test]
    fn test_breadcrumb_is_separate_from_write() {
        let recorder = Arc::new(BreadcrumbRecorder::new(10));
        let sink = CrashSink::new(recorder.clone());

        let mut entry = LogEntry::new(LogLevel::Error, "db down");
        entry.tag = Some("storage".into());
        sink.breadcrumb(&CrashSink::breadcrumb_for(&entry)).unwrap();

        assert_eq!(recorder.breadcrumbs(), vec!["[ERROR] storage: db down"]);
        assert!(recorder.errors().is_empty());
    }

    #[test]
    fn test_recorder_is_bounded() {
        let recorder = BreadcrumbRecorder::new(2);
        for i in 0..5 {
            recorder.record_breadcrumb(&format!("b{}", i)).unwrap();
        }
        assert_eq!(recorder.breadcrumbs(), vec!["b3", "b4"]);
    }
}
