//! Shared test sinks and helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use logcast_core::{
    AlertHandler, Engine, EngineBuilder, EngineConfig, LogEntry, LogLevel, Sink, SinkError,
};

/// Keeps every entry it receives, plus lifecycle call counts.
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
    pub initialized: AtomicUsize,
    pub flushed: AtomicUsize,
    pub disposed: AtomicUsize,
    durable: bool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A recording sink that reports durable flush support.
    pub fn durable() -> Arc<Self> {
        Arc::new(Self {
            durable: true,
            ..Self::default()
        })
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.message.clone()).collect()
    }

    pub fn levels(&self) -> Vec<LogLevel> {
        self.entries.lock().iter().map(|e| e.level).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn initialize(&self) -> Result<(), SinkError> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.flushed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn dispose(&self) -> Result<(), SinkError> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn supports_durable_flush(&self) -> bool {
        self.durable
    }
}

/// Returns an error from every call.
pub struct FailingSink;

impl Sink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn write(&self, _entry: &LogEntry) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("always down".into()))
    }

    fn flush(&self) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("always down".into()))
    }

    fn supports_durable_flush(&self) -> bool {
        true
    }
}

/// Panics on write.
pub struct PanickingSink;

impl Sink for PanickingSink {
    fn name(&self) -> &str {
        "panicking"
    }

    fn write(&self, _entry: &LogEntry) -> Result<(), SinkError> {
        panic!("sink exploded")
    }
}

/// Counts alerts and remembers their messages.
#[derive(Default)]
pub struct CountingAlert {
    pub calls: AtomicUsize,
    pub messages: Mutex<Vec<String>>,
}

impl CountingAlert {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AlertHandler for CountingAlert {
    fn alert(&self, entry: &LogEntry) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().push(entry.message.clone());
        Ok(())
    }
}

/// Register an existing sink instance under `name`.
pub fn with_shared<S: Sink + 'static>(builder: EngineBuilder, name: &str, sink: Arc<S>) -> EngineBuilder {
    builder.with_sink(name, move || Ok(sink.clone() as Arc<dyn Sink>))
}

/// Development engine (TRACE and up) with a compact console, stats timer
/// off, and one recording sink.
pub fn recording_engine() -> (Engine, Arc<RecordingSink>) {
    recording_engine_with(quiet_config())
}

pub fn recording_engine_with(config: EngineConfig) -> (Engine, Arc<RecordingSink>) {
    let recorder = RecordingSink::new();
    let builder = Engine::builder(config).compact_console();
    let engine = with_shared(builder, "recording", recorder.clone()).build();
    engine.initialize();
    (engine, recorder)
}

pub fn quiet_config() -> EngineConfig {
    let mut config = EngineConfig::development();
    config.stats.enabled = false;
    config
}
