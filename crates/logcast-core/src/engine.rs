//! Engine - the single entry point for application logging
//!
//! Engine coordinates ContextBuilder, StatsAggregator and the sink registry:
//! - Minimum-level filtering (atomic, adjustable at runtime)
//! - Entry enrichment with ambient identity and context
//! - Fan-out dispatch through per-sink workers with failure isolation
//! - Escalation of ERROR/FATAL entries (durable flush + crash breadcrumb)
//! - Periodic stats summaries on a cancellable background task
//!
//! # Example
//!
//! ```ignore
//! use logcast_core::{Engine, EngineConfig, FileSinkConfig, LogOptions};
//!
//! let engine = Engine::builder(
//!     EngineConfig::development().with_file(FileSinkConfig::new("./logs", "checkout")),
//! )
//! .with_crash_reporter(reporter)
//! .build();
//!
//! engine.initialize();
//! engine.info("Cart loaded", LogOptions::new().field("items", 3));
//! engine.flush().await;
//! engine.dispose();
//! ```

use std::panic::{self, AssertUnwindSafe, Location};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::context::{AmbientState, ContextBuilder};
use crate::dispatch::{FailureChannel, SinkCall, SinkWorker};
use crate::entry::{LogEntry, LogOptions};
use crate::error::SinkError;
use crate::events::AlertHandler;
use crate::level::{LevelCounts, LogLevel};
use crate::sink::{
    ConsoleSink, CrashReporter, CrashSink, FileSink, RemoteSink, Sink, SinkFactory,
    TelemetryTransport,
};
use crate::stats::{StatsAggregator, StatsWindow};

/// Why a sink call did not succeed.
#[derive(Debug)]
pub(crate) enum SinkFailure {
    Error(SinkError),
    Panic(String),
    TimedOut(Duration),
    QueueFull,
}

impl std::fmt::Display for SinkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkFailure::Error(e) => write!(f, "{}", e),
            SinkFailure::Panic(msg) => write!(f, "panicked: {}", msg),
            SinkFailure::TimedOut(after) => write!(f, "timed out after {:?}", after),
            SinkFailure::QueueFull => write!(f, "queue full, entry dropped"),
        }
    }
}

/// Run a sink call, turning both `Err` and panics into a [`SinkFailure`].
pub(crate) fn guarded<F>(call: F) -> Result<(), SinkFailure>
where
    F: FnOnce() -> Result<(), SinkError>,
{
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SinkFailure::Error(e)),
        Err(payload) => Err(SinkFailure::Panic(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Sinks established by one `initialize` call, in registration order.
pub(crate) struct ActiveSinks {
    pub(crate) workers: Vec<SinkWorker>,
    /// Crash sink and the index of its worker
    crash: Option<(usize, Arc<CrashSink>)>,
    pub(crate) failures: Arc<FailureChannel>,
}

fn flush_call() -> SinkCall {
    Box::new(|sink: &dyn Sink| sink.flush())
}

/// A queued sink call the caller intends to wait for.
pub(crate) struct Pending<'a> {
    worker: &'a SinkWorker,
    seq: u64,
    op: &'static str,
}

impl ActiveSinks {
    fn submit_each<'a, F>(
        &'a self,
        op: &'static str,
        workers: impl Iterator<Item = &'a SinkWorker>,
        make_call: F,
    ) -> Vec<Pending<'a>>
    where
        F: Fn() -> SinkCall,
    {
        workers
            .filter_map(|worker| {
                worker
                    .submit(op, make_call())
                    .map(|seq| Pending { worker, seq, op })
            })
            .collect()
    }

    pub(crate) fn submit_flush(&self, op: &'static str) -> Vec<Pending<'_>> {
        self.submit_each(op, self.workers.iter(), flush_call)
    }

    pub(crate) fn submit_durable_flush(&self, op: &'static str) -> Vec<Pending<'_>> {
        let durable = self.workers.iter().filter(|w| w.supports_durable_flush());
        self.submit_each(op, durable, flush_call)
    }

    /// Queue a breadcrumb on the crash sink, after any entry already queued there.
    pub(crate) fn submit_breadcrumb(&self, op: &'static str, breadcrumb: String) -> Option<Pending<'_>> {
        let (index, crash) = self.crash.as_ref()?;
        let worker = self.workers.get(*index)?;
        let crash = crash.clone();
        let call: SinkCall = Box::new(move |_: &dyn Sink| crash.breadcrumb(&breadcrumb));
        worker.submit(op, call).map(|seq| Pending { worker, seq, op })
    }

    fn submit_dispose(&self) -> Vec<Pending<'_>> {
        self.workers
            .iter()
            .filter_map(|worker| {
                worker.submit_dispose().map(|seq| Pending {
                    worker,
                    seq,
                    op: "dispose",
                })
            })
            .collect()
    }

    /// Wait for every pending call, all sharing one deadline `limit` from
    /// now. Calls still running at the deadline are reported as timed out.
    pub(crate) fn await_all(&self, pending: Vec<Pending<'_>>, limit: Duration) {
        let deadline = Instant::now() + limit;
        for Pending { worker, seq, op } in pending {
            if !worker.wait_until(seq, deadline) {
                self.failures.report(worker.name(), op, &SinkFailure::TimedOut(limit));
            }
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    compact_console: bool,
    min_level: AtomicU8,
    ambient: RwLock<AmbientState>,
    context: ContextBuilder,
    stats: StatsAggregator,
    telemetry: Option<Arc<dyn TelemetryTransport>>,
    crash_reporter: Option<Arc<dyn CrashReporter>>,
    alert_handler: Option<Arc<dyn AlertHandler>>,
    extra_sinks: Vec<(String, SinkFactory)>,
    /// `None` until initialized and after dispose
    active: RwLock<Option<Arc<ActiveSinks>>>,
    stats_task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes initialize/dispose
    lifecycle: Mutex<()>,
    sink_failures: Arc<AtomicU64>,
    created: std::time::Instant,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(task) = self.stats_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Handle to a logging engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

/// Configures sinks and collaborators before building an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    compact_console: bool,
    context: ContextBuilder,
    telemetry: Option<Arc<dyn TelemetryTransport>>,
    crash_reporter: Option<Arc<dyn CrashReporter>>,
    alert_handler: Option<Arc<dyn AlertHandler>>,
    extra_sinks: Vec<(String, SinkFactory)>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        let context = ContextBuilder::new(config.app.clone());
        Self {
            config,
            compact_console: false,
            context,
            telemetry: None,
            crash_reporter: None,
            alert_handler: None,
            extra_sinks: Vec::new(),
        }
    }

    /// Print only the headline of each entry on the console.
    pub fn compact_console(mut self) -> Self {
        self.compact_console = true;
        self
    }

    /// Add a host-supplied context field (battery, network type, locale...).
    pub fn with_context_accessor<F>(mut self, key: impl Into<String>, accessor: F) -> Self
    where
        F: Fn() -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.context = self.context.with_accessor(key, accessor);
        self
    }

    /// Enable the remote sink with this transport.
    pub fn with_telemetry(mut self, transport: Arc<dyn TelemetryTransport>) -> Self {
        self.telemetry = Some(transport);
        self
    }

    /// Enable the crash-escalation sink with this reporter.
    pub fn with_crash_reporter(mut self, reporter: Arc<dyn CrashReporter>) -> Self {
        self.crash_reporter = Some(reporter);
        self
    }

    /// Handler for critical security events.
    pub fn with_alert_handler(mut self, handler: Arc<dyn AlertHandler>) -> Self {
        self.alert_handler = Some(handler);
        self
    }

    /// Register an additional sink, constructed afresh on every initialize
    /// and dispatched to after the built-in sinks.
    pub fn with_sink<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Sink>, SinkError> + Send + Sync + 'static,
    {
        self.extra_sinks.push((name.into(), Arc::new(factory)));
        self
    }

    pub fn build(self) -> Engine {
        let min_level = self.config.effective_min_level();
        Engine {
            inner: Arc::new(EngineInner {
                config: self.config,
                compact_console: self.compact_console,
                min_level: AtomicU8::new(min_level.rank()),
                ambient: RwLock::new(AmbientState::new()),
                context: self.context,
                stats: StatsAggregator::new(),
                telemetry: self.telemetry,
                crash_reporter: self.crash_reporter,
                alert_handler: self.alert_handler,
                extra_sinks: self.extra_sinks,
                active: RwLock::new(None),
                stats_task: Mutex::new(None),
                lifecycle: Mutex::new(()),
                sink_failures: Arc::new(AtomicU64::new(0)),
                created: std::time::Instant::now(),
            }),
        }
    }
}

impl Engine {
    /// Engine with only the sinks `config` enables on its own
    /// (console, plus file when configured).
    pub fn new(config: EngineConfig) -> Self {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Construct and initialize every configured sink.
    ///
    /// A sink that fails to construct or initialize is left out; the engine
    /// still starts with the rest. Calling this while initialized is a no-op.
    pub fn initialize(&self) {
        let _guard = self.inner.lifecycle.lock();
        if self.inner.active.read().is_some() {
            debug!("Logging engine already initialized");
            return;
        }

        self.inner.stats.reset();
        {
            let mut ambient = self.inner.ambient.write();
            if ambient.session_id.is_none() {
                ambient.session_id = Some(ulid::Ulid::new().to_string());
                ambient.session_started = std::time::Instant::now();
            }
        }

        let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();

        let console = Arc::new(if self.inner.compact_console {
            ConsoleSink::compact()
        } else {
            ConsoleSink::new()
        });
        let console = match guarded(|| console.initialize()) {
            Ok(()) => {
                sinks.push(console.clone());
                Some(console)
            }
            Err(failure) => {
                eprintln!("[logcast] console sink failed to initialize: {}", failure);
                None
            }
        };
        let failures = Arc::new(FailureChannel::new(self.inner.sink_failures.clone(), console));

        if let Some(file_config) = &self.inner.config.file {
            let file_config = file_config.clone();
            Self::register(&mut sinks, &failures, "file", move || {
                Ok(Arc::new(FileSink::new(file_config)) as Arc<dyn Sink>)
            });
        }

        if let Some(transport) = &self.inner.telemetry {
            let remote_config = self.inner.config.remote.clone();
            let flush_timeout = self.inner.config.flush_timeout();
            let transport = transport.clone();
            Self::register(&mut sinks, &failures, "remote", move || {
                let sink = RemoteSink::new(remote_config, transport).with_flush_timeout(flush_timeout);
                Ok(Arc::new(sink) as Arc<dyn Sink>)
            });
        }

        let mut crash = None;
        if let Some(reporter) = &self.inner.crash_reporter {
            let crash_sink = Arc::new(CrashSink::new(reporter.clone()));
            let as_sink: Arc<dyn Sink> = crash_sink.clone();
            if Self::register(&mut sinks, &failures, "crash", move || Ok(as_sink)) {
                crash = Some((sinks.len() - 1, crash_sink));
            }
        }

        for (name, factory) in &self.inner.extra_sinks {
            let factory = factory.clone();
            Self::register(&mut sinks, &failures, name, move || factory());
        }

        let capacity = self.inner.config.sink_queue_capacity;
        let mut workers = Vec::with_capacity(sinks.len());
        let mut crash_worker = None;
        for (index, sink) in sinks.into_iter().enumerate() {
            match SinkWorker::spawn(sink.clone(), capacity, failures.clone()) {
                Ok(worker) => {
                    if let Some((crash_index, crash_sink)) = &crash {
                        if *crash_index == index {
                            crash_worker = Some((workers.len(), crash_sink.clone()));
                        }
                    }
                    workers.push(worker);
                }
                Err(e) => {
                    failures.report(sink.name(), "start worker", &e);
                    if let Err(failure) = guarded(|| sink.dispose()) {
                        failures.report(sink.name(), "dispose", &failure);
                    }
                }
            }
        }

        let names: Vec<String> = workers.iter().map(|w| w.name().to_string()).collect();
        *self.inner.active.write() = Some(Arc::new(ActiveSinks {
            workers,
            crash: crash_worker,
            failures,
        }));

        self.start_stats_task();

        info!(
            sinks = ?names,
            min_level = %self.min_level(),
            "Logging engine initialized"
        );
    }

    /// Construct and initialize one sink; on failure report it and skip.
    fn register<F>(
        sinks: &mut Vec<Arc<dyn Sink>>,
        failures: &FailureChannel,
        name: &str,
        construct: F,
    ) -> bool
    where
        F: FnOnce() -> Result<Arc<dyn Sink>, SinkError>,
    {
        let mut built = None;
        let result = guarded(|| {
            let sink = construct()?;
            sink.initialize()?;
            built = Some(sink);
            Ok(())
        });

        match (result, built) {
            (Ok(()), Some(sink)) => {
                sinks.push(sink);
                true
            }
            (Err(failure), _) => {
                failures.report(name, "initialize", &failure);
                false
            }
            (Ok(()), None) => false,
        }
    }

    fn start_stats_task(&self) {
        if !self.inner.config.stats.enabled {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No Tokio runtime, periodic stats reporting disabled");
            return;
        };

        let interval = self.inner.config.stats.interval();
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let engine = Engine { inner };
                // Sink I/O stays off the async workers.
                if let Err(e) = tokio::task::spawn_blocking(move || engine.report_stats()).await {
                    warn!(error = %e, "Stats report failed");
                }
            }
        });

        if let Some(previous) = self.inner.stats_task.lock().replace(task) {
            previous.abort();
        }
        debug!(interval_secs = interval.as_secs(), "Stats reporting task started");
    }

    /// Flush every sink concurrently, all bounded by `flush_timeout_ms`.
    ///
    /// Each flush is queued behind the entries already handed to that sink
    /// and runs on its worker, so one slow sink does not hold up the others.
    /// Failures are reported, never returned.
    pub async fn flush(&self) {
        let Some(active) = self.active() else {
            return;
        };
        let timeout = self.inner.config.flush_timeout();

        let job = tokio::task::spawn_blocking(move || {
            let pending = active.submit_flush("flush");
            active.await_all(pending, timeout);
        });
        if let Err(e) = job.await {
            warn!(error = %e, "Flush task failed");
        }
    }

    /// [`flush`](Self::flush), waiting on the calling thread.
    ///
    /// For hosts without an async runtime.
    pub fn flush_blocking(&self) {
        let Some(active) = self.active() else {
            return;
        };
        let pending = active.submit_flush("flush");
        active.await_all(pending, self.inner.config.flush_timeout());
    }

    /// Stop the stats task, dispose and drop every sink, and reset state so a
    /// later [`initialize`](Self::initialize) starts fresh.
    ///
    /// Each sink is disposed on its worker after the calls already queued
    /// there, and receives nothing afterwards. Must not race with in-flight
    /// logging calls.
    pub fn dispose(&self) {
        // Also excludes a stats report that is still running.
        let _guard = self.inner.lifecycle.lock();

        if let Some(task) = self.inner.stats_task.lock().take() {
            task.abort();
        }

        let active = self.inner.active.write().take();
        if let Some(active) = active {
            let pending = active.submit_dispose();
            active.await_all(pending, self.inner.config.flush_timeout());
        }

        self.inner.stats.reset();
        *self.inner.ambient.write() = AmbientState::new();
        self.inner
            .min_level
            .store(self.inner.config.effective_min_level().rank(), Ordering::Relaxed);

        info!("Logging engine disposed");
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.active.read().is_some()
    }

    pub(crate) fn active(&self) -> Option<Arc<ActiveSinks>> {
        self.inner.active.read().clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Level filtering
    // ═══════════════════════════════════════════════════════════════════════

    pub fn min_level(&self) -> LogLevel {
        LogLevel::from_rank(self.inner.min_level.load(Ordering::Relaxed)).unwrap_or(LogLevel::Info)
    }

    pub fn set_min_level(&self, level: LogLevel) {
        self.inner.min_level.store(level.rank(), Ordering::Relaxed);
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level.rank() >= self.inner.min_level.load(Ordering::Relaxed)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Logging
    // ═══════════════════════════════════════════════════════════════════════

    /// Log at an explicit level. Untagged entries are tagged with the
    /// caller's source file stem.
    #[track_caller]
    pub fn log(&self, level: LogLevel, message: impl Into<String>, options: LogOptions) {
        self.emit(level, message.into(), options, Location::caller());
    }

    #[track_caller]
    pub fn trace(&self, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Trace, message.into(), options, Location::caller());
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Debug, message.into(), options, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Info, message.into(), options, Location::caller());
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Warn, message.into(), options, Location::caller());
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Error, message.into(), options, Location::caller());
    }

    #[track_caller]
    pub fn fatal(&self, message: impl Into<String>, options: LogOptions) {
        self.emit(LogLevel::Fatal, message.into(), options, Location::caller());
    }

    /// Filter, build, count, dispatch and escalate one entry.
    ///
    /// Returns the dispatched entry, or `None` when it was filtered out or
    /// the engine is not initialized.
    pub(crate) fn emit(
        &self,
        level: LogLevel,
        message: String,
        options: LogOptions,
        caller: &'static Location<'static>,
    ) -> Option<Arc<LogEntry>> {
        if !self.is_enabled(level) {
            return None;
        }
        let active = self.active()?;

        let entry = Arc::new(self.build_entry(level, message, options, caller));
        self.inner.stats.record(level);
        self.dispatch(&active, &entry);

        if level.is_escalated() {
            self.escalate(&active, &entry);
        }
        Some(entry)
    }

    pub(crate) fn build_entry(
        &self,
        level: LogLevel,
        message: String,
        options: LogOptions,
        caller: &'static Location<'static>,
    ) -> LogEntry {
        let ambient = self.inner.ambient.read().clone();
        let context = self.inner.context.build(&ambient);

        LogEntry {
            timestamp: Utc::now(),
            level,
            message,
            tag: options.tag.or_else(|| infer_tag(caller)),
            data: options.data,
            error: options.error,
            error_type: options.error_type,
            stack_trace: options.stack_trace,
            user_id: options.user_id.or(ambient.user_id),
            session_id: options.session_id.or(ambient.session_id),
            context,
        }
    }

    /// Hand the entry to every sink's worker in registration order, then
    /// wait up to `write_timeout_ms` for the ones that are keeping up.
    fn dispatch(&self, active: &ActiveSinks, entry: &Arc<LogEntry>) {
        let deadline = Instant::now() + self.inner.config.write_timeout();
        let mut pending = Vec::with_capacity(active.workers.len());

        for worker in &active.workers {
            let entry = entry.clone();
            let call: SinkCall = Box::new(move |sink: &dyn Sink| sink.write(&entry));
            if let Some(seq) = worker.submit("write", call) {
                if !worker.is_lagging() {
                    pending.push((worker, seq));
                }
            }
        }

        for (worker, seq) in pending {
            if !worker.wait_until(seq, deadline) {
                debug!(sink = %worker.name(), "Sink fell behind, no longer waited on");
            }
        }
    }

    /// Durable flush plus crash breadcrumb for ERROR and FATAL entries,
    /// waited on for up to `flush_timeout_ms`.
    fn escalate(&self, active: &ActiveSinks, entry: &LogEntry) {
        let mut pending = active.submit_durable_flush("escalation flush");
        pending.extend(active.submit_breadcrumb("breadcrumb", CrashSink::breadcrumb_for(entry)));
        active.await_all(pending, self.inner.config.flush_timeout());
    }

    /// Time since the engine was built.
    pub fn uptime(&self) -> Duration {
        self.inner.created.elapsed()
    }

    pub(crate) fn alert_handler(&self) -> Option<&Arc<dyn AlertHandler>> {
        self.inner.alert_handler.as_ref()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Ambient identity
    // ═══════════════════════════════════════════════════════════════════════

    /// Set the default user id for later entries and log the change.
    #[track_caller]
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        let previous = self.inner.ambient.write().user_id.replace(user_id.clone());
        self.emit(
            LogLevel::Info,
            "User ID updated".to_string(),
            LogOptions::tagged("identity")
                .field("user_id", user_id)
                .field("previous_user_id", previous),
            Location::caller(),
        );
    }

    /// Forget the current user (sign-out) and log the change.
    #[track_caller]
    pub fn clear_user_id(&self) {
        let previous = self.inner.ambient.write().user_id.take();
        self.emit(
            LogLevel::Info,
            "User ID cleared".to_string(),
            LogOptions::tagged("identity").field("previous_user_id", previous),
            Location::caller(),
        );
    }

    /// Start a new session with this id and log the change.
    #[track_caller]
    pub fn set_session_id(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        let previous = {
            let mut ambient = self.inner.ambient.write();
            ambient.session_started = std::time::Instant::now();
            ambient.session_id.replace(session_id.clone())
        };
        self.emit(
            LogLevel::Info,
            "Session ID updated".to_string(),
            LogOptions::tagged("identity")
                .field("session_id", session_id)
                .field("previous_session_id", previous),
            Location::caller(),
        );
    }

    /// Record the screen the user is on; used for context and user actions.
    pub fn set_current_screen(&self, screen: impl Into<String>) {
        self.inner.ambient.write().screen = Some(screen.into());
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.ambient.read().user_id.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.ambient.read().session_id.clone()
    }

    pub(crate) fn ambient(&self) -> AmbientState {
        self.inner.ambient.read().clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Diagnostics
    // ═══════════════════════════════════════════════════════════════════════

    /// Names of active sinks in dispatch order.
    pub fn sink_names(&self) -> Vec<String> {
        self.active()
            .map(|a| a.workers.iter().map(|w| w.name().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn sink_count(&self) -> usize {
        self.active().map(|a| a.workers.len()).unwrap_or(0)
    }

    /// Sink failures isolated since the engine was built.
    pub fn sink_failures(&self) -> u64 {
        self.inner.sink_failures.load(Ordering::Relaxed)
    }

    /// Counts in the current stats window.
    pub fn stats_snapshot(&self) -> LevelCounts {
        self.inner.stats.snapshot()
    }

    /// Close the current stats window and, if it saw any entries, log its
    /// summary as a business event. The timer calls this every interval.
    pub fn report_stats(&self) -> Option<StatsWindow> {
        // Held until the summary is handed to the sinks, so dispose waits
        // for a report in progress instead of tearing sinks down under it.
        let _guard = self.inner.lifecycle.lock();
        if !self.is_initialized() {
            return None;
        }
        // Counters are swapped out before logging, so the summary entry
        // itself is counted in the next window.
        let window = self.inner.stats.take();
        if !window.is_empty() {
            self.business_event("log_statistics", "system", window.to_properties());
        }
        Some(window)
    }
}

/// Source file stem of the call site, e.g. `checkout` for `src/checkout.rs`.
fn infer_tag(caller: &'static Location<'static>) -> Option<String> {
    Path::new(caller.file())
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}
