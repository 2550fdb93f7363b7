//! Dispatch tests: filtering, enrichment, ordering and sink isolation.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{
    quiet_config, recording_engine, recording_engine_with, with_shared, FailingSink,
    PanickingSink, RecordingSink,
};
use logcast_core::{Engine, LogEntry, LogLevel, LogOptions, Sink, SinkError};
use parking_lot::Mutex;

// ============================================================================
// Filtering
// ============================================================================

#[test]
fn test_entries_below_min_level_are_dropped() {
    let (engine, recorder) = recording_engine_with(quiet_config().with_min_level(LogLevel::Warn));

    engine.debug("debug", LogOptions::new());
    engine.info("info", LogOptions::new());
    engine.warn("warn", LogOptions::new());
    engine.error("error", LogOptions::new());

    assert_eq!(recorder.messages(), vec!["warn", "error"]);
    assert_eq!(engine.stats_snapshot().total(), 2);
    assert_eq!(engine.stats_snapshot().get(LogLevel::Info), 0);
}

#[test]
fn test_min_level_can_change_at_runtime() {
    let (engine, recorder) = recording_engine_with(quiet_config().with_min_level(LogLevel::Error));
    assert_eq!(engine.min_level(), LogLevel::Error);

    engine.info("hidden", LogOptions::new());
    engine.set_min_level(LogLevel::Trace);
    engine.trace("visible", LogOptions::new());

    assert_eq!(recorder.messages(), vec!["visible"]);
}

#[test]
fn test_logging_before_initialize_is_a_no_op() {
    let recorder = RecordingSink::new();
    let engine = with_shared(Engine::builder(quiet_config()).compact_console(), "recording", recorder.clone()).build();

    engine.error("nobody listening", LogOptions::new());

    assert_eq!(recorder.len(), 0);
    assert_eq!(engine.stats_snapshot().total(), 0);
    assert!(!engine.is_initialized());
}

// ============================================================================
// Enrichment
// ============================================================================

#[test]
fn test_entry_carries_options_and_context() {
    let (engine, recorder) = recording_engine();
    let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream timeout");

    engine.warn(
        "Payment retry",
        LogOptions::tagged("payments")
            .field("attempt", 2)
            .field("gateway", "stripe")
            .error(&err),
    );

    let entry = &recorder.entries()[0];
    assert_eq!(entry.level, LogLevel::Warn);
    assert_eq!(entry.tag.as_deref(), Some("payments"));
    let data = entry.data.as_ref().unwrap();
    assert_eq!(data["attempt"], 2);
    assert_eq!(data["gateway"], "stripe");
    assert_eq!(entry.error.as_deref(), Some("upstream timeout"));
    assert!(entry.context.contains_key("app_version"));
    assert!(entry.context.contains_key("platform"));
}

#[test]
fn test_tag_defaults_to_calling_file() {
    let (engine, recorder) = recording_engine();
    engine.info("where am I", LogOptions::new());
    assert_eq!(recorder.entries()[0].tag.as_deref(), Some("engine_dispatch"));
}

#[test]
fn test_ambient_identity_is_applied() {
    let (engine, recorder) = recording_engine();
    let generated_session = engine.session_id().unwrap();

    engine.set_user_id("user-7");
    engine.info("after login", LogOptions::new());
    engine.info("explicit", LogOptions::new().user_id("admin"));

    let entries = recorder.entries();
    assert_eq!(entries[0].message, "User ID updated");
    assert_eq!(entries[0].level, LogLevel::Info);
    assert_eq!(entries[1].user_id.as_deref(), Some("user-7"));
    assert_eq!(entries[1].session_id.as_deref(), Some(generated_session.as_str()));
    assert_eq!(entries[1].context["auth_status"], "authenticated");
    assert_eq!(entries[2].user_id.as_deref(), Some("admin"));

    engine.set_session_id("session-2");
    engine.info("new session", LogOptions::new());
    assert_eq!(recorder.entries().last().unwrap().session_id.as_deref(), Some("session-2"));
}

#[test]
fn test_current_screen_in_context() {
    let (engine, recorder) = recording_engine();
    engine.set_current_screen("checkout");
    engine.info("rendered", LogOptions::new());
    assert_eq!(recorder.entries()[0].context["screen"], "checkout");
}

#[test]
fn test_failing_context_accessor_only_loses_its_field() {
    let recorder = RecordingSink::new();
    let builder = Engine::builder(quiet_config())
        .compact_console()
        .with_context_accessor("battery", || Ok(serde_json::json!(0.5)))
        .with_context_accessor("network", || Err(anyhow::anyhow!("no radio")));
    let engine = with_shared(builder, "recording", recorder.clone()).build();
    engine.initialize();

    engine.info("still logged", LogOptions::new());

    let entry = &recorder.entries()[0];
    assert_eq!(entry.context["battery"], 0.5);
    assert!(!entry.context.contains_key("network"));
}

// ============================================================================
// Isolation
// ============================================================================

#[test]
fn test_failing_and_panicking_sinks_are_isolated() {
    let recorder = RecordingSink::new();
    let builder = Engine::builder(quiet_config())
        .compact_console()
        .with_sink("failing", || Ok(Arc::new(FailingSink) as Arc<dyn Sink>))
        .with_sink("panicking", || Ok(Arc::new(PanickingSink) as Arc<dyn Sink>));
    let engine = with_shared(builder, "recording", recorder.clone()).build();
    engine.initialize();

    engine.info("must arrive", LogOptions::new());

    assert_eq!(recorder.messages(), vec!["must arrive"]);
    assert_eq!(engine.sink_failures(), 2);
    assert_eq!(engine.stats_snapshot().total(), 1);
}

/// Sleeps on every write, then records the message.
struct SleepySink {
    delay: Duration,
    received: Mutex<Vec<String>>,
}

impl Sink for SleepySink {
    fn name(&self) -> &str {
        "sleepy"
    }

    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        std::thread::sleep(self.delay);
        self.received.lock().push(entry.message.clone());
        Ok(())
    }
}

#[test]
fn test_slow_sink_delays_neither_caller_nor_later_sinks() {
    let sleepy = Arc::new(SleepySink {
        delay: Duration::from_millis(1500),
        received: Mutex::new(Vec::new()),
    });
    let recorder = RecordingSink::new();
    let builder = with_shared(
        Engine::builder(quiet_config()).compact_console(),
        "sleepy",
        sleepy.clone(),
    );
    let engine = with_shared(builder, "recording", recorder.clone()).build();
    engine.initialize();
    assert_eq!(engine.sink_names(), vec!["console", "sleepy", "recording"]);

    let started = Instant::now();
    engine.info("first", LogOptions::new());
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(recorder.messages(), vec!["first"]);

    // A lagging sink is no longer waited on at all.
    let started = Instant::now();
    engine.info("second", LogOptions::new());
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(recorder.messages(), vec!["first", "second"]);

    // The slow sink still gets every entry, in order.
    let deadline = Instant::now() + Duration::from_secs(5);
    while sleepy.received.lock().len() < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(*sleepy.received.lock(), vec!["first", "second"]);
    assert_eq!(engine.sink_failures(), 0);
}

#[test]
fn test_dispatch_follows_registration_order() {
    let builder = Engine::builder(quiet_config())
        .compact_console()
        .with_sink("failing", || Ok(Arc::new(FailingSink) as Arc<dyn Sink>));
    let engine = with_shared(builder, "recording", RecordingSink::new()).build();
    engine.initialize();

    assert_eq!(engine.sink_names(), vec!["console", "failing", "recording"]);
}

#[test]
fn test_sink_that_fails_to_initialize_is_skipped() {
    let recorder = RecordingSink::new();
    let builder = Engine::builder(quiet_config())
        .compact_console()
        .with_sink("broken", || Err(SinkError::Unavailable("no disk".into())))
        .with_sink("exploding", || panic!("constructor panicked"));
    let engine = with_shared(builder, "recording", recorder.clone()).build();
    engine.initialize();

    assert!(engine.is_initialized());
    assert_eq!(engine.sink_names(), vec!["console", "recording"]);
    assert_eq!(engine.sink_failures(), 2);

    engine.info("degraded but alive", LogOptions::new());
    assert_eq!(recorder.len(), 1);
}

#[test]
fn test_remote_sink_without_runtime_degrades() {
    let transport = Arc::new(logcast_core::InMemoryTransport::new());
    let engine = Engine::builder(quiet_config())
        .compact_console()
        .with_telemetry(transport)
        .build();
    engine.initialize();

    assert_eq!(engine.sink_names(), vec!["console"]);
    assert_eq!(engine.sink_failures(), 1);
}

// ============================================================================
// Stats
// ============================================================================

#[test]
fn test_exactly_one_count_per_accepted_call() {
    let (engine, _) = recording_engine();

    engine.trace("t", LogOptions::new());
    engine.debug("d", LogOptions::new());
    engine.info("i", LogOptions::new());
    engine.warn("w", LogOptions::new());
    engine.log(LogLevel::Info, "i2", LogOptions::new());

    let counts = engine.stats_snapshot();
    assert_eq!(counts.total(), 5);
    assert_eq!(counts.get(LogLevel::Info), 2);
}

#[test]
fn test_report_stats_emits_summary_and_resets() {
    let (engine, recorder) = recording_engine();
    engine.info("a", LogOptions::new());
    engine.error("b", LogOptions::new());

    let window = engine.report_stats().unwrap();
    assert_eq!(window.total(), 2);
    assert!((window.error_rate() - 0.5).abs() < f64::EPSILON);

    let summary = recorder.entries().last().unwrap().clone();
    assert_eq!(summary.message, "Business event: log_statistics");
    let data = summary.data.unwrap();
    assert_eq!(data["category"], "system");
    assert_eq!(data["properties"]["total"], 2);
    assert_eq!(data["properties"]["counts"]["ERROR"], 1);

    // The summary entry itself opens the next window.
    assert_eq!(engine.stats_snapshot().total(), 1);
}

#[test]
fn test_empty_window_is_not_reported() {
    let (engine, recorder) = recording_engine();
    let window = engine.report_stats().unwrap();
    assert!(window.is_empty());
    assert_eq!(recorder.len(), 0);
}

#[test]
fn test_concurrent_logging_counts_every_entry() {
    let (engine, recorder) = recording_engine_with(quiet_config().with_min_level(LogLevel::Info));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    engine.info(format!("t{}-{}", t, i), LogOptions::new());
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    engine.flush_blocking();

    assert_eq!(recorder.len(), 200);
    assert_eq!(engine.stats_snapshot().total(), 200);
}
