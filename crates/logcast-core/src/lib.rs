//! logcast Core Library
//!
//! Structured logging for applications that need more than a console.
//!
//! ## Overview
//!
//! Application code talks to one [`Engine`]. Each accepted call becomes an
//! immutable [`LogEntry`], enriched with identity and ambient context, counted
//! by the rolling stats, and fanned out to every registered sink:
//!
//! - **Console**: human-readable, always present
//! - **File**: buffered JSONL with durable flush and rotation
//! - **Remote**: batched, fire-and-forget delivery to a telemetry transport
//! - **Crash**: breadcrumbs and errors for a crash reporter
//!
//! ## Core Principles
//!
//! - **Never throws**: a failing sink is isolated, counted and reported on
//!   the console; the host application never sees it
//! - **Independent sinks**: each sink runs on its own worker, so a stalled
//!   sink delays neither the caller nor the other sinks
//! - **Degrade, don't abort**: initialization continues with whatever sinks
//!   come up
//! - **Escalation**: ERROR and FATAL entries flush durable sinks and leave a
//!   crash breadcrumb before the call returns
//!
//! ## Quick Start
//!
//! ```ignore
//! use logcast_core::{Engine, EngineConfig, FileSinkConfig, LogOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Engine::new(
//!         EngineConfig::release().with_file(FileSinkConfig::new("./logs", "shop")),
//!     );
//!     engine.initialize();
//!
//!     engine.info("Checkout started", LogOptions::new().field("items", 3));
//!     engine.performance("load_cart", std::time::Duration::from_millis(180));
//!
//!     engine.flush().await;
//!     engine.dispose();
//! }
//! ```

pub mod config;
pub mod context;
mod dispatch;
pub mod engine;
pub mod entry;
pub mod error;
pub mod events;
pub mod layer;
pub mod level;
pub mod report;
pub mod sink;
pub mod stats;

// Re-exports
pub use config::{
    AppInfo, BuildMode, EngineConfig, FileSinkConfig, PerformanceConfig, RemoteSinkConfig,
    StatsConfig,
};
pub use context::{Accessor, AmbientState, ContextBuilder};
pub use engine::{Engine, EngineBuilder};
pub use entry::{Fields, LogEntry, LogOptions, WireEntry};
pub use error::{ConfigError, LogcastError, LogcastResult, SinkError, TransportError};
pub use events::{performance_grade, readable_duration, AlertHandler, SecuritySeverity};
pub use layer::EngineLayer;
pub use level::{LevelCounts, LogLevel};
pub use report::{generate_report, write_report, ReportOptions};
pub use sink::{
    read_all_entries, BreadcrumbRecorder, ConsoleSink, CrashReporter, CrashSink, FileSink,
    InMemoryTransport, RemoteSink, Sink, SinkFactory, TelemetryTransport,
};
pub use stats::{StatsAggregator, StatsWindow};
