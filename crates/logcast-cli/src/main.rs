//! logcast CLI
//!
//! Thin host around logcast-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Drive a representative mix of events through every sink
//! logcast demo --count 3
//!
//! # Emit a single entry into the JSONL logs
//! logcast emit warn "Disk almost full" --tag storage --field free_mb=512
//!
//! # Render the JSONL logs as Markdown
//! logcast report --output LOGS.md
//!
//! # Use a TOML engine configuration
//! logcast --config logcast.toml demo
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logcast_core::{
    generate_report, BreadcrumbRecorder, Engine, EngineConfig, FileSinkConfig, Fields,
    InMemoryTransport, LogLevel, LogOptions, ReportOptions, SecuritySeverity,
};
use serde_json::Value;

/// logcast - structured logging engine
#[derive(Parser)]
#[command(name = "logcast")]
#[command(version)]
#[command(about = "logcast - fan-out structured logging with escalation and rolling stats")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Logs directory (default: ~/.logcast/logs)
    #[arg(short, long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit a representative mix of events through every sink
    Demo {
        /// Rounds of demo traffic
        #[arg(long, default_value_t = 1)]
        count: u32,
    },

    /// Emit a single log entry
    Emit {
        /// Level name (trace, debug, info, warn, error, fatal)
        level: String,

        /// Message text
        message: String,

        /// Origin tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Structured field as key=value (repeatable; JSON values are parsed)
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },

    /// Render the JSONL logs as a Markdown report
    Report {
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Include TRACE entries
        #[arg(long)]
        include_trace: bool,

        /// Maximum entries listed per tag (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        max_per_tag: usize,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default logs directory (~/.logcast/logs)
fn default_logs_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".logcast")
        .join("logs")
}

/// Parse `key=value`; the value is JSON when it parses, else a string.
fn parse_field(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty field name in '{}'", s));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Config with the file sink pointed at `logs_dir` unless the config file
/// already configures one.
fn with_file_sink(mut config: EngineConfig, logs_dir: &Path, instance: &str) -> EngineConfig {
    if config.file.is_none() {
        config.file = Some(FileSinkConfig::new(logs_dir, instance));
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let logs_dir = cli.logs_dir.unwrap_or_else(default_logs_dir);

    match cli.command {
        Commands::Demo { count } => run_demo(with_file_sink(config, &logs_dir, "demo"), count).await,
        Commands::Emit {
            level,
            message,
            tag,
            fields,
        } => run_emit(with_file_sink(config, &logs_dir, "cli"), &level, message, tag, fields).await,
        Commands::Report {
            output,
            include_trace,
            max_per_tag,
        } => {
            let options = ReportOptions {
                include_trace,
                max_per_tag,
                ..ReportOptions::default()
            };
            let report = generate_report(&logs_dir, &options)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, report)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Report written to {}", path.display());
                }
                None => print!("{}", report),
            }
            Ok(())
        }
    }
}

async fn run_demo(config: EngineConfig, count: u32) -> Result<()> {
    let telemetry = Arc::new(InMemoryTransport::new());
    let crash = Arc::new(BreadcrumbRecorder::default());

    let engine = Engine::builder(config)
        .with_telemetry(telemetry.clone())
        .with_crash_reporter(crash.clone())
        .with_context_accessor("locale", || Ok(Value::from("en-US")))
        .build();
    engine.initialize();

    engine.set_user_id("demo-user");
    engine.set_current_screen("home");
    engine.lifecycle_event("app_launched", "foreground");

    for round in 0..count {
        let mut extra = Fields::new();
        extra.insert("round".into(), Value::from(round));
        engine.user_action("open_cart", extra);

        engine.performance("load_cart", Duration::from_millis(180));
        engine.performance("sync_inbox", Duration::from_millis(6_200));
        engine.network_event("GET", "https://api.example.com/cart", 200, Duration::from_millis(95));
        engine.network_event("POST", "https://api.example.com/pay", 503, Duration::from_millis(2_400));
        engine.business_event(
            "purchase",
            "commerce",
            serde_json::json!({ "amount": 42.5, "currency": "EUR", "round": round }),
        );
    }

    engine.security_event("token_reuse_detected", SecuritySeverity::Critical);
    let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "payment gateway reset");
    engine.error(
        "Payment failed",
        LogOptions::tagged("payments").field("order_id", "ord-1001").error(&err),
    );
    engine.lifecycle_event("app_backgrounded", "background");

    let window = engine.report_stats();
    engine.flush().await;

    println!();
    println!("Sinks:        {}", engine.sink_names().join(", "));
    if let Some(window) = window {
        let counts: Vec<String> = window
            .counts
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(level, n)| format!("{}={}", level, n))
            .collect();
        println!("Stats:        {} entries ({})", window.total(), counts.join(" "));
        println!("Error rate:   {:.1}%", window.error_rate() * 100.0);
    }
    println!("Telemetry:    {} batches, {} entries", telemetry.batches().len(), telemetry.entries().len());
    println!("Breadcrumbs:  {}", crash.breadcrumbs().len());
    for breadcrumb in crash.breadcrumbs() {
        println!("  {}", breadcrumb);
    }
    println!("Sink failures: {}", engine.sink_failures());

    engine.dispose();
    Ok(())
}

async fn run_emit(
    config: EngineConfig,
    level: &str,
    message: String,
    tag: Option<String>,
    fields: Vec<(String, Value)>,
) -> Result<()> {
    let level: LogLevel = level.parse()?;
    let engine = Engine::new(config);
    engine.initialize();

    if !engine.is_enabled(level) {
        eprintln!(
            "{} is below the minimum level {}; entry not recorded",
            level,
            engine.min_level()
        );
    }

    let mut options = LogOptions::new();
    if let Some(tag) = tag {
        options = options.tag(tag);
    }
    for (key, value) in fields {
        options = options.field(key, value);
    }
    engine.log(level, message, options);

    engine.flush().await;
    engine.dispose();
    Ok(())
}
