//! Specialized event methods on [`Engine`].
//!
//! Each method picks a level from the event's meaning, builds a fixed-shape
//! `data` map and goes through the normal logging path. Two of them do a
//! little more: slow operations add a WARN entry, and critical security
//! events run the alert path.

use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::engine::{panic_message, Engine, SinkFailure};
use crate::entry::{Fields, LogEntry, LogOptions};
use crate::error::{LogcastError, SinkError};
use crate::level::LogLevel;

pub const TAG_USER_ACTION: &str = "USER_ACTION";
pub const TAG_PERFORMANCE: &str = "PERFORMANCE";
pub const TAG_BUSINESS: &str = "BUSINESS";
pub const TAG_SECURITY: &str = "SECURITY";
pub const TAG_NETWORK: &str = "NETWORK";
pub const TAG_LIFECYCLE: &str = "LIFECYCLE";

/// Keys every user action carries; caller extras cannot replace them.
const USER_ACTION_FIELDS: [&str; 5] = ["action", "screen", "timestamp", "user_id", "session_duration"];

/// Receives critical security events.
///
/// Called synchronously before `security_event` returns. Errors and panics
/// are isolated like sink failures.
pub trait AlertHandler: Send + Sync {
    fn alert(&self, entry: &LogEntry) -> anyhow::Result<()>;
}

/// Severity of a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecuritySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SecuritySeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            SecuritySeverity::Low => "low",
            SecuritySeverity::Medium => "medium",
            SecuritySeverity::High => "high",
            SecuritySeverity::Critical => "critical",
        }
    }

    /// ERROR for critical events, WARN otherwise.
    pub fn level(self) -> LogLevel {
        match self {
            SecuritySeverity::Critical => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

impl fmt::Display for SecuritySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecuritySeverity {
    type Err = LogcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(SecuritySeverity::Low),
            "medium" => Ok(SecuritySeverity::Medium),
            "high" => Ok(SecuritySeverity::High),
            "critical" => Ok(SecuritySeverity::Critical),
            other => Err(LogcastError::InvalidSeverity(other.to_string())),
        }
    }
}

/// Letter grade for an operation's duration.
pub fn performance_grade(duration: Duration) -> char {
    match duration.as_millis() {
        0..=99 => 'A',
        100..=499 => 'B',
        500..=999 => 'C',
        1000..=2999 => 'D',
        _ => 'F',
    }
}

/// `250ms` below one second, `1.50s` from there on.
pub fn readable_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Engine {
    /// A user interaction on the current screen. `extra` fields are appended
    /// after the standard ones; extras reusing a standard key are ignored.
    #[track_caller]
    pub fn user_action(&self, action: &str, extra: Fields) {
        let ambient = self.ambient();
        let mut options = LogOptions::tagged(TAG_USER_ACTION)
            .field("action", action)
            .field("screen", ambient.screen.clone())
            .field("timestamp", now_iso())
            .field("user_id", ambient.user_id.clone())
            .field("session_duration", ambient.session_duration_secs());
        for (key, value) in extra {
            if USER_ACTION_FIELDS.contains(&key.as_str()) {
                debug!(field = %key, action, "Ignoring extra field that shadows a standard one");
                continue;
            }
            options = options.field(key, value);
        }

        self.emit(
            LogLevel::Info,
            format!("User action: {}", action),
            options,
            Location::caller(),
        );
    }

    /// How long an operation took. Operations over the slow threshold also
    /// produce a WARN entry.
    #[track_caller]
    pub fn performance(&self, operation: &str, duration: Duration) {
        let caller = Location::caller();
        let duration_ms = duration.as_millis() as u64;
        let threshold_ms = self.config().performance.slow_threshold_ms;
        let is_slow = duration_ms > threshold_ms;
        let readable = readable_duration(duration);

        self.emit(
            LogLevel::Info,
            format!("Performance: {} took {}", operation, readable),
            LogOptions::tagged(TAG_PERFORMANCE)
                .field("operation", operation)
                .field("duration_ms", duration_ms)
                .field("duration_readable", readable.as_str())
                .field("is_slow", is_slow)
                .field("performance_grade", performance_grade(duration).to_string()),
            caller,
        );

        if is_slow {
            self.emit(
                LogLevel::Warn,
                format!("Slow operation detected: {} took {}", operation, readable),
                LogOptions::tagged(TAG_PERFORMANCE)
                    .field("operation", operation)
                    .field("duration_ms", duration_ms)
                    .field("threshold_ms", threshold_ms),
                caller,
            );
        }
    }

    /// Run `f` and record its duration as a performance event.
    #[track_caller]
    pub fn measure<T>(&self, operation: &str, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let result = f();
        self.performance(operation, started.elapsed());
        result
    }

    /// A domain event for analytics.
    #[track_caller]
    pub fn business_event(&self, event: &str, category: &str, properties: Value) {
        let ambient = self.ambient();
        let app = &self.config().app;

        self.emit(
            LogLevel::Info,
            format!("Business event: {}", event),
            LogOptions::tagged(TAG_BUSINESS)
                .field("event", event)
                .field("category", category)
                .field("properties", properties)
                .field("user_id", ambient.user_id)
                .field("session_id", ambient.session_id)
                .field("app_version", app.version.as_str())
                .field("platform", std::env::consts::OS)
                .field("timestamp", now_iso()),
            Location::caller(),
        );
    }

    /// A security-relevant event. Critical events are logged at ERROR and run
    /// the alert path once before returning.
    #[track_caller]
    pub fn security_event(&self, event: &str, severity: SecuritySeverity) {
        let caller = Location::caller();
        let ambient = self.ambient();
        let app = &self.config().app;

        let options = LogOptions::tagged(TAG_SECURITY)
            .field("security_event", event)
            .field("severity", severity.as_str())
            .field("user_id", ambient.user_id.clone())
            .field("session_id", ambient.session_id.clone())
            .field("screen", ambient.screen.clone())
            .field("platform", std::env::consts::OS)
            .field("arch", std::env::consts::ARCH)
            .field("app_version", app.version.as_str())
            .field("session_duration", ambient.session_duration_secs())
            .field("timestamp", now_iso());
        let message = format!("Security event: {}", event);

        if severity != SecuritySeverity::Critical {
            self.emit(severity.level(), message, options, caller);
            return;
        }

        let entry = match self.emit(severity.level(), message.clone(), options.clone(), caller) {
            Some(entry) => entry,
            // Filtered by level: still alert while the engine is running.
            None if self.is_initialized() => {
                Arc::new(self.build_entry(severity.level(), message, options, caller))
            }
            None => return,
        };
        self.raise_alert(&entry);
    }

    /// An HTTP request outcome. 4xx and 5xx responses are logged at WARN.
    #[track_caller]
    pub fn network_event(&self, method: &str, url: &str, status_code: u16, duration: Duration) {
        let is_success = (200..300).contains(&status_code);
        let is_client_error = (400..500).contains(&status_code);
        let is_server_error = status_code >= 500;
        let level = if is_client_error || is_server_error {
            LogLevel::Warn
        } else {
            LogLevel::Info
        };
        let method = method.to_ascii_uppercase();

        self.emit(
            level,
            format!("{} {} -> {}", method, url, status_code),
            LogOptions::tagged(TAG_NETWORK)
                .field("method", method.as_str())
                .field("url", url)
                .field("status_code", status_code)
                .field("duration_ms", duration.as_millis() as u64)
                .field("is_success", is_success)
                .field("is_client_error", is_client_error)
                .field("is_server_error", is_server_error),
            Location::caller(),
        );
    }

    /// An application lifecycle transition (launch, background, resume...).
    #[track_caller]
    pub fn lifecycle_event(&self, event: &str, app_state: &str) {
        let ambient = self.ambient();

        self.emit(
            LogLevel::Info,
            format!("App lifecycle: {}", event),
            LogOptions::tagged(TAG_LIFECYCLE)
                .field("lifecycle_event", event)
                .field("app_state", app_state)
                .field("session_id", ambient.session_id)
                .field("uptime", self.uptime().as_secs()),
            Location::caller(),
        );
    }

    fn raise_alert(&self, entry: &LogEntry) {
        let Some(active) = self.active() else {
            return;
        };

        if let Some(handler) = self.alert_handler() {
            let failure = match panic::catch_unwind(AssertUnwindSafe(|| handler.alert(entry))) {
                Ok(Ok(())) => return,
                Ok(Err(e)) => SinkFailure::Error(SinkError::Other(e.to_string())),
                Err(payload) => SinkFailure::Panic(panic_message(payload.as_ref())),
            };
            active.failures.report("alert", "alert", &failure);
            return;
        }

        // No handler: leave a breadcrumb and make durable sinks persist.
        let mut pending = active.submit_durable_flush("alert flush");
        pending.extend(
            active.submit_breadcrumb("alert breadcrumb", format!("SECURITY ALERT: {}", entry.message)),
        );
        active.await_all(pending, self.config().flush_timeout());
    }
}
