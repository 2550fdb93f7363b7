//! Log entry types and their canonical JSON shape.
//!
//! A [`LogEntry`] is built once inside the engine and handed to every sink by
//! shared reference. File and remote sinks serialize it through [`WireEntry`],
//! the flat object that downstream systems consume (one object per JSONL line).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::level::LogLevel;

/// Ordered string-keyed map of JSON values, used for `data` and `context`.
pub type Fields = Map<String, Value>;

/// One fully enriched log event.
///
/// Entries are immutable after construction: sinks only ever see `&LogEntry`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Origin label (caller supplied or inferred from the call site)
    pub tag: Option<String>,
    /// Structured fields supplied by the call site
    pub data: Option<Fields>,
    /// Captured failure text
    pub error: Option<String>,
    /// Type name of the captured failure
    pub error_type: Option<String>,
    pub stack_trace: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Ambient snapshot taken when the entry was built
    pub context: Fields,
}

impl LogEntry {
    /// Create an entry stamped with the current time and no enrichment.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            tag: None,
            data: None,
            error: None,
            error_type: None,
            stack_trace: None,
            user_id: None,
            session_id: None,
            context: Fields::new(),
        }
    }

    /// ISO 8601 timestamp with millisecond precision (e.g. "2026-01-21T14:30:45.123Z").
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Short content hash of the message, for downstream de-duplication.
    pub fn message_hash(&self) -> String {
        let digest = blake3::hash(self.message.as_bytes());
        digest.to_hex()[..16].to_string()
    }

    /// Convert to the canonical wire shape.
    pub fn to_wire(&self) -> WireEntry {
        let mut wire = WireEntry {
            timestamp: self.timestamp_iso(),
            level: self.level,
            level_value: self.level.rank(),
            message: self.message.clone(),
            tag: self.tag.clone(),
            data: self.data.clone(),
            error: self.error.clone(),
            error_type: self.error_type.clone(),
            stack_trace: self.stack_trace.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            context: self.context.clone(),
            message_hash: self.message_hash(),
            log_size: 0,
        };
        wire.log_size = serde_json::to_vec(&wire).map(|b| b.len()).unwrap_or(0);
        wire
    }

    /// Serialize to a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_wire())
    }

    /// Serialize to a JSON value in the canonical wire shape.
    pub fn to_json_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self.to_wire())
    }
}

/// Serialized form of a [`LogEntry`].
///
/// Every key is always present (absent values are `null`), so downstream
/// consumers can rely on a fixed column set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEntry {
    /// ISO 8601 timestamp
    pub timestamp: String,
    pub level: LogLevel,
    /// Numeric rank of `level`
    pub level_value: u8,
    pub message: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub data: Option<Fields>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: Fields,
    #[serde(default)]
    pub message_hash: String,
    /// Byte length of this object serialized with `log_size = 0`
    #[serde(default)]
    pub log_size: usize,
}

impl WireEntry {
    /// Parse from a JSON line.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Optional inputs accepted by every logging method.
///
/// ```ignore
/// engine.warn(
///     "upload retry",
///     LogOptions::tagged("uploader")
///         .field("attempt", 3)
///         .error(&err),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub(crate) tag: Option<String>,
    pub(crate) data: Option<Fields>,
    pub(crate) error: Option<String>,
    pub(crate) error_type: Option<String>,
    pub(crate) stack_trace: Option<String>,
    pub(crate) user_id: Option<String>,
    pub(crate) session_id: Option<String>,
}

impl LogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with only a tag set.
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self::new().tag(tag)
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Replace the structured data map.
    pub fn data(mut self, data: Fields) -> Self {
        self.data = Some(data);
        self
    }

    /// Append one structured field, keeping insertion order.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data
            .get_or_insert_with(Fields::new)
            .insert(key.into(), value.into());
        self
    }

    /// Capture an error's message and concrete type name.
    pub fn error<E: std::error::Error + ?Sized>(mut self, err: &E) -> Self {
        self.error = Some(err.to_string());
        self.error_type = Some(short_type_name(std::any::type_name::<E>()).to_string());
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        if !chain.is_empty() && self.stack_trace.is_none() {
            self.stack_trace = Some(chain.join("\n"));
        }
        self
    }

    /// Capture an error given only as text.
    pub fn error_message(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }

    /// Capture the current thread's backtrace as the stack trace.
    pub fn capture_backtrace(self) -> Self {
        let trace = std::backtrace::Backtrace::force_capture().to_string();
        self.stack_trace(trace)
    }

    /// Override the engine's ambient user id for this entry.
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Override the engine's ambient session id for this entry.
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Last path segment of a type name. Generic types keep their full name.
fn short_type_name(name: &str) -> &str {
    let base = name.split('<').next().unwrap_or(name);
    match base.rfind("::") {
        Some(idx) if base.len() == name.len() => &name[idx + 2..],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_has_canonical_keys() {
        let entry = LogEntry::new(LogLevel::Info, "Connected to backend");
        let value = entry.to_json_value().unwrap();
        let obj = value.as_object().unwrap();

        for key in [
            "timestamp",
            "level",
            "level_value",
            "message",
            "tag",
            "data",
            "error",
            "error_type",
            "stack_trace",
            "user_id",
            "session_id",
            "context",
            "message_hash",
            "log_size",
        ] {
            assert!(obj.contains_key(key), "missing key {}", key);
        }
        assert_eq!(obj["level"], "INFO");
        assert_eq!(obj["level_value"], 2);
    }

    #[test]
    fn test_level_survives_json_line() {
        let mut entry = LogEntry::new(LogLevel::Fatal, "disk gone");
        entry.tag = Some("storage".into());

        let line = entry.to_json_line().unwrap();
        let parsed = WireEntry::from_json_line(&line).unwrap();
        assert_eq!(parsed.level, LogLevel::Fatal);
        assert_eq!(parsed.level_value, LogLevel::Fatal.rank());
        assert_eq!(parsed.tag.as_deref(), Some("storage"));
    }

    #[test]
    fn test_log_size_and_hash() {
        let entry = LogEntry::new(LogLevel::Debug, "hello");
        let wire = entry.to_wire();
        assert!(wire.log_size > 0);
        assert_eq!(wire.message_hash.len(), 16);
        assert_eq!(wire.message_hash, LogEntry::new(LogLevel::Warn, "hello").message_hash());
    }

    #[test]
    fn test_options_fields_keep_order() {
        let opts = LogOptions::new()
            .field("zeta", 1)
            .field("alpha", "two")
            .field("mid", true);
        let keys: Vec<_> = opts.data.unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_options_error_capture() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "pipe broke");
        let opts = LogOptions::new().error(&err);
        assert_eq!(opts.error.as_deref(), Some("pipe broke"));
        assert_eq!(opts.error_type.as_deref(), Some("Error"));
    }
}
