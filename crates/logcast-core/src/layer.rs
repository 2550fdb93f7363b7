//! Bridge from `tracing` to the engine.
//!
//! Install [`EngineLayer`] on a subscriber and every `tracing` event becomes
//! an engine entry: the level is mapped, the event target becomes the tag and
//! the event fields become `data`. Events from this crate itself are skipped
//! so sink-failure diagnostics never loop back into the sinks.

use std::panic::Location;

use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::engine::Engine;
use crate::entry::LogOptions;
use crate::level::LogLevel;

/// Targets never forwarded to the engine.
const OWN_TARGET: &str = "logcast_core";

/// A tracing Layer that logs events through an [`Engine`].
pub struct EngineLayer {
    engine: Engine,
}

impl EngineLayer {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl<S> Layer<S> for EngineLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if target.starts_with(OWN_TARGET) {
            return;
        }

        let level = LogLevel::from(metadata.level());
        if !self.engine.is_enabled(level) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut options = LogOptions::tagged(target);
        if let Some(error) = visitor.error.take() {
            options = options.error_message(error);
        }
        for (key, value) in visitor.fields {
            options = options.field(key, value);
        }
        if let Some(scope) = ctx.event_scope(event) {
            let spans: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
            if !spans.is_empty() {
                options = options.field("span", spans.join(" > "));
            }
        }

        self.engine.emit(
            level,
            visitor.message.unwrap_or_default(),
            options,
            Location::caller(),
        );
    }
}

/// Collects the message, an `error` field, and everything else as JSON.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    error: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{:?}", value);
        match field.name() {
            "message" => self.message = Some(text),
            "error" => self.error = Some(text),
            _ => self.insert(field, Value::String(text)),
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "error" => self.error = Some(value.to_string()),
            _ => self.insert(field, Value::String(value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = Number::from_f64(value) {
            self.insert(field, Value::Number(n));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        if field.name() == "error" {
            self.error = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }
}
