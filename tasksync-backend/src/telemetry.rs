//! Fire-and-forget product telemetry.
//!
//! Telemetry is distinct from diagnostics: events describe what the user
//! did (`create_task`, `login`), not what the code did. Sinks must never
//! block or fail the caller; an overloaded sink drops events.

use parking_lot::Mutex;
use serde_json::{Map, Value};

/// A named event with structured properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    /// Event name, snake_case by convention.
    pub name: String,
    /// Structured properties attached to the event.
    pub properties: Map<String, Value>,
}

impl TelemetryEvent {
    /// Creates an event with no properties.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Map::new(),
        }
    }

    /// Attaches one property, consuming and returning the event for
    /// chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Event sink the application logs through.
pub trait TelemetrySink: Send + Sync {
    /// Records one event. Infallible at the call site; sinks swallow their
    /// own failures.
    fn log_event(&self, event: TelemetryEvent);
}

/// Sink that forwards events onto the `telemetry` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn log_event(&self, event: TelemetryEvent) {
        let properties = Value::Object(event.properties);
        tracing::info!(target: "telemetry", name = %event.name, %properties, "event");
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn log_event(&self, _event: TelemetryEvent) {}
}

/// Test double that keeps every event for later assertion.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event, in order.
    #[must_use]
    pub fn recorded(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Returns just the recorded event names, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.name.clone()).collect()
    }
}

impl TelemetrySink for RecordingSink {
    fn log_event(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}
