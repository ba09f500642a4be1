//! Structured event sink for the host's observability layer.
//!
//! The core never writes to a network endpoint itself. Noteworthy events
//! (slow loads, retries, terminal failures, completed preloads, budget
//! violations) are handed to an injected [`EventSink`] as a [`LogEvent`], and
//! the host decides where they go.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// Event categories emitted by the core.
pub mod category {
    pub const LOADER: &str = "loader";
    pub const PRELOAD: &str = "preload";
    pub const BUDGET: &str = "budget";
}

/// Event actions emitted by the core.
pub mod action {
    pub const SLOW_LOAD: &str = "slow_load";
    pub const RETRY: &str = "retry";
    pub const FAILURE: &str = "failure";
    pub const PRELOADED: &str = "preloaded";
    pub const VIOLATION: &str = "violation";
}

/// A structured event handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub category: String,
    pub action: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub tags: Vec<String>,
}

impl LogEvent {
    pub fn new(category: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            action: action.into(),
            metadata: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    /// Attach a metadata field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    pub fn is(&self, category: &str, action: &str) -> bool {
        self.category == category && self.action == action
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category, self.action)?;
        for (key, value) in &self.metadata {
            write!(f, " {}={}", key, value)?;
        }
        if !self.tags.is_empty() {
            write!(f, " [{}]", self.tags.join(","))?;
        }
        Ok(())
    }
}

/// Receives structured events from the core.
///
/// Implementations must return quickly; they are called inline from load and
/// evaluation paths.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

/// Shared sink handle.
pub type SharedEventSink = Arc<dyn EventSink>;

/// Forwards events to `tracing`.
///
/// Failures and violations log at `warn`, everything else at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: LogEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        match event.action.as_str() {
            action::FAILURE | action::VIOLATION | action::SLOW_LOAD => tracing::warn!(
                category = %event.category,
                action = %event.action,
                metadata = %metadata,
                tags = ?event.tags,
                "Loader event"
            ),
            _ => tracing::info!(
                category = %event.category,
                action = %event.action,
                metadata = %metadata,
                tags = ?event.tags,
                "Loader event"
            ),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: LogEvent) {}
}

/// Records events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all recorded events, oldest first.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    /// Recorded events matching `category` and `action`.
    pub fn matching(&self, category: &str, action: &str) -> Vec<LogEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.is(category, action))
            .cloned()
            .collect()
    }

    pub fn count(&self, category: &str, action: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.is(category, action))
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: LogEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_builder() {
        let event = LogEvent::new(category::LOADER, action::RETRY)
            .with("resource", "hero")
            .with("attempt", 2)
            .tag("degraded");

        assert!(event.is("loader", "retry"));
        assert_eq!(event.get("resource"), Some(&serde_json::json!("hero")));
        assert_eq!(event.get("attempt"), Some(&serde_json::json!(2)));
        assert_eq!(event.tags, vec!["degraded".to_string()]);
    }

    #[test]
    fn test_log_event_display() {
        let event = LogEvent::new("budget", "violation")
            .with("metric", "cls")
            .tag("fast");
        assert_eq!(event.to_string(), "budget.violation metric=\"cls\" [fast]");
    }

    #[test]
    fn test_log_event_serializes() {
        let event = LogEvent::new("preload", "preloaded").with("resource", "a");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "preload");
        assert_eq!(json["metadata"]["resource"], "a");
    }

    #[test]
    fn test_memory_sink_records() {
        let sink = MemorySink::new();
        sink.emit(LogEvent::new("loader", "retry"));
        sink.emit(LogEvent::new("loader", "failure"));
        sink.emit(LogEvent::new("loader", "retry"));

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.count("loader", "retry"), 2);
        assert_eq!(sink.matching("loader", "failure").len(), 1);

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_sinks_as_trait_objects() {
        let sinks: Vec<SharedEventSink> = vec![
            Arc::new(TracingSink),
            Arc::new(NullSink),
            Arc::new(MemorySink::new()),
        ];
        for sink in sinks {
            sink.emit(LogEvent::new("loader", "slow_load"));
        }
    }
}
