//! Event-type filtering.
//!
//! Only a small set of Samsara event types is relayed. Everything else is
//! skipped, which callers treat as a successful no-op rather than an error.

use serde_json::Value;

/// Event types relayed when no override is configured.
pub const DEFAULT_EVENT_TYPES: &[&str] = &["GeofenceEntry", "GeofenceExit"];

/// JSON field holding the event type.
pub const EVENT_TYPE_FIELD: &str = "eventType";

/// Result of classifying an event type. Both variants carry the trimmed type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Accepted(String),
    Skipped(String),
}

impl Classification {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Classification::Accepted(_))
    }

    pub fn event_type(&self) -> &str {
        match self {
            Classification::Accepted(t) | Classification::Skipped(t) => t,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventClassifier {
    allowed: Vec<String>,
}

impl EventClassifier {
    pub fn new(allowed: Vec<String>) -> Self {
        Self {
            allowed: allowed
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Classify a raw event type, ignoring surrounding whitespace.
    pub fn classify(&self, raw_event_type: &str) -> Classification {
        let event_type = raw_event_type.trim();

        if !event_type.is_empty() && self.allowed.iter().any(|t| t == event_type) {
            Classification::Accepted(event_type.to_string())
        } else {
            Classification::Skipped(event_type.to_string())
        }
    }

    /// Classify a parsed event. A missing or non-string type is skipped.
    pub fn classify_event(&self, event: &Value) -> Classification {
        let raw = event
            .get(EVENT_TYPE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or("");
        self.classify(raw)
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_TYPES.iter().map(|t| t.to_string()).collect())
    }
}
