//! Received attribute change events.
//!
//! An [`Event`] is an immutable record of one notification: which source
//! published it, for which attribute, with which value and when it was
//! received locally. Receipt order is the only total order available;
//! no source-side timestamp is trusted.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::typed::EnumLabels;
use crate::value::Value;

/// Unique identity of a received event.
///
/// Two events with identical content received at different moments are
/// still distinct events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Create a new random event id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One attribute change notification, as received.
#[derive(Debug, Clone)]
pub struct Event {
    id: EventId,
    source_id: String,
    attribute: String,
    value: Value,
    error: Option<String>,
    labels: Option<Arc<EnumLabels>>,
    received_at: Instant,
    received_wall: DateTime<Utc>,
}

impl Event {
    /// Create an event received now.
    pub fn new(source_id: impl Into<String>, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::received_at(source_id, attribute, value, Instant::now())
    }

    /// Create an event with an explicit monotonic receipt time.
    ///
    /// The wall-clock timestamp is derived from the offset between
    /// `received_at` and now.
    pub fn received_at(
        source_id: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<Value>,
        received_at: Instant,
    ) -> Self {
        let now = Instant::now();
        let wall = Utc::now();
        let received_wall = if received_at <= now {
            chrono::Duration::from_std(now - received_at).map_or(wall, |age| wall - age)
        } else {
            chrono::Duration::from_std(received_at - now).map_or(wall, |ahead| wall + ahead)
        };

        Self {
            id: EventId::new(),
            source_id: source_id.into(),
            attribute: attribute.into(),
            value: value.into(),
            error: None,
            labels: None,
            received_at,
            received_wall,
        }
    }

    /// Create an error event received now: the source reported a failure
    /// instead of a value.
    pub fn error(source_id: impl Into<String>, attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source_id, attribute, Value::Null).with_error(message)
    }

    /// Mark this event as an error notification.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Type the value with an enum label table.
    #[must_use]
    pub fn with_labels(mut self, labels: Arc<EnumLabels>) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Unique identity of this event.
    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Identifier of the source that published the event.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Attribute name as received.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// The new attribute value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// The enum label table this event is typed with.
    #[must_use]
    pub fn labels(&self) -> Option<&EnumLabels> {
        self.labels.as_deref()
    }

    /// Label of the value, for typed events with a known code.
    #[must_use]
    pub fn value_label(&self) -> Option<&str> {
        self.labels.as_ref()?.label_of(&self.value)
    }

    /// The value as shown to people: `Enum.LABEL` for typed events with a
    /// known code, the plain value otherwise.
    #[must_use]
    pub fn value_text(&self) -> String {
        self.labels
            .as_ref()
            .and_then(|labels| labels.render(&self.value))
            .unwrap_or_else(|| self.value.to_string())
    }

    /// Whether the value equals `expected`.
    ///
    /// On a typed event a string naming the value's label also matches,
    /// so `"IDLE"` matches code 2 of an `ObsState` table.
    #[must_use]
    pub fn has_value(&self, expected: &Value) -> bool {
        if &self.value == expected {
            return true;
        }
        match (expected, self.value_label()) {
            (Value::String(name), Some(label)) => name == label,
            _ => false,
        }
    }

    /// Error reported by the source, if this is an error event.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether the source reported an error instead of a value.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Monotonic receipt time, used for ordering.
    #[must_use]
    pub const fn receipt_time(&self) -> Instant {
        self.received_at
    }

    /// Wall-clock receipt time, used for display.
    #[must_use]
    pub const fn receipt_wall_time(&self) -> DateTime<Utc> {
        self.received_wall
    }

    /// Whether the event comes from the given source (exact match).
    #[must_use]
    pub fn has_source(&self, source_id: &str) -> bool {
        self.source_id == source_id
    }

    /// Whether the event concerns the given attribute (case-insensitive).
    #[must_use]
    pub fn has_attribute(&self, attribute: &str) -> bool {
        same_attribute_name(&self.attribute, attribute)
    }

    /// Whether two events share the same source and attribute.
    #[must_use]
    pub fn same_channel(&self, other: &Self) -> bool {
        self.has_source(&other.source_id) && self.has_attribute(&other.attribute)
    }

    /// Time elapsed since the event was received.
    #[must_use]
    pub fn reception_age(&self) -> Duration {
        self.received_at.elapsed()
    }
}

/// Case-insensitive attribute name comparison used throughout the crate.
pub(crate) fn same_attribute_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event(source_id='{}', attribute='{}', value=", self.source_id, self.attribute)?;
        write!(f, "{}, ", self.value_text())?;
        if let Some(err) = &self.error {
            write!(f, "error={err:?}, ")?;
        }
        write!(f, "received_at={})", self.received_wall.format("%Y-%m-%d %H:%M:%S%.6f"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_match_is_case_insensitive() {
        let ev = Event::new("sys/tg_test/1", "State", "ON");
        assert!(ev.has_attribute("state"));
        assert!(ev.has_attribute("STATE"));
        assert!(!ev.has_attribute("status"));
    }

    #[test]
    fn source_match_is_exact() {
        let ev = Event::new("sys/tg_test/1", "state", "ON");
        assert!(ev.has_source("sys/tg_test/1"));
        assert!(!ev.has_source("sys/tg_test/2"));
    }

    #[test]
    fn identical_content_is_still_distinct() {
        let a = Event::new("dev", "attr", 1);
        let b = Event::new("dev", "attr", 1);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn error_event_is_flagged() {
        let ev = Event::error("dev", "attr", "API_DeviceTimedOut");
        assert!(ev.is_error());
        assert_eq!(ev.error_message(), Some("API_DeviceTimedOut"));
        assert!(ev.to_string().contains("API_DeviceTimedOut"));
        assert!(!Event::new("dev", "attr", 1).is_error());
    }

    #[test]
    fn explicit_receipt_time_orders_events() {
        let base = Instant::now();
        let early = Event::received_at("dev", "attr", 41, base);
        let late = Event::received_at("dev", "attr", 42, base + Duration::from_millis(5));
        assert!(early.receipt_time() < late.receipt_time());
        assert!(early.receipt_wall_time() <= late.receipt_wall_time());
        assert!(early.same_channel(&late));
    }

    #[test]
    fn typed_event_matches_code_and_label() {
        let labels = Arc::new(EnumLabels::new("ObsState").with_label(2, "IDLE"));
        let typed = Event::new("dev", "obsState", 2).with_labels(labels);
        assert!(typed.has_value(&Value::Int(2)));
        assert!(typed.has_value(&Value::from("IDLE")));
        assert!(!typed.has_value(&Value::from("READY")));
        assert!(typed.to_string().contains("value=ObsState.IDLE, "));

        let plain = Event::new("dev", "obsState", 2);
        assert!(!plain.has_value(&Value::from("IDLE")));
        assert!(plain.to_string().contains("value=2, "));
    }

    #[test]
    fn display_is_human_readable() {
        let ev = Event::new("dev", "obsState", "READY");
        let text = ev.to_string();
        assert!(text.contains("source_id='dev'"));
        assert!(text.contains("attribute='obsState'"));
        assert!(text.contains("value=\"READY\""));
    }
}
