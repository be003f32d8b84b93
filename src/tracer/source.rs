//! Boundary with the systems that emit attribute change notifications.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SourceError;
use crate::event::Event;
use crate::value::Value;

/// A notification as delivered by an event source, before it becomes an
/// [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNotification {
    /// Identifier of the emitting source.
    pub source_id: String,
    /// Attribute name as the source spells it (possibly fully qualified).
    pub attribute: String,
    /// New value, absent for error notifications.
    pub value: Option<Value>,
    /// Failure reported instead of a value.
    pub error: Option<String>,
}

impl RawNotification {
    /// A value change notification.
    pub fn value(
        source_id: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            attribute: attribute.into(),
            value: Some(value.into()),
            error: None,
        }
    }

    /// An error notification.
    pub fn error(
        source_id: impl Into<String>,
        attribute: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            attribute: attribute.into(),
            value: None,
            error: Some(message.into()),
        }
    }

    /// Wrap into an event received now.
    ///
    /// With `normalize_attribute` the attribute is reduced to its short
    /// name (see [`short_attribute_name`]).
    #[must_use]
    pub fn into_event(self, normalize_attribute: bool) -> Event {
        let attribute = if normalize_attribute {
            short_attribute_name(&self.attribute).to_string()
        } else {
            self.attribute
        };
        let event = Event::new(self.source_id, attribute, self.value.unwrap_or_default());
        match self.error {
            Some(message) => event.with_error(message),
            None => event,
        }
    }
}

const NO_DATABASE_SUFFIX: &str = "#dbase=no";

/// The short form of a possibly fully qualified attribute name: the last
/// `/` segment, without a `#dbase=no` suffix.
///
/// ```
/// use changeprobe::tracer::short_attribute_name;
///
/// assert_eq!(short_attribute_name("tango://host:10000/sys/tg_test/1/State#dbase=no"), "State");
/// assert_eq!(short_attribute_name("state"), "state");
/// ```
#[must_use]
pub fn short_attribute_name(raw: &str) -> &str {
    let last = raw.rsplit('/').next().unwrap_or(raw);
    last.strip_suffix(NO_DATABASE_SUFFIX).unwrap_or(last)
}

/// Handle of one subscription on an [`EventSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceSubscriptionId(Uuid);

impl SourceSubscriptionId {
    /// Create a new random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SourceSubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceSubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Callback receiving raw notifications, on whatever thread the source
/// delivers them.
pub type NotificationCallback = Arc<dyn Fn(RawNotification) + Send + Sync>;

/// A system that delivers attribute change notifications.
///
/// Implementations must deliver the current value of the attribute right
/// after a successful subscription (a change subscription always reports
/// the latest change first), then one notification per change.
pub trait EventSource: Send + Sync {
    /// Start delivering changes of `source_id`/`attribute` to `callback`.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::SubscriptionFailed` if the source cannot
    /// provide change notifications for that attribute.
    fn subscribe(
        &self,
        source_id: &str,
        attribute: &str,
        callback: NotificationCallback,
    ) -> Result<SourceSubscriptionId, SourceError>;

    /// Stop a subscription. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns a `SourceError` if the source failed to release it.
    fn unsubscribe(&self, id: SourceSubscriptionId) -> Result<(), SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_strips_path_and_suffix() {
        assert_eq!(short_attribute_name("sys/tg_test/1/double_scalar"), "double_scalar");
        assert_eq!(short_attribute_name("State#dbase=no"), "State");
        assert_eq!(short_attribute_name(""), "");
    }

    #[test]
    fn value_notification_becomes_event() {
        let event = RawNotification::value("sys/tg_test/1", "sys/tg_test/1/State", "ON").into_event(true);
        assert_eq!(event.source_id(), "sys/tg_test/1");
        assert_eq!(event.attribute(), "State");
        assert_eq!(event.value(), &Value::String("ON".to_string()));
        assert!(!event.is_error());
    }

    #[test]
    fn raw_attribute_kept_without_normalization() {
        let event = RawNotification::value("dev", "dev/attr#dbase=no", 1).into_event(false);
        assert_eq!(event.attribute(), "dev/attr#dbase=no");
    }

    #[test]
    fn error_notification_becomes_error_event() {
        let event = RawNotification::error("dev", "attr", "API_EventTimeout").into_event(true);
        assert!(event.is_error());
        assert_eq!(event.error_message(), Some("API_EventTimeout"));
        assert!(event.value().is_null());
    }
}
