//! In-process event source.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::SourceError;
use crate::value::Value;

use super::source::{EventSource, NotificationCallback, RawNotification, SourceSubscriptionId};

type ChannelKey = (String, String);

fn channel_key(source_id: &str, attribute: &str) -> ChannelKey {
    (source_id.to_string(), attribute.to_lowercase())
}

/// An [`EventSource`] living in the test process.
///
/// Remembers the current value of every attribute it emitted and delivers
/// it to new subscribers right away, like a change-event subscription
/// would. Notifications are delivered synchronously on the thread calling
/// [`emit`](Self::emit), with the attribute spelled fully qualified as
/// `"{source_id}/{attribute}"`.
///
/// ```
/// use std::sync::Arc;
/// use changeprobe::tracer::{EventTracer, InMemorySource};
///
/// let source = Arc::new(InMemorySource::new());
/// source.set_value("sys/tg_test/1", "State", "OFF");
///
/// let tracer = EventTracer::new(source.clone());
/// tracer.subscribe_event("sys/tg_test/1", "State").unwrap();
/// source.emit("sys/tg_test/1", "State", "ON");
/// assert_eq!(tracer.events().len(), 2);
/// ```
#[derive(Default)]
pub struct InMemorySource {
    state: Mutex<SourceState>,
}

#[derive(Default)]
struct SourceState {
    current: HashMap<ChannelKey, Value>,
    refused: HashMap<ChannelKey, String>,
    subscriptions: Vec<Registration>,
}

#[derive(Clone)]
struct Registration {
    id: SourceSubscriptionId,
    key: ChannelKey,
    source_id: String,
    attribute: String,
    callback: NotificationCallback,
}

impl Registration {
    fn notification(&self, value: Option<&Value>, error: Option<&str>) -> RawNotification {
        RawNotification {
            source_id: self.source_id.clone(),
            attribute: format!("{}/{}", self.source_id, self.attribute),
            value: value.cloned(),
            error: error.map(str::to_string),
        }
    }
}

impl InMemorySource {
    /// Create a source with no attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the current value without notifying anybody.
    pub fn set_value(&self, source_id: &str, attribute: &str, value: impl Into<Value>) {
        self.lock()
            .current
            .insert(channel_key(source_id, attribute), value.into());
    }

    /// The current value of an attribute, if one was set or emitted.
    #[must_use]
    pub fn current_value(&self, source_id: &str, attribute: &str) -> Option<Value> {
        self.lock()
            .current
            .get(&channel_key(source_id, attribute))
            .cloned()
    }

    /// Make future subscriptions to an attribute fail with `reason`.
    pub fn refuse_subscriptions(&self, source_id: &str, attribute: &str, reason: impl Into<String>) {
        self.lock()
            .refused
            .insert(channel_key(source_id, attribute), reason.into());
    }

    /// Change an attribute and notify its subscribers on this thread.
    pub fn emit(&self, source_id: &str, attribute: &str, value: impl Into<Value>) {
        let value = value.into();
        let key = channel_key(source_id, attribute);
        let targets = {
            let mut state = self.lock();
            state.current.insert(key.clone(), value.clone());
            Self::targets(&state, &key)
        };
        for registration in targets {
            (registration.callback)(registration.notification(Some(&value), None));
        }
    }

    /// Report an error on an attribute to its subscribers on this thread.
    ///
    /// The current value is left untouched.
    pub fn emit_error(&self, source_id: &str, attribute: &str, message: &str) {
        let key = channel_key(source_id, attribute);
        let targets = Self::targets(&self.lock(), &key);
        for registration in targets {
            (registration.callback)(registration.notification(None, Some(message)));
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    fn targets(state: &SourceState, key: &ChannelKey) -> Vec<Registration> {
        state
            .subscriptions
            .iter()
            .filter(|r| &r.key == key)
            .cloned()
            .collect()
    }

    /// Channels that currently have at least one subscriber.
    #[must_use]
    pub fn subscribed_channels(&self) -> HashSet<(String, String)> {
        self.lock()
            .subscriptions
            .iter()
            .map(|r| r.key.clone())
            .collect()
    }
}

impl EventSource for InMemorySource {
    fn subscribe(
        &self,
        source_id: &str,
        attribute: &str,
        callback: NotificationCallback,
    ) -> Result<SourceSubscriptionId, SourceError> {
        let key = channel_key(source_id, attribute);
        let (registration, current) = {
            let mut state = self.lock();
            if let Some(reason) = state.refused.get(&key) {
                return Err(SourceError::SubscriptionFailed {
                    source_id: source_id.to_string(),
                    attribute: attribute.to_string(),
                    reason: reason.clone(),
                });
            }
            let registration = Registration {
                id: SourceSubscriptionId::new(),
                key: key.clone(),
                source_id: source_id.to_string(),
                attribute: attribute.to_string(),
                callback,
            };
            state.subscriptions.push(registration.clone());
            (registration, state.current.get(&key).cloned())
        };

        if let Some(value) = current {
            (registration.callback)(registration.notification(Some(&value), None));
        }
        Ok(registration.id)
    }

    fn unsubscribe(&self, id: SourceSubscriptionId) -> Result<(), SourceError> {
        self.lock().subscriptions.retain(|r| r.id != id);
        Ok(())
    }
}
