//! Observer contract for the event log.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Event;

/// Something that wants to see the event list every time it changes.
///
/// Each call receives a full snapshot of the log (old and new events, in
/// receipt order), never a delta. Calls happen synchronously on the
/// thread that changed the log, outside the log's own lock, so an
/// implementation may read the log again but must be prepared to run on
/// any producer thread.
///
/// # Safety Considerations
/// - A panic inside `on_events_change` is caught and logged by the log;
///   other observers are still notified.
/// - Do not unsubscribe an observer from another thread while holding a
///   lock its callback needs: unsubscribe waits for an in-flight callback
///   of that observer to finish.
/// - Callbacks into one registration are serialized across threads. Two
///   observers that both store events from inside their callbacks, on
///   different producer threads, can wait on each other.
pub trait EventObserver: Send + Sync {
    /// Handle a change of the event list.
    fn on_events_change(&self, events: &[Event]);
}

/// Identifies one observer registration on an event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
