//! Append-only, observable event log.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

use crate::error::ProbeResult;
use crate::event::Event;
use crate::query::{Query, QueryMatcher, QueryStatus};

use super::traits::{EventObserver, SubscriptionId};

/// Thread-safe store of every received event.
///
/// - `store` appends under the log's mutex, takes a copy of the full
///   list, releases the mutex and only then calls every subscribed
///   observer, in subscription order, with that copy. All observers of
///   one `store` call see the same snapshot.
/// - Readers always get a copy; the internal list is never handed out.
/// - Observers are held weakly: the log never keeps an observer alive.
///
/// ```
/// use changeprobe::{Event, EventLog};
///
/// let log = EventLog::new();
/// let snapshot = log.store(Event::new("sys/tg_test/1", "state", "ON"));
/// assert_eq!(snapshot.len(), 1);
/// assert_eq!(log.events(), snapshot);
/// ```
pub struct EventLog {
    inner: Mutex<LogState>,
}

#[derive(Default)]
struct LogState {
    events: Vec<Event>,
    subscribers: Vec<Subscriber>,
}

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    observer: Weak<dyn EventObserver>,
    gate: Arc<CallbackGate>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LogState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event and notify every observer.
    ///
    /// Returns the snapshot the observers received.
    pub fn store(&self, event: Event) -> Vec<Event> {
        let (snapshot, subscribers) = {
            let mut state = self.lock();
            state.events.push(event);
            (state.events.clone(), state.subscribers.clone())
        };

        tracing::trace!(events = snapshot.len(), observers = subscribers.len(), "event stored");
        self.notify(&subscribers, &snapshot);
        snapshot
    }

    /// Remove every event and notify observers with an empty list.
    pub fn clear(&self) {
        let subscribers = {
            let mut state = self.lock();
            state.events.clear();
            state.subscribers.clone()
        };

        tracing::debug!(observers = subscribers.len(), "event log cleared");
        self.notify(&subscribers, &[]);
    }

    /// A copy of all stored events, in receipt order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// Whether no event has been stored (or the log was cleared).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Number of registered observers that are still alive.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|s| s.observer.strong_count() > 0)
            .count()
    }

    /// Register an observer and immediately deliver the current snapshot
    /// to it, on the calling thread.
    ///
    /// Subscribing the same observer twice creates two registrations.
    pub fn subscribe<O>(&self, observer: &Arc<O>) -> SubscriptionId
    where
        O: EventObserver + 'static,
    {
        let weak = Arc::downgrade(observer);
        let weak: Weak<dyn EventObserver> = weak;
        let subscriber = Subscriber {
            id: SubscriptionId::new(),
            observer: weak,
            gate: Arc::new(CallbackGate::new()),
        };

        let snapshot = {
            let mut state = self.lock();
            state.subscribers.push(subscriber.clone());
            state.events.clone()
        };

        tracing::debug!(subscription = %subscriber.id, events = snapshot.len(), "observer subscribed");
        self.notify(std::slice::from_ref(&subscriber), &snapshot);
        subscriber.id
    }

    /// Remove a registration.
    ///
    /// Once this returns, the observer receives no further callbacks from
    /// this registration. A callback of that observer already running on
    /// another thread is waited for. Returns false if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut state = self.lock();
            let pos = state.subscribers.iter().position(|s| s.id == id);
            pos.map(|pos| state.subscribers.remove(pos))
        };

        let Some(subscriber) = removed else {
            return false;
        };
        subscriber.gate.close();
        tracing::debug!(subscription = %id, "observer unsubscribed");
        true
    }

    /// Evaluate a query against this log.
    ///
    /// Blocks until the query's criterion is met or its timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::AlreadyEvaluated` if the query was evaluated
    /// before.
    pub fn evaluate<M>(&self, query: &Arc<Query<M>>) -> ProbeResult<QueryStatus>
    where
        M: QueryMatcher + 'static,
    {
        query.evaluate(self)
    }

    fn notify(&self, subscribers: &[Subscriber], events: &[Event]) {
        let mut dead = Vec::new();

        for subscriber in subscribers {
            let Some(observer) = subscriber.observer.upgrade() else {
                dead.push(subscriber.id);
                continue;
            };
            if !subscriber.gate.enter() {
                continue;
            }

            let result = catch_unwind(AssertUnwindSafe(|| observer.on_events_change(events)));
            subscriber.gate.exit();

            if result.is_err() {
                tracing::error!(
                    subscription = %subscriber.id,
                    "event observer panicked, continuing with remaining observers"
                );
            }
        }

        if !dead.is_empty() {
            self.lock().subscribers.retain(|s| !dead.contains(&s.id));
        }
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("EventLog")
            .field("events.len()", &state.events.len())
            .field("subscribers.len()", &state.subscribers.len())
            .finish()
    }
}

/// Serializes callbacks into one observer registration and lets
/// `unsubscribe` wait for an in-flight callback.
///
/// Re-entry from the thread already running the callback is allowed, so
/// an observer may store events from inside its own callback.
struct CallbackGate {
    state: Mutex<GateState>,
    idle: Condvar,
}

struct GateState {
    active: bool,
    running: Option<ThreadId>,
    depth: usize,
}

impl CallbackGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                active: true,
                running: None,
                depth: 0,
            }),
            idle: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.lock();
        loop {
            if !state.active {
                return false;
            }
            match state.running {
                None => {
                    state.running = Some(me);
                    state.depth = 1;
                    return true;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return true;
                }
                Some(_) => {
                    state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn exit(&self) {
        let mut state = self.lock();
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.running = None;
            self.idle.notify_all();
        }
    }

    fn close(&self) {
        let me = thread::current().id();
        let mut state = self.lock();
        state.active = false;
        while matches!(state.running, Some(owner) if owner != me) {
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}
