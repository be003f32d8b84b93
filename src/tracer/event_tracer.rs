//! The tracer: subscribes to sources and records everything they emit.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::TracerConfig;
use crate::error::{ProbeResult, UsageError};
use crate::event::{same_attribute_name, Event};
use crate::predicate::EventPredicate;
use crate::query::{NEventsMatch, NEventsMatchQuery, Query, QueryMatcher, QueryStatus};
use crate::storage::EventLog;
use crate::timeout::Timeout;
use crate::typed::{EnumLabels, EventEnumMapper};

use super::source::{EventSource, NotificationCallback, SourceSubscriptionId};

struct TracedChannel {
    source_id: String,
    attribute: String,
    id: SourceSubscriptionId,
}

impl TracedChannel {
    fn is(&self, source_id: &str, attribute: &str) -> bool {
        self.source_id == source_id && same_attribute_name(&self.attribute, attribute)
    }
}

/// Records change notifications from an [`EventSource`] into an
/// [`EventLog`] and evaluates queries against it.
///
/// Subscriptions are released by [`unsubscribe_all`](Self::unsubscribe_all)
/// or when the tracer is dropped. Events already recorded stay in the log.
///
/// Events of attributes mapped to an [`EnumLabels`] table are typed on
/// receipt, so listings and failure reports show state names.
pub struct EventTracer {
    log: Arc<EventLog>,
    source: Arc<dyn EventSource>,
    config: TracerConfig,
    enum_mapper: Arc<EventEnumMapper>,
    channels: Mutex<Vec<TracedChannel>>,
}

impl EventTracer {
    /// Create a tracer with the default configuration.
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self::with_config(source, TracerConfig::default())
    }

    /// Create a tracer with an explicit configuration.
    pub fn with_config(source: Arc<dyn EventSource>, config: TracerConfig) -> Self {
        let enum_mapper = EventEnumMapper::from_mapping(config.event_enum_mapping.clone());
        Self {
            log: Arc::new(EventLog::new()),
            source,
            config,
            enum_mapper: Arc::new(enum_mapper),
            channels: Mutex::new(Vec::new()),
        }
    }

    fn channels(&self) -> MutexGuard<'_, Vec<TracedChannel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// The underlying event log.
    #[must_use]
    pub const fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    /// Type the events of `attribute` received from now on with `labels`.
    pub fn map_attribute_to_enum(&self, attribute: impl Into<String>, labels: EnumLabels) {
        self.enum_mapper.map_attribute_to_enum(attribute, labels);
    }

    /// The attribute to enum mapping applied on receipt.
    #[must_use]
    pub fn enum_mapper(&self) -> &EventEnumMapper {
        &self.enum_mapper
    }

    /// Start recording changes of `source_id`/`attribute`.
    ///
    /// The source reports the current value right away, so the log gains
    /// one event per successful subscription (when a value exists).
    /// Subscribing twice to the same attribute (case-insensitive) is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::EmptyIdentifier` for an empty source id or
    /// attribute, or the source's `SourceError` if it refused.
    pub fn subscribe_event(&self, source_id: &str, attribute: &str) -> ProbeResult<()> {
        if source_id.is_empty() {
            return Err(UsageError::EmptyIdentifier { field: "source_id" }.into());
        }
        if attribute.is_empty() {
            return Err(UsageError::EmptyIdentifier { field: "attribute" }.into());
        }

        let mut channels = self.channels();
        if channels.iter().any(|c| c.is(source_id, attribute)) {
            tracing::debug!(source_id, attribute, "already subscribed");
            return Ok(());
        }

        let log = Arc::clone(&self.log);
        let mapper = Arc::clone(&self.enum_mapper);
        let normalize = self.config.normalize_attribute_names;
        let callback: NotificationCallback = Arc::new(move |notification| {
            log.store(mapper.typed_event(notification.into_event(normalize)));
        });

        let id = self.source.subscribe(source_id, attribute, callback)?;
        tracing::info!(source_id, attribute, subscription = %id, "subscribed to change events");
        channels.push(TracedChannel {
            source_id: source_id.to_string(),
            attribute: attribute.to_string(),
            id,
        });
        Ok(())
    }

    /// Release every subscription this tracer made.
    ///
    /// Failures are logged and do not stop the remaining releases.
    pub fn unsubscribe_all(&self) {
        let channels = std::mem::take(&mut *self.channels());
        for channel in &channels {
            if let Err(err) = self.source.unsubscribe(channel.id) {
                tracing::warn!(
                    source_id = %channel.source_id,
                    attribute = %channel.attribute,
                    error = %err,
                    "failed to unsubscribe from change events"
                );
            }
        }
        tracing::debug!(released = channels.len(), "unsubscribed from all change events");
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.channels().len()
    }

    /// Copy of all recorded events, in receipt order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.log.events()
    }

    /// Forget every recorded event.
    pub fn clear_events(&self) {
        self.log.clear();
    }

    /// Evaluate a query against the recorded and future events.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::AlreadyEvaluated` if the query was evaluated
    /// before.
    pub fn evaluate<M>(&self, query: &Arc<Query<M>>) -> ProbeResult<QueryStatus>
    where
        M: QueryMatcher + 'static,
    {
        self.log.evaluate(query)
    }

    /// Wait for `target_n_events` events satisfying `predicate` and return
    /// the matching events found (possibly fewer, on timeout).
    ///
    /// # Errors
    ///
    /// Returns `UsageError::InvalidEventCount` if `target_n_events` is 0.
    pub fn query_events(
        &self,
        predicate: EventPredicate,
        timeout: impl Into<Timeout>,
        target_n_events: usize,
    ) -> ProbeResult<Vec<Event>> {
        if target_n_events == 0 {
            return Err(UsageError::InvalidEventCount {
                name: "target_n_events",
                value: target_n_events,
            }
            .into());
        }
        let matcher = NEventsMatch::from_event_predicate(predicate).with_target(target_n_events);
        let query = Arc::new(NEventsMatchQuery::with_timeout(matcher, timeout));
        self.evaluate(&query)?;
        Ok(query.matching_events())
    }
}

impl Drop for EventTracer {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

impl fmt::Debug for EventTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTracer")
            .field("log", &self.log)
            .field("config", &self.config)
            .field("enum_mapper", &self.enum_mapper)
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}
