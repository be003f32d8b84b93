//! Live logging of change events through `tracing`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::TracerConfig;
use crate::error::{ProbeResult, UsageError};
use crate::event::Event;
use crate::predicate::EventPredicate;
use crate::typed::{EnumLabels, EventEnumMapper};

use super::source::{EventSource, NotificationCallback, SourceSubscriptionId};

/// Builds the log line for one event.
pub type MessageBuilder = Arc<dyn Fn(&Event) -> String + Send + Sync>;

/// The default log line: when, who, and the new value.
#[must_use]
pub fn default_message(event: &Event) -> String {
    match event.error_message() {
        Some(error) => format!(
            "EVENT_LOGGER: At {}, {} {} reported error {error}.",
            event.receipt_wall_time(),
            event.source_id(),
            event.attribute(),
        ),
        None => format!(
            "EVENT_LOGGER: At {}, {} {} changed to {}.",
            event.receipt_wall_time(),
            event.source_id(),
            event.attribute(),
            event.value_text(),
        ),
    }
}

/// Which events of a channel get logged, and how.
///
/// By default every event is logged with [`default_message`].
#[derive(Clone)]
pub struct LogRule {
    filter: Option<EventPredicate>,
    message: MessageBuilder,
}

impl Default for LogRule {
    fn default() -> Self {
        Self {
            filter: None,
            message: Arc::new(default_message),
        }
    }
}

impl LogRule {
    /// Log everything with the default message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only log events satisfying `filter`.
    #[must_use]
    pub fn filter(mut self, filter: EventPredicate) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Build log lines with `message` instead of the default.
    #[must_use]
    pub fn message(mut self, message: MessageBuilder) -> Self {
        self.message = message;
        self
    }

    /// The log line for `event`, or `None` if the filter rejects it.
    #[must_use]
    pub fn render(&self, event: &Event) -> Option<String> {
        if self.filter.as_ref().is_some_and(|filter| !filter(event)) {
            return None;
        }
        Some((self.message)(event))
    }

    fn emit(&self, event: &Event) {
        let Some(line) = self.render(event) else {
            return;
        };
        if event.is_error() {
            tracing::error!(source_id = %event.source_id(), attribute = %event.attribute(), "{line}");
        } else {
            tracing::info!(source_id = %event.source_id(), attribute = %event.attribute(), "{line}");
        }
    }
}

impl fmt::Debug for LogRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRule")
            .field("filtered", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

/// Logs change events of chosen attributes as they arrive, without
/// recording them.
///
/// Events are written with `tracing::info!`, error notifications with
/// `tracing::error!`, on the thread the source delivers them. Each call
/// to [`log_events`](Self::log_events) adds a subscription, so one channel
/// may be logged by several rules.
///
/// ```
/// use std::sync::Arc;
/// use changeprobe::tracer::{EventLogger, InMemorySource, LogRule};
/// use changeprobe::predicate::value_is;
///
/// let source = Arc::new(InMemorySource::new());
/// let logger = EventLogger::new(source.clone());
/// logger.log_events("sys/tg_test/1", "State", LogRule::new()).unwrap();
/// logger
///     .log_events("sys/tg_test/1", "State", LogRule::new().filter(value_is("FAULT")))
///     .unwrap();
/// source.emit("sys/tg_test/1", "State", "ON");
/// assert_eq!(logger.subscription_count(), 2);
/// ```
pub struct EventLogger {
    source: Arc<dyn EventSource>,
    normalize_attribute_names: bool,
    enum_mapper: Arc<EventEnumMapper>,
    subscriptions: Mutex<Vec<SourceSubscriptionId>>,
}

impl EventLogger {
    /// A logger with the default configuration.
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self::with_config(source, &TracerConfig::default())
    }

    /// A logger honouring the attribute normalisation and enum mapping of
    /// `config`.
    pub fn with_config(source: Arc<dyn EventSource>, config: &TracerConfig) -> Self {
        Self {
            source,
            normalize_attribute_names: config.normalize_attribute_names,
            enum_mapper: Arc::new(EventEnumMapper::from_mapping(config.event_enum_mapping.clone())),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<SourceSubscriptionId>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the events of `attribute` with state labels from `labels`.
    pub fn map_attribute_to_enum(&self, attribute: impl Into<String>, labels: EnumLabels) {
        self.enum_mapper.map_attribute_to_enum(attribute, labels);
    }

    /// Log the changes of `source_id`/`attribute` according to `rule`.
    ///
    /// The source reports the current value right away, so that value is
    /// logged first.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::EmptyIdentifier` for an empty source id or
    /// attribute, or the source's `SourceError` if it refused.
    pub fn log_events(&self, source_id: &str, attribute: &str, rule: LogRule) -> ProbeResult<()> {
        if source_id.is_empty() {
            return Err(UsageError::EmptyIdentifier { field: "source_id" }.into());
        }
        if attribute.is_empty() {
            return Err(UsageError::EmptyIdentifier { field: "attribute" }.into());
        }

        let mapper = Arc::clone(&self.enum_mapper);
        let normalize = self.normalize_attribute_names;
        let callback: NotificationCallback = Arc::new(move |notification| {
            rule.emit(&mapper.typed_event(notification.into_event(normalize)));
        });

        let id = self.source.subscribe(source_id, attribute, callback)?;
        tracing::debug!(source_id, attribute, subscription = %id, "logging change events");
        self.subscriptions().push(id);
        Ok(())
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions().len()
    }

    /// Stop logging. Failures are logged and do not stop the remaining
    /// releases.
    pub fn unsubscribe_all(&self) {
        let ids = std::mem::take(&mut *self.subscriptions());
        for id in &ids {
            if let Err(err) = self.source.unsubscribe(*id) {
                tracing::warn!(subscription = %id, error = %err, "failed to stop logging change events");
            }
        }
        tracing::debug!(released = ids.len(), "event logger unsubscribed");
    }
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

impl fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLogger")
            .field("normalize_attribute_names", &self.normalize_attribute_names)
            .field("enum_mapper", &self.enum_mapper)
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{event_predicate, value_is};
    use crate::tracer::InMemorySource;

    fn recording_rule(lines: &Arc<Mutex<Vec<String>>>) -> LogRule {
        let lines = Arc::clone(lines);
        LogRule::new().message(Arc::new(move |event: &Event| {
            let line = format!("{} -> {}", event.attribute(), event.value());
            lines.lock().unwrap().push(line.clone());
            line
        }))
    }

    #[test]
    fn default_message_names_source_attribute_and_value() {
        let line = default_message(&Event::new("sys/tg_test/1", "State", "ON"));
        assert!(line.starts_with("EVENT_LOGGER: At "));
        assert!(line.ends_with(", sys/tg_test/1 State changed to \"ON\"."));

        let typed = Event::new("dev", "obsState", 2)
            .with_labels(Arc::new(EnumLabels::new("ObsState").with_label(2, "IDLE")));
        assert!(default_message(&typed).ends_with("changed to ObsState.IDLE."));

        let failed = Event::error("dev", "State", "API_EventTimeout");
        assert!(default_message(&failed).ends_with("reported error API_EventTimeout."));
    }

    #[test]
    fn filter_skips_the_message_builder() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let rule = recording_rule(&lines).filter(event_predicate(|e| !e.value().is_null()));
        assert_eq!(rule.render(&Event::new("dev", "attr", 1)).as_deref(), Some("attr -> 1"));
        assert_eq!(rule.render(&Event::new("dev", "attr", crate::Value::Null)), None);
        assert_eq!(lines.lock().unwrap().len(), 1);
    }

    #[test]
    fn logs_current_value_then_each_change() {
        let source = Arc::new(InMemorySource::new());
        source.set_value("dev", "attr", 0);
        let logger = EventLogger::new(source.clone());
        let lines = Arc::new(Mutex::new(Vec::new()));
        logger.log_events("dev", "attr", recording_rule(&lines)).unwrap();

        source.emit("dev", "attr", 1);
        source.emit("dev", "attr", 2);
        assert_eq!(*lines.lock().unwrap(), vec!["attr -> 0", "attr -> 1", "attr -> 2"]);
    }

    #[test]
    fn several_rules_on_one_channel() {
        let source = Arc::new(InMemorySource::new());
        let logger = EventLogger::new(source.clone());
        let all = Arc::new(Mutex::new(Vec::new()));
        let faults = Arc::new(Mutex::new(Vec::new()));
        logger.log_events("dev", "state", recording_rule(&all)).unwrap();
        logger
            .log_events("dev", "state", recording_rule(&faults).filter(value_is("FAULT")))
            .unwrap();

        source.emit("dev", "state", "ON");
        source.emit("dev", "state", "FAULT");
        assert_eq!(all.lock().unwrap().len(), 2);
        assert_eq!(*faults.lock().unwrap(), vec!["state -> \"FAULT\""]);
    }

    #[test]
    fn enum_mapping_reaches_the_message_builder() {
        let source = Arc::new(InMemorySource::new());
        let logger = EventLogger::new(source.clone());
        logger.map_attribute_to_enum("obsState", EnumLabels::new("ObsState").with_label(2, "IDLE"));
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        logger
            .log_events(
                "dev",
                "obsState",
                LogRule::new().message(Arc::new(move |event: &Event| {
                    let line = default_message(event);
                    sink.lock().unwrap().push(line.clone());
                    line
                })),
            )
            .unwrap();

        source.emit("dev", "obsState", 2);
        assert!(lines.lock().unwrap()[0].ends_with("changed to ObsState.IDLE."));
    }

    #[test]
    fn unsubscribe_all_stops_logging() {
        let source = Arc::new(InMemorySource::new());
        let logger = EventLogger::new(source.clone());
        let lines = Arc::new(Mutex::new(Vec::new()));
        logger.log_events("dev", "attr", recording_rule(&lines)).unwrap();
        assert!(logger.log_events("", "attr", LogRule::new()).unwrap_err().is_usage());

        logger.unsubscribe_all();
        source.emit("dev", "attr", 1);
        assert!(lines.lock().unwrap().is_empty());
        assert_eq!(source.subscription_count(), 0);

        logger.log_events("dev", "attr", LogRule::new()).unwrap();
        drop(logger);
        assert_eq!(source.subscription_count(), 0);
    }
}
