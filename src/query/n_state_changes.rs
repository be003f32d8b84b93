//! Matcher for attribute state changes.

use std::fmt;
use std::sync::Arc;

use crate::event::Event;
use crate::predicate::{event_has_previous_value, EventPredicate, HistoryPredicate};
use crate::value::Value;

use super::base::{EvaluationSummary, Query, QueryMatcher};
use super::n_events_match::NEventsMatch;

/// A query over [`NStateChanges`].
pub type NStateChangesQuery = Query<NStateChanges>;

/// Optional filters describing a state change.
///
/// Every unset filter matches anything. The previous-value filter is
/// special: when set, an event with no earlier event on the same source
/// and attribute never matches.
///
/// ```
/// use changeprobe::{Event, StateChangeCriteria};
///
/// let criteria = StateChangeCriteria::new()
///     .source("sys/tg_test/1")
///     .attribute("State")
///     .value("ON");
/// let event = Event::new("sys/tg_test/1", "state", "ON");
/// assert!(criteria.matches(&event, std::slice::from_ref(&event)));
/// ```
#[derive(Clone, Default)]
pub struct StateChangeCriteria {
    source_id: Option<String>,
    attribute: Option<String>,
    value: Option<Value>,
    previous_value: Option<Value>,
    custom: Option<EventPredicate>,
}

impl StateChangeCriteria {
    /// Criteria that match every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require this exact source id.
    #[must_use]
    pub fn source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Require this attribute (case-insensitive).
    #[must_use]
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Require this current value.
    #[must_use]
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Require the immediately preceding event to carry this value.
    #[must_use]
    pub fn previous_value(mut self, value: impl Into<Value>) -> Self {
        self.previous_value = Some(value.into());
        self
    }

    /// Require an additional custom predicate.
    #[must_use]
    pub fn custom(mut self, predicate: EventPredicate) -> Self {
        self.custom = Some(predicate);
        self
    }

    /// Whether `event`, within `events`, satisfies every set filter.
    #[must_use]
    pub fn matches(&self, event: &Event, events: &[Event]) -> bool {
        self.source_id.as_deref().map_or(true, |s| event.has_source(s))
            && self.attribute.as_deref().map_or(true, |a| event.has_attribute(a))
            && self.value.as_ref().map_or(true, |v| event.has_value(v))
            && self
                .previous_value
                .as_ref()
                .map_or(true, |prev| event_has_previous_value(event, events, prev))
            && self.custom.as_ref().map_or(true, |custom| custom(event))
    }

    /// The criteria as a history predicate.
    #[must_use]
    pub fn to_predicate(&self) -> HistoryPredicate {
        let criteria = self.clone();
        Arc::new(move |event, events| criteria.matches(event, events))
    }

    /// One-line summary of the set filters.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(source_id) = &self.source_id {
            parts.push(format!("source_id='{source_id}'"));
        }
        if let Some(attribute) = &self.attribute {
            parts.push(format!("attribute={attribute}"));
        }
        if let Some(value) = &self.value {
            parts.push(format!("value={value}"));
        }
        if let Some(previous) = &self.previous_value {
            parts.push(format!("previous_value={previous}"));
        }
        if self.custom.is_some() {
            parts.push("a custom matcher function is set".to_string());
        }
        if parts.is_empty() {
            "no criteria set".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl fmt::Debug for StateChangeCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateChangeCriteria")
            .field("source_id", &self.source_id)
            .field("attribute", &self.attribute)
            .field("value", &self.value)
            .field("previous_value", &self.previous_value)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// Succeeds once `target` distinct events satisfy a [`StateChangeCriteria`].
pub struct NStateChanges {
    criteria: StateChangeCriteria,
    inner: NEventsMatch,
}

impl NStateChanges {
    /// Look for one matching state change.
    #[must_use]
    pub fn new(criteria: StateChangeCriteria) -> Self {
        let inner = NEventsMatch::new(criteria.to_predicate());
        Self { criteria, inner }
    }

    /// Set how many distinct matches are needed (default 1).
    #[must_use]
    pub fn with_target(mut self, target: usize) -> Self {
        self.inner = self.inner.with_target(target);
        self
    }

    /// The filters this matcher applies.
    #[must_use]
    pub const fn criteria(&self) -> &StateChangeCriteria {
        &self.criteria
    }

    /// Events matched so far, in matching order.
    #[must_use]
    pub fn matching_events(&self) -> &[Event] {
        self.inner.matching_events()
    }
}

impl QueryMatcher for NStateChanges {
    fn evaluate_events(&mut self, events: &[Event]) {
        self.inner.evaluate_events(events);
    }

    fn succeeded(&self) -> bool {
        self.inner.succeeded()
    }

    fn describe_criteria(&self) -> String {
        format!(
            "{}\nState change criteria: {}",
            self.inner.describe_criteria(),
            self.criteria.describe()
        )
    }

    fn describe_results(&self, summary: &EvaluationSummary) -> String {
        self.inner.describe_results(summary)
    }

    fn matching_count(&self) -> Option<usize> {
        self.inner.matching_count()
    }
}

impl fmt::Debug for NStateChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NStateChanges")
            .field("criteria", &self.criteria)
            .field("inner", &self.inner)
            .finish()
    }
}

impl Query<NStateChanges> {
    /// Copy of the events matched so far.
    #[must_use]
    pub fn matching_events(&self) -> Vec<Event> {
        self.with_matcher(|m| m.matching_events().to_vec())
    }
}
