//! Typed predicates over received events.
//!
//! Two shapes are used throughout the crate:
//! - [`EventPredicate`] looks at one event in isolation (custom matchers,
//!   early-stop sentinels);
//! - [`HistoryPredicate`] also sees the full event list, so it can relate
//!   an event to the ones received before it (previous-value checks).

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{ProbeError, ProbeResult, UsageError};
use crate::event::Event;
use crate::value::Value;

/// Predicate over a single event.
pub type EventPredicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Predicate over an event and the complete list it belongs to.
pub type HistoryPredicate = Arc<dyn Fn(&Event, &[Event]) -> bool + Send + Sync>;

/// Box a closure as an [`EventPredicate`].
pub fn event_predicate<F>(f: F) -> EventPredicate
where
    F: Fn(&Event) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Box a closure as a [`HistoryPredicate`].
pub fn history_predicate<F>(f: F) -> HistoryPredicate
where
    F: Fn(&Event, &[Event]) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Lift a single-event predicate to the history shape.
#[must_use]
pub fn ignore_history(predicate: EventPredicate) -> HistoryPredicate {
    Arc::new(move |event, _| predicate(event))
}

/// The immediate predecessor of `event` on the same source and attribute.
///
/// Among the events of `events` that share `event`'s source and attribute
/// and were received strictly earlier, returns the most recent one. When
/// several candidates share that receipt time, the first in list order
/// wins.
#[must_use]
pub fn previous_event<'a>(event: &Event, events: &'a [Event]) -> Option<&'a Event> {
    let mut previous: Option<&'a Event> = None;
    for candidate in events {
        if !candidate.same_channel(event) || candidate.receipt_time() >= event.receipt_time() {
            continue;
        }
        if previous.map_or(true, |p| candidate.receipt_time() > p.receipt_time()) {
            previous = Some(candidate);
        }
    }
    previous
}

/// Whether the immediate predecessor of `event` carried `expected`.
///
/// An event without predecessor never matches.
#[must_use]
pub fn event_has_previous_value(event: &Event, events: &[Event], expected: &Value) -> bool {
    previous_event(event, events).is_some_and(|previous| previous.has_value(expected))
}

/// Matches events from the given source.
pub fn source_is(source_id: impl Into<String>) -> EventPredicate {
    let source_id = source_id.into();
    Arc::new(move |event| event.has_source(&source_id))
}

/// Matches events on the given attribute (case-insensitive).
pub fn attribute_is(attribute: impl Into<String>) -> EventPredicate {
    let attribute = attribute.into();
    Arc::new(move |event| event.has_attribute(&attribute))
}

/// Matches events carrying `value` (or, on typed events, a string naming
/// the value's label).
pub fn value_is(value: impl Into<Value>) -> EventPredicate {
    let value = value.into();
    Arc::new(move |event| event.has_value(&value))
}

/// Matches error notifications.
#[must_use]
pub fn is_error_event() -> EventPredicate {
    Arc::new(Event::is_error)
}

const REGEX_CACHE_MAX: usize = 256;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, regex::Regex>>> = OnceLock::new();

fn cached_regex(pattern: &str) -> ProbeResult<regex::Regex> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache
            .read()
            .map_err(|_| ProbeError::internal("regex cache lock poisoned"))?;
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = regex::Regex::new(pattern).map_err(|e| UsageError::InvalidPattern {
        reason: format!("invalid regex '{pattern}': {e}"),
    })?;

    let mut guard = cache
        .write()
        .map_err(|_| ProbeError::internal("regex cache lock poisoned"))?;
    if guard.len() >= REGEX_CACHE_MAX {
        guard.clear();
    }
    guard.insert(pattern.to_string(), compiled.clone());
    Ok(compiled)
}

/// Matches events whose value text matches a regular expression.
///
/// String values are matched without quotes, other values through their
/// display form. Error notifications match on their error message.
///
/// # Errors
///
/// Returns `UsageError::InvalidPattern` if `pattern` is not a valid regex.
pub fn attribute_value_matches(pattern: &str) -> ProbeResult<EventPredicate> {
    let re = cached_regex(pattern)?;
    Ok(Arc::new(move |event| match event.error_message() {
        Some(message) => re.is_match(message),
        None => re.is_match(&event.value().match_text()),
    }))
}

/// Matches when every predicate matches (true for an empty list).
#[must_use]
pub fn all_of(predicates: Vec<EventPredicate>) -> EventPredicate {
    Arc::new(move |event| predicates.iter().all(|p| p(event)))
}

/// Matches when any predicate matches (false for an empty list).
#[must_use]
pub fn any_of(predicates: Vec<EventPredicate>) -> EventPredicate {
    Arc::new(move |event| predicates.iter().any(|p| p(event)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn at(base: Instant, ms: u64, source: &str, attr: &str, value: i64) -> Event {
        Event::received_at(source, attr, value, base + Duration::from_millis(ms))
    }

    #[test]
    fn previous_event_picks_nearest_earlier_on_same_channel() {
        let base = Instant::now();
        let events = vec![
            at(base, 0, "a", "attr", 1),
            at(base, 10, "a", "attr", 2),
            at(base, 15, "b", "attr", 99),
            at(base, 18, "a", "other", 98),
            at(base, 20, "a", "attr", 3),
            at(base, 30, "a", "attr", 4),
        ];

        let previous = previous_event(&events[4], &events).unwrap();
        assert_eq!(previous.value(), &Value::Int(2));
        assert!(previous_event(&events[0], &events).is_none());
    }

    #[test]
    fn previous_event_ignores_later_events_even_if_listed_first() {
        let base = Instant::now();
        let events = vec![at(base, 50, "a", "attr", 9), at(base, 10, "a", "attr", 1)];
        assert!(previous_event(&events[1], &events).is_none());
        assert_eq!(previous_event(&events[0], &events).unwrap().value(), &Value::Int(1));
    }

    #[test]
    fn previous_event_matches_attribute_case_insensitively() {
        let base = Instant::now();
        let events = vec![at(base, 0, "a", "State", 1), at(base, 5, "a", "state", 2)];
        assert!(event_has_previous_value(&events[1], &events, &Value::Int(1)));
    }

    #[test]
    fn no_predecessor_never_matches() {
        let ev = Event::new("a", "attr", 1);
        let events = vec![ev.clone()];
        assert!(!event_has_previous_value(&ev, &events, &Value::Int(1)));
        assert!(!event_has_previous_value(&ev, &events, &Value::Null));
    }

    #[test]
    fn attribute_value_matches_uses_unquoted_text() {
        let pred = attribute_value_matches("^ON$").unwrap();
        assert!(pred(&Event::new("a", "state", "ON")));
        assert!(!pred(&Event::new("a", "state", "OFF")));

        let code = attribute_value_matches("error code 3").unwrap();
        assert!(code(&Event::error("a", "result", "error code 3: exception")));
    }

    #[test]
    fn attribute_value_matches_rejects_bad_pattern() {
        let err = attribute_value_matches("(unclosed").err().unwrap();
        assert!(err.is_usage());
    }

    #[test]
    fn combinators() {
        let ev = Event::new("dev", "state", "ON");
        assert!(all_of(vec![source_is("dev"), attribute_is("STATE"), value_is("ON")])(&ev));
        assert!(!all_of(vec![source_is("dev"), value_is("OFF")])(&ev));
        assert!(any_of(vec![value_is("OFF"), value_is("ON")])(&ev));
        assert!(!any_of(vec![])(&ev));
        assert!(all_of(vec![])(&ev));
        assert!(!is_error_event()(&ev));
    }

    #[test]
    fn ignore_history_forwards_single_event_predicate() {
        let pred = ignore_history(value_is(1));
        let ev = Event::new("a", "attr", 1);
        assert!(pred(&ev, &[]));
    }
}
