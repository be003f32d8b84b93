//! Early-stop wrapper: fail immediately when a sentinel event shows up.

use std::fmt;

use crate::event::Event;
use crate::predicate::EventPredicate;
use crate::storage::EventObserver;

use super::base::{EvaluationSummary, Query, QueryMatcher};

/// A query over an [`EarlyStop`] wrapper.
pub type EarlyStopQuery<M> = Query<EarlyStop<M>>;

/// Wraps another query and fails it as soon as any event satisfies a
/// sentinel predicate.
///
/// Every snapshot is scanned for the sentinel before the wrapped query
/// sees it. Once the sentinel fired, the wrapped query receives no
/// further updates. The wrapper succeeds iff the wrapped query succeeded
/// and the sentinel never fired.
///
/// The wrapped query is never evaluated on its own; only the wrapper's
/// timeout governs waiting.
pub struct EarlyStop<M> {
    wrapped: Query<M>,
    sentinel: EventPredicate,
    failing: Option<Event>,
}

impl<M: QueryMatcher> EarlyStop<M> {
    /// Wrap `wrapped` with a sentinel.
    #[must_use]
    pub fn new(wrapped: Query<M>, sentinel: EventPredicate) -> Self {
        Self {
            wrapped,
            sentinel,
            failing: None,
        }
    }

    /// The wrapped query.
    #[must_use]
    pub const fn wrapped(&self) -> &Query<M> {
        &self.wrapped
    }

    /// The event that fired the sentinel.
    #[must_use]
    pub const fn failing(&self) -> Option<&Event> {
        self.failing.as_ref()
    }

    fn fail_reason(&self, summary: &EvaluationSummary) -> String {
        if let Some(event) = &self.failing {
            return format!("Event {event} triggered an early stop.");
        }
        let timed_out = summary
            .evaluation_duration
            .is_some_and(|elapsed| elapsed >= summary.initial_timeout);
        if timed_out {
            "The query failed because of a timeout.".to_string()
        } else {
            "The query failed for an unknown reason.".to_string()
        }
    }
}

impl<M: QueryMatcher> QueryMatcher for EarlyStop<M> {
    fn evaluate_events(&mut self, events: &[Event]) {
        if self.failing.is_some() {
            return;
        }
        if let Some(event) = events.iter().find(|e| (self.sentinel)(e)) {
            self.failing = Some(event.clone());
            return;
        }
        self.wrapped.on_events_change(events);
    }

    fn succeeded(&self) -> bool {
        self.failing.is_none() && self.wrapped.succeeded()
    }

    fn should_stop(&self) -> bool {
        self.failing.is_some() || self.wrapped.succeeded()
    }

    fn describe_criteria(&self) -> String {
        format!(
            "{}\nAn early stop condition is set.",
            self.wrapped.describe_criteria()
        )
    }

    fn describe_results(&self, summary: &EvaluationSummary) -> String {
        let mut out = self.wrapped.describe_results();
        if summary.status.is_terminal() && !self.succeeded() {
            out.push('\n');
            out.push_str(&self.fail_reason(summary));
        }
        out
    }

    fn matching_count(&self) -> Option<usize> {
        self.wrapped.matching_count()
    }

    fn failing_event(&self) -> Option<Event> {
        self.failing.clone()
    }
}

impl<M: QueryMatcher> fmt::Debug for EarlyStop<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EarlyStop")
            .field("wrapped", &self.wrapped)
            .field("failing", &self.failing.as_ref().map(Event::id))
            .finish_non_exhaustive()
    }
}

impl<M: QueryMatcher> Query<EarlyStop<M>> {
    /// Wrap `wrapped` with a sentinel, taking over its timeout.
    #[must_use]
    pub fn early_stop(wrapped: Query<M>, sentinel: EventPredicate) -> Self {
        let timeout = wrapped.timeout();
        Self::with_timeout(EarlyStop::new(wrapped, sentinel), timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{event_predicate, is_error_event, value_is};
    use crate::query::{NEventsMatch, NEventsMatchQuery, QueryStatus};
    use crate::storage::EventLog;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn wait_for_100(timeout: f64) -> NEventsMatchQuery {
        NEventsMatchQuery::with_timeout(NEventsMatch::from_event_predicate(value_is(100)), timeout)
    }

    #[test]
    fn takes_over_wrapped_timeout() {
        let query = EarlyStopQuery::early_stop(wait_for_100(3.0), is_error_event());
        assert_eq!(query.initial_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn succeeds_when_wrapped_succeeds() {
        let log = EventLog::new();
        log.store(Event::new("a", "attr", 100));
        let query = Arc::new(EarlyStopQuery::early_stop(wait_for_100(0.0), is_error_event()));
        assert_eq!(query.evaluate(&log).unwrap(), QueryStatus::Succeeded);
        assert_eq!(query.matching_count(), Some(1));
        assert!(query.failing_event().is_none());
    }

    #[test]
    fn sentinel_stops_before_full_timeout() {
        let log = Arc::new(EventLog::new());
        let query = Arc::new(EarlyStopQuery::early_stop(wait_for_100(5.0), is_error_event()));

        let producer = {
            let log = Arc::clone(&log);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                log.store(Event::error("a", "attr", "boom"));
                log.store(Event::new("a", "attr", 100));
            })
        };

        let start = Instant::now();
        assert_eq!(query.evaluate(&log).unwrap(), QueryStatus::Failed);
        producer.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(query.failing_event().unwrap().is_error());
    }

    #[test]
    fn wrapped_query_frozen_after_sentinel() {
        let mut early = EarlyStop::new(wait_for_100(0.0), event_predicate(|e| e.has_source("bad")));
        early.evaluate_events(&[Event::new("bad", "attr", 1)]);
        early.evaluate_events(&[Event::new("bad", "attr", 1), Event::new("a", "attr", 100)]);
        assert!(!early.succeeded());
        assert_eq!(early.wrapped().matching_count(), Some(0));
    }

    #[test]
    fn sentinel_wins_over_match_in_same_snapshot() {
        let mut early = EarlyStop::new(wait_for_100(0.0), value_is(100));
        early.evaluate_events(&[Event::new("a", "attr", 100)]);
        assert!(early.should_stop());
        assert!(!early.succeeded());
    }

    #[test]
    fn describes_early_stop_reason() {
        let log = EventLog::new();
        log.store(Event::error("dev", "result", "error code 3"));
        let query = Arc::new(EarlyStopQuery::early_stop(wait_for_100(0.0), is_error_event()));
        query.evaluate(&log).unwrap();

        let text = query.describe();
        assert!(text.contains("Looking for 1 events matching a given predicate.\nAn early stop condition is set."));
        assert!(text.contains("Observed 0 events matching a given predicate."));
        assert!(text.contains("triggered an early stop."));
    }

    #[test]
    fn describes_timeout_reason() {
        let log = EventLog::new();
        let query = Arc::new(EarlyStopQuery::early_stop(wait_for_100(0.05), is_error_event()));
        query.evaluate(&log).unwrap();
        assert!(query.describe().contains("The query failed because of a timeout."));
    }
}
