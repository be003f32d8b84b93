//! Matcher for "at least N events satisfy a predicate".

use std::collections::HashSet;
use std::fmt;

use crate::event::{Event, EventId};
use crate::predicate::{ignore_history, EventPredicate, HistoryPredicate};

use super::base::{EvaluationSummary, Query, QueryMatcher};

/// A query over [`NEventsMatch`].
pub type NEventsMatchQuery = Query<NEventsMatch>;

/// Collects the distinct events satisfying a history predicate and
/// succeeds once `target` of them were seen.
///
/// Matched events are kept in the order they were first matched. An event
/// is recorded at most once, by identity, however many snapshots it
/// appears in.
pub struct NEventsMatch {
    predicate: HistoryPredicate,
    target: usize,
    matching: Vec<Event>,
    seen: HashSet<EventId>,
}

impl NEventsMatch {
    /// Match with a predicate that also sees the full event list.
    #[must_use]
    pub fn new(predicate: HistoryPredicate) -> Self {
        Self {
            predicate,
            target: 1,
            matching: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Match with a predicate over single events.
    #[must_use]
    pub fn from_event_predicate(predicate: EventPredicate) -> Self {
        Self::new(ignore_history(predicate))
    }

    /// Set how many distinct matches are needed (default 1).
    #[must_use]
    pub const fn with_target(mut self, target: usize) -> Self {
        self.target = target;
        self
    }

    /// Required number of matches.
    #[must_use]
    pub const fn target(&self) -> usize {
        self.target
    }

    /// Events matched so far, in matching order.
    #[must_use]
    pub fn matching_events(&self) -> &[Event] {
        &self.matching
    }

    pub(crate) fn results_text(&self, what: &str) -> String {
        let mut out = format!("Observed {} events matching {what}.", self.matching.len());
        for event in &self.matching {
            out.push('\n');
            out.push_str(&event.to_string());
        }
        out
    }
}

impl QueryMatcher for NEventsMatch {
    fn evaluate_events(&mut self, events: &[Event]) {
        for event in events {
            if self.seen.contains(&event.id()) || !(self.predicate)(event, events) {
                continue;
            }
            self.seen.insert(event.id());
            self.matching.push(event.clone());
        }
    }

    fn succeeded(&self) -> bool {
        self.matching.len() >= self.target
    }

    fn describe_criteria(&self) -> String {
        format!("Looking for {} events matching a given predicate.", self.target)
    }

    fn describe_results(&self, _summary: &EvaluationSummary) -> String {
        self.results_text("a given predicate")
    }

    fn matching_count(&self) -> Option<usize> {
        Some(self.matching.len())
    }
}

impl fmt::Debug for NEventsMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NEventsMatch")
            .field("target", &self.target)
            .field("matching", &self.matching.len())
            .finish_non_exhaustive()
    }
}

impl Query<NEventsMatch> {
    /// Copy of the events matched so far.
    #[must_use]
    pub fn matching_events(&self) -> Vec<Event> {
        self.with_matcher(|m| m.matching_events().to_vec())
    }
}
