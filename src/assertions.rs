//! Chainable event assertions over an [`EventTracer`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use changeprobe::{assert_that, InMemorySource, EventTracer, StateChangeCriteria};
//!
//! # fn main() -> changeprobe::ProbeResult<()> {
//! let source = Arc::new(InMemorySource::new());
//! let tracer = EventTracer::new(source.clone());
//! tracer.subscribe_event("sys/tg_test/1", "obsState")?;
//!
//! // ... trigger the system under test ...
//!
//! assert_that(&tracer)
//!     .within_timeout(10.0)
//!     .has_change_event_occurred(&StateChangeCriteria::new().value("CONFIGURING"), 1)?
//!     .has_change_event_occurred(&StateChangeCriteria::new().value("READY"), 1)?;
//! # Ok(())
//! # }
//! ```
//!
//! All assertions after one `within_timeout` share a single
//! [`TimeoutBudget`]: the chain as a whole waits at most that long.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AssertionFailure, ProbeResult, UsageError};
use crate::event::Event;
use crate::predicate::EventPredicate;
use crate::query::{NStateChanges, NStateChangesQuery, Query, QueryMatcher, StateChangeCriteria};
use crate::timeout::{Timeout, TimeoutBudget};
use crate::tracer::EventTracer;

/// Start a chain of assertions on `tracer`.
#[must_use]
pub fn assert_that(tracer: &EventTracer) -> EventAssertions<'_> {
    EventAssertions::new(tracer)
}

/// Assertion chain over the events recorded by one tracer.
#[derive(Clone)]
pub struct EventAssertions<'a> {
    tracer: &'a EventTracer,
    budget: Option<Arc<TimeoutBudget>>,
    early_stop: Option<EventPredicate>,
}

struct Outcome {
    succeeded: bool,
    early_stopped: bool,
    found: usize,
    remaining: Duration,
    description: String,
}

impl<'a> EventAssertions<'a> {
    /// Assertions with the tracer's default timeout and no early stop.
    #[must_use]
    pub const fn new(tracer: &'a EventTracer) -> Self {
        Self {
            tracer,
            budget: None,
            early_stop: None,
        }
    }

    /// Share a fresh budget of `seconds` among every following assertion.
    #[must_use]
    pub fn within_timeout(mut self, seconds: f64) -> Self {
        self.budget = Some(Arc::new(TimeoutBudget::new(seconds)));
        self
    }

    /// Fail every following assertion as soon as an event satisfies
    /// `sentinel`. Replaces any previous sentinel.
    #[must_use]
    pub fn with_early_stop(mut self, sentinel: EventPredicate) -> Self {
        self.early_stop = Some(sentinel);
        self
    }

    /// Remove the early-stop sentinel.
    #[must_use]
    pub fn without_early_stop(mut self) -> Self {
        self.early_stop = None;
        self
    }

    /// The shared budget, if `within_timeout` was called.
    #[must_use]
    pub const fn budget(&self) -> Option<&Arc<TimeoutBudget>> {
        self.budget.as_ref()
    }

    fn timeout(&self) -> Timeout {
        match &self.budget {
            Some(budget) => Timeout::from(budget),
            None => Timeout::seconds(self.tracer.config().default_timeout_secs),
        }
    }

    fn timeout_seconds(&self) -> f64 {
        match &self.budget {
            Some(budget) => budget.initial_seconds(),
            None => self.tracer.config().default_timeout_secs.max(0.0),
        }
    }

    fn scope(&self) -> String {
        let seconds = self.timeout_seconds();
        if seconds > 0.0 {
            format!(" within {seconds} seconds")
        } else {
            " in already existing events".to_string()
        }
    }

    /// Assert that at least `min_n_events` events satisfy `criteria`
    /// within the timeout.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::InvalidEventCount` if `min_n_events` is 0 and
    /// an `AssertionFailure` if not enough events were found (or the early
    /// stop fired).
    pub fn has_change_event_occurred(
        &self,
        criteria: &StateChangeCriteria,
        min_n_events: usize,
    ) -> ProbeResult<&Self> {
        check_count("min_n_events", min_n_events)?;
        let outcome = self.run(criteria, min_n_events)?;
        if outcome.succeeded {
            return Ok(self);
        }

        let reason = if outcome.early_stopped {
            self.early_stop_reason(&outcome)
        } else {
            let within = self.timeout_seconds();
            if within > 0.0 {
                format!("The query condition was not met within the {within} seconds timeout.")
            } else {
                "The query condition was not met.".to_string()
            }
        };
        let message = format!(
            "Expected to find {min_n_events} event(s) matching the predicate{}, but only {} found.\n{}",
            self.scope(),
            outcome.found,
            self.failure_details(&reason, &outcome),
        );
        Err(AssertionFailure::new(message).into())
    }

    /// Assert that fewer than `max_n_events` events satisfy `criteria`
    /// within the timeout.
    ///
    /// Waits the full timeout unless `max_n_events` matches show up (or
    /// the early stop fires) first.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::InvalidEventCount` if `max_n_events` is 0 and
    /// an `AssertionFailure` if `max_n_events` matching events were found
    /// or the early stop fired.
    pub fn hasnt_change_event_occurred(
        &self,
        criteria: &StateChangeCriteria,
        max_n_events: usize,
    ) -> ProbeResult<&Self> {
        check_count("max_n_events", max_n_events)?;
        let outcome = self.run(criteria, max_n_events)?;
        if !outcome.succeeded && !outcome.early_stopped {
            return Ok(self);
        }

        let reason = if outcome.early_stopped {
            self.early_stop_reason(&outcome)
        } else {
            format!("{} matching event(s) were found{}.", outcome.found, self.scope())
        };
        let message = format!(
            "Expected to NOT find {max_n_events} event(s) matching the predicate{}, but {} were found.\n{}\n\
             NOTE: the query looks for N={max_n_events} events, but in this case you were expecting less!",
            self.scope(),
            outcome.found,
            self.failure_details(&reason, &outcome),
        );
        Err(AssertionFailure::new(message).into())
    }

    fn run(&self, criteria: &StateChangeCriteria, target: usize) -> ProbeResult<Outcome> {
        let query = NStateChangesQuery::with_timeout(
            NStateChanges::new(criteria.clone()).with_target(target),
            self.timeout(),
        );
        match &self.early_stop {
            Some(sentinel) => self.evaluate(Query::early_stop(query, Arc::clone(sentinel))),
            None => self.evaluate(query),
        }
    }

    fn evaluate<M: QueryMatcher + 'static>(&self, query: Query<M>) -> ProbeResult<Outcome> {
        let query = Arc::new(query);
        self.tracer.evaluate(&query)?;
        Ok(Outcome {
            succeeded: query.succeeded(),
            early_stopped: query.failing_event().is_some(),
            found: query.matching_count().unwrap_or(0),
            remaining: query.remaining_timeout(),
            description: query.describe(),
        })
    }

    fn early_stop_reason(&self, outcome: &Outcome) -> String {
        let mut reason = "An early stop condition was triggered and so the query failed".to_string();
        if self.timeout_seconds() > 0.0 {
            reason.push_str(&format!(
                " {:.3} seconds before the timeout",
                outcome.remaining.as_secs_f64()
            ));
        }
        reason.push('.');
        reason
    }

    fn failure_details(&self, reason: &str, outcome: &Outcome) -> String {
        format!(
            "FAILURE REASON: {reason}\n\nEvents captured by the tracer:\n{}\n\nQuery details:\n{}",
            self.render_events(&self.tracer.events()),
            outcome.description,
        )
    }

    fn render_events(&self, events: &[Event]) -> String {
        let cap = self
            .tracer
            .config()
            .max_events_in_report
            .unwrap_or(usize::MAX);
        let skipped = events.len().saturating_sub(cap);
        let mut lines = Vec::with_capacity(events.len() - skipped + 1);
        if skipped > 0 {
            lines.push(format!("({skipped} earlier events omitted)"));
        }
        lines.extend(events[skipped..].iter().map(ToString::to_string));
        lines.join("\n")
    }
}

impl fmt::Debug for EventAssertions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventAssertions")
            .field("budget", &self.budget)
            .field("early_stop", &self.early_stop.is_some())
            .finish_non_exhaustive()
    }
}

fn check_count(name: &'static str, value: usize) -> ProbeResult<()> {
    if value == 0 {
        return Err(UsageError::InvalidEventCount { name, value }.into());
    }
    Ok(())
}
