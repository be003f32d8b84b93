//! The query state machine shared by every concrete query.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::error::{ProbeResult, UsageError};
use crate::event::Event;
use crate::storage::{EventLog, EventObserver};
use crate::timeout::{RemainingTime, Timeout};

/// Lifecycle of a query.
///
/// `Succeeded` and `Failed` are terminal: once reached they never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    /// `evaluate` was never called.
    NotStarted,
    /// `evaluate` is running.
    InProgress,
    /// The success criterion was met before the timeout.
    Succeeded,
    /// The timeout elapsed (or an early stop fired) without success.
    Failed,
}

impl QueryStatus {
    /// Whether this is a terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Upper-case name used in descriptions.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing facts about an evaluation, handed to
/// [`QueryMatcher::describe_results`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationSummary {
    /// Status of the owning query.
    pub status: QueryStatus,
    /// Timeout in effect when the evaluation started (or would start now).
    pub initial_timeout: Duration,
    /// Elapsed evaluation time, if the evaluation started.
    pub evaluation_duration: Option<Duration>,
}

/// Match logic plugged into a [`Query`].
///
/// Every hook is called with the owning query's lock held. Hooks get
/// direct access to the matcher state and must never call a public
/// method of the owning query (`status`, `succeeded`, `describe`, ...):
/// those take the same lock and would deadlock. Calling into a
/// *different* query (a wrapped one) is fine.
pub trait QueryMatcher: Send {
    /// Re-evaluate the match state against the complete event list.
    ///
    /// Called on every change of the log, always with every event
    /// received so far, so predicates may relate events to each other.
    fn evaluate_events(&mut self, events: &[Event]);

    /// Whether the success criterion is met.
    fn succeeded(&self) -> bool;

    /// Whether the evaluation should end now.
    ///
    /// Defaults to [`succeeded`](Self::succeeded); early-stop matchers
    /// also stop on failure.
    fn should_stop(&self) -> bool {
        self.succeeded()
    }

    /// Human-readable description of what the query looks for.
    fn describe_criteria(&self) -> String {
        "Criteria not described.".to_string()
    }

    /// Human-readable description of what the query found.
    fn describe_results(&self, summary: &EvaluationSummary) -> String {
        let _ = summary;
        "Results not described.".to_string()
    }

    /// Number of matched events, if the matcher counts them.
    fn matching_count(&self) -> Option<usize> {
        None
    }

    /// The event that forced an early failure, if any.
    fn failing_event(&self) -> Option<Event> {
        None
    }
}

struct QueryState<M> {
    matcher: M,
    timeout: Timeout,
    started: Option<(Instant, DateTime<Utc>)>,
    ended: Option<(Instant, DateTime<Utc>)>,
    initial_timeout: Option<Duration>,
}

impl<M: QueryMatcher> QueryState<M> {
    fn status(&self) -> QueryStatus {
        match (self.started, self.ended) {
            (None, _) => QueryStatus::NotStarted,
            (Some(_), None) => QueryStatus::InProgress,
            (Some(_), Some(_)) if self.matcher.succeeded() => QueryStatus::Succeeded,
            (Some(_), Some(_)) => QueryStatus::Failed,
        }
    }

    fn initial_timeout(&self) -> Duration {
        self.initial_timeout
            .unwrap_or_else(|| self.timeout.remaining())
    }

    fn evaluation_duration(&self) -> Option<Duration> {
        let (start, _) = self.started?;
        Some(match self.ended {
            Some((end, _)) => end.saturating_duration_since(start),
            None => start.elapsed(),
        })
    }

    fn remaining_timeout(&self) -> Duration {
        match (self.initial_timeout, self.evaluation_duration()) {
            (Some(initial), Some(elapsed)) => initial.saturating_sub(elapsed),
            _ => self.timeout.remaining(),
        }
    }

    fn summary(&self) -> EvaluationSummary {
        EvaluationSummary {
            status: self.status(),
            initial_timeout: self.initial_timeout(),
            evaluation_duration: self.evaluation_duration(),
        }
    }

    fn describe_status(&self) -> String {
        let status = self.status();
        let mut out = format!("Status={status}, ");
        if let Some((_, wall)) = self.started {
            out.push_str(&format!("Start time={}, ", format_wall(wall)));
        }
        if let Some((_, wall)) = self.ended {
            out.push_str(&format!("End time={}, ", format_wall(wall)));
        }
        out.push_str(&format!(
            "Initial timeout={:.3}s, ",
            self.initial_timeout().as_secs_f64()
        ));
        if status != QueryStatus::NotStarted {
            out.push_str(&format!(
                "Remaining timeout={:.3}s, ",
                self.remaining_timeout().as_secs_f64()
            ));
            out.push_str(&format!(
                "Evaluation duration={:.3}s, ",
                self.evaluation_duration().unwrap_or_default().as_secs_f64()
            ));
        }
        out
    }
}

fn format_wall(wall: DateTime<Utc>) -> String {
    wall.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// A single-use, thread-safe query evaluated against an [`EventLog`].
///
/// `evaluate` subscribes the query to the log, blocks until the matcher's
/// stop criterion is met or the timeout elapses, then unsubscribes. The
/// log drives the matcher through [`EventObserver::on_events_change`]
/// from producer threads; all matcher access happens under the query's
/// private lock, which is never held together with the log's lock.
///
/// A query that times out is not an error: it ends in
/// [`QueryStatus::Failed`].
pub struct Query<M> {
    state: Mutex<QueryState<M>>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
}

impl<M: QueryMatcher> Query<M> {
    /// Create a query that only checks events already received.
    pub fn new(matcher: M) -> Self {
        Self::with_timeout(matcher, Timeout::NONE)
    }

    /// Create a query with a fixed timeout or a shared budget.
    pub fn with_timeout(matcher: M, timeout: impl Into<Timeout>) -> Self {
        let (done_tx, done_rx) = bounded(1);
        Self {
            state: Mutex::new(QueryState {
                matcher,
                timeout: timeout.into(),
                started: None,
                ended: None,
                initial_timeout: None,
            }),
            done_tx,
            done_rx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueryState<M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the timeout.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::TimeoutLocked` once evaluation has started.
    pub fn set_timeout(&self, timeout: impl Into<Timeout>) -> ProbeResult<()> {
        let mut state = self.lock();
        if state.started.is_some() {
            return Err(UsageError::TimeoutLocked.into());
        }
        state.timeout = timeout.into();
        Ok(())
    }

    /// The configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Timeout {
        self.lock().timeout.clone()
    }

    /// Evaluate the query against `log`, blocking for at most the
    /// remaining timeout.
    ///
    /// A zero timeout checks the events already in the log and returns
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::AlreadyEvaluated` on a second call.
    pub fn evaluate(self: &Arc<Self>, log: &EventLog) -> ProbeResult<QueryStatus>
    where
        M: 'static,
    {
        let (start, initial) = {
            let mut state = self.lock();
            if state.started.is_some() {
                return Err(UsageError::AlreadyEvaluated.into());
            }
            state.timeout.start();
            let initial = state.timeout.remaining();
            let start = Instant::now();
            state.initial_timeout = Some(initial);
            state.started = Some((start, Utc::now()));
            (start, initial)
        };

        tracing::debug!(
            initial_timeout_secs = initial.as_secs_f64(),
            "query evaluation started"
        );

        let subscription = log.subscribe(self);
        if !initial.is_zero() {
            // Either the stop signal or the deadline ends the wait.
            let _ = match start.checked_add(initial) {
                Some(deadline) => self
                    .done_rx
                    .recv_timeout(deadline.saturating_duration_since(Instant::now()))
                    .ok(),
                // Past the clock's range: wait for the stop signal only.
                None => self.done_rx.recv().ok(),
            };
        }
        log.unsubscribe(subscription);

        let (status, duration) = {
            let mut state = self.lock();
            state.ended = Some((Instant::now(), Utc::now()));
            (state.status(), state.evaluation_duration().unwrap_or_default())
        };

        tracing::debug!(
            status = %status,
            duration_secs = duration.as_secs_f64(),
            "query evaluation finished"
        );
        Ok(status)
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> QueryStatus {
        self.lock().status()
    }

    /// Whether the matcher's success criterion is met.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.lock().matcher.succeeded()
    }

    /// Whether the query reached a terminal status.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.lock().status().is_terminal()
    }

    /// Timeout in effect when evaluation started; before that, what the
    /// timeout would yield now.
    #[must_use]
    pub fn initial_timeout(&self) -> Duration {
        self.lock().initial_timeout()
    }

    /// Time left before the timeout; equals the timeout before evaluation.
    #[must_use]
    pub fn remaining_timeout(&self) -> Duration {
        self.lock().remaining_timeout()
    }

    /// Evaluation time so far (or in total, once completed).
    #[must_use]
    pub fn evaluation_duration(&self) -> Option<Duration> {
        self.lock().evaluation_duration()
    }

    /// Number of events the matcher counted as matching, if it counts.
    #[must_use]
    pub fn matching_count(&self) -> Option<usize> {
        self.lock().matcher.matching_count()
    }

    /// The event that triggered an early stop, if any.
    #[must_use]
    pub fn failing_event(&self) -> Option<Event> {
        self.lock().matcher.failing_event()
    }

    /// Read access to the matcher.
    pub fn with_matcher<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        f(&self.lock().matcher)
    }

    /// Three-part report: status, criteria and results.
    #[must_use]
    pub fn describe(&self) -> String {
        let state = self.lock();
        let summary = state.summary();
        format!(
            "EVENT QUERY STATUS:\n{}\nEVENT QUERY CRITERIA:\n{}\nEVENT QUERY RESULTS:\n{}",
            state.describe_status(),
            state.matcher.describe_criteria(),
            state.matcher.describe_results(&summary),
        )
    }

    pub(crate) fn describe_criteria(&self) -> String {
        self.lock().matcher.describe_criteria()
    }

    pub(crate) fn describe_results(&self) -> String {
        let state = self.lock();
        let summary = state.summary();
        state.matcher.describe_results(&summary)
    }
}

impl<M: QueryMatcher> EventObserver for Query<M> {
    fn on_events_change(&self, events: &[Event]) {
        let mut state = self.lock();
        if state.status().is_terminal() {
            return;
        }
        state.matcher.evaluate_events(events);
        if state.matcher.should_stop() {
            // A pending signal is enough; a full channel means one is queued.
            let _ = self.done_tx.try_send(());
        }
    }
}

impl<M: QueryMatcher> fmt::Debug for Query<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Query")
            .field("status", &state.status())
            .field("timeout", &state.timeout)
            .field("initial_timeout", &state.initial_timeout)
            .finish_non_exhaustive()
    }
}
