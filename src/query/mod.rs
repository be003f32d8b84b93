//! Queries over the event log.
//!
//! A [`Query`] is a single-use state machine: `NOT_STARTED`, then
//! `IN_PROGRESS` while [`Query::evaluate`] blocks, then `SUCCEEDED` or
//! `FAILED` for good. What it looks for is supplied by a
//! [`QueryMatcher`]:
//!
//! - [`NEventsMatch`]: at least N distinct events satisfy a predicate;
//! - [`NStateChanges`]: the same, with the predicate built from
//!   [`StateChangeCriteria`];
//! - [`EarlyStop`]: wraps another query and fails it at once when a
//!   sentinel event arrives.

mod base;
mod early_stop;
mod n_events_match;
mod n_state_changes;

pub use base::{EvaluationSummary, Query, QueryMatcher, QueryStatus};
pub use early_stop::{EarlyStop, EarlyStopQuery};
pub use n_events_match::{NEventsMatch, NEventsMatchQuery};
pub use n_state_changes::{NStateChanges, NStateChangesQuery, StateChangeCriteria};
