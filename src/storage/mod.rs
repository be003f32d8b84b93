//! Thread-safe event storage.
//!
//! The [`EventLog`] is the single append-only record of everything the
//! tracer received. Queries observe it through the [`EventObserver`]
//! trait and are re-evaluated on every change.

mod event_log;
mod traits;

pub use event_log::EventLog;
pub use traits::{EventObserver, SubscriptionId};
