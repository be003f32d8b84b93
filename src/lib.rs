//! # changeprobe - Event assertions for asynchronous systems
//!
//! changeprobe lets a test assert that a system under test, which reports
//! attribute changes as a continuous stream of notifications, produces
//! (or does not produce) an expected notification within a bounded,
//! shareable waiting budget.
//!
//! ## Core Concepts
//!
//! - **Event**: one immutable attribute change notification
//! - **EventLog**: thread-safe, append-only record of received events that
//!   notifies observers with a full snapshot on every change
//! - **Query**: single-use state machine evaluated against a log under a
//!   timeout (`NOT_STARTED` to `IN_PROGRESS` to `SUCCEEDED`/`FAILED`)
//! - **TimeoutBudget**: countdown shared by several sequential assertions
//! - **EventTracer**: subscribes to an event source and records its events
//! - **EventLogger**: writes selected events of a source to the log output
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use changeprobe::{
//!     EventLog, Event, NStateChanges, NStateChangesQuery, QueryStatus, StateChangeCriteria,
//! };
//!
//! let log = EventLog::new();
//! log.store(Event::new("sys/tg_test/1", "obsState", "IDLE"));
//! log.store(Event::new("sys/tg_test/1", "obsState", "READY"));
//!
//! let query = Arc::new(NStateChangesQuery::new(NStateChanges::new(
//!     StateChangeCriteria::new()
//!         .attribute("obsState")
//!         .value("READY")
//!         .previous_value("IDLE"),
//! )));
//! assert_eq!(log.evaluate(&query)?, QueryStatus::Succeeded);
//! # Ok::<(), changeprobe::ProbeError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod event;
pub mod predicate;
pub mod timeout;
pub mod typed;
pub mod value;

// Engine
pub mod query;
pub mod storage;

// Wiring and facade
pub mod assertions;
pub mod config;
pub mod tracer;

// Re-export primary types at crate root for convenience
pub use assertions::{assert_that, EventAssertions};
pub use config::TracerConfig;
pub use error::{AssertionFailure, ConfigError, ProbeError, ProbeResult, SourceError, UsageError};
pub use event::{Event, EventId};
pub use predicate::{EventPredicate, HistoryPredicate};
pub use query::{
    EarlyStop, EarlyStopQuery, EvaluationSummary, NEventsMatch, NEventsMatchQuery, NStateChanges,
    NStateChangesQuery, Query, QueryMatcher, QueryStatus, StateChangeCriteria,
};
pub use storage::{EventLog, EventObserver, SubscriptionId};
pub use timeout::{RemainingTime, Timeout, TimeoutBudget};
pub use tracer::{EventLogger, EventSource, EventTracer, InMemorySource, LogRule, RawNotification};
pub use typed::{EnumLabels, EventEnumMapper};
pub use value::Value;
