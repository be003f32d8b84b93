//! Wiring between event sources and the event log.
//!
//! An [`EventSource`] delivers [`RawNotification`]s; the [`EventTracer`]
//! turns them into [`Event`](crate::Event)s, stores them in its log and
//! evaluates queries against it. The [`EventLogger`] only writes them to
//! the log output. [`InMemorySource`] is an in-process source for tests
//! and demos.

mod event_tracer;
mod logger;
mod memory;
mod source;

pub use event_tracer::EventTracer;
pub use logger::{default_message, EventLogger, LogRule, MessageBuilder};
pub use memory::InMemorySource;
pub use source::{
    short_attribute_name, EventSource, NotificationCallback, RawNotification, SourceSubscriptionId,
};
