#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::thread::JoinHandle;
use std::time::Duration;

use changeprobe::{EventTracer, InMemorySource, Value};
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Route crate logs to the test output; `RUST_LOG` overrides the level.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("changeprobe=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A tracer subscribed to `attributes` of `source_id` on a fresh source.
pub fn traced(source_id: &str, attributes: &[&str]) -> (Arc<InMemorySource>, EventTracer) {
    init_tracing();
    let source = Arc::new(InMemorySource::new());
    let tracer = EventTracer::new(source.clone());
    for attribute in attributes {
        tracer.subscribe_event(source_id, attribute).unwrap();
    }
    (source, tracer)
}

/// Emit `(delay, value)` pairs on one attribute from a background thread.
pub fn emit_later(
    source: &Arc<InMemorySource>,
    source_id: &str,
    attribute: &str,
    schedule: Vec<(Duration, Value)>,
) -> JoinHandle<()> {
    let source = Arc::clone(source);
    let source_id = source_id.to_string();
    let attribute = attribute.to_string();
    std::thread::spawn(move || {
        for (delay, value) in schedule {
            std::thread::sleep(delay);
            source.emit(&source_id, &attribute, value);
        }
    })
}
