use std::io;
use std::sync::{Arc, Mutex};

use changeprobe::predicate::event_predicate;
use changeprobe::{EnumLabels, EventLogger, InMemorySource, LogRule, TracerConfig};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capturing() -> (Captured, impl tracing::Subscriber + Send + Sync) {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .with_writer(move || writer.clone())
        .finish();
    (captured, subscriber)
}

#[test]
fn filtered_events_reach_the_log_output() {
    let (captured, subscriber) = capturing();
    let source = Arc::new(InMemorySource::new());
    source.set_value("sys/tg_test/1", "double_scalar", 0.5);

    tracing::subscriber::with_default(subscriber, || {
        let logger = EventLogger::new(source.clone());
        logger
            .log_events(
                "sys/tg_test/1",
                "double_scalar",
                LogRule::new().filter(event_predicate(|e| e.value() != &changeprobe::Value::Float(2.0))),
            )
            .unwrap();
        source.emit("sys/tg_test/1", "double_scalar", 2.0);
        source.emit("sys/tg_test/1", "double_scalar", 3.5);
        source.emit_error("sys/tg_test/1", "double_scalar", "API_AttrNotAllowed");
    });

    let text = captured.text();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 3, "{text}");
    assert!(lines[0].contains("INFO") && lines[0].contains("double_scalar changed to 0.5."));
    assert!(lines[1].contains("double_scalar changed to 3.5."));
    assert!(lines[2].contains("ERROR") && lines[2].contains("reported error API_AttrNotAllowed."));
    assert!(!text.contains("changed to 2."));
}

#[test]
fn configured_enum_mapping_labels_logged_states() {
    let (captured, subscriber) = capturing();
    let source = Arc::new(InMemorySource::new());
    let config = TracerConfig::from_json_str(
        r#"{"event_enum_mapping": {"obsState": {"name": "ObsState", "labels": {"0": "EMPTY", "2": "IDLE"}}}}"#,
    )
    .unwrap();

    tracing::subscriber::with_default(subscriber, || {
        let logger = EventLogger::with_config(source.clone(), &config);
        logger.map_attribute_to_enum("healthState", EnumLabels::new("HealthState").with_label(0, "OK"));
        logger.log_events("mid/subarray/1", "obsState", LogRule::new()).unwrap();
        logger.log_events("mid/subarray/1", "healthState", LogRule::new()).unwrap();
        source.emit("mid/subarray/1", "obsState", 2);
        source.emit("mid/subarray/1", "healthState", 0);
    });

    let text = captured.text();
    assert!(text.contains("obsState changed to ObsState.IDLE."), "{text}");
    assert!(text.contains("healthState changed to HealthState.OK."), "{text}");
}
