mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use changeprobe::{Event, EventLog, EventObserver};

#[derive(Default)]
struct Recorder {
    snapshots: Mutex<Vec<usize>>,
}

impl EventObserver for Recorder {
    fn on_events_change(&self, events: &[Event]) {
        self.snapshots.lock().unwrap().push(events.len());
    }
}

#[test]
fn late_subscriber_gets_existing_events_first() {
    common::init_tracing();
    let log = EventLog::new();
    log.store(Event::new("A", "attr", 1));
    log.store(Event::new("A", "attr", 2));

    let recorder = Arc::new(Recorder::default());
    log.subscribe(&recorder);
    assert_eq!(*recorder.snapshots.lock().unwrap(), vec![2]);

    log.store(Event::new("A", "attr", 3));
    assert_eq!(*recorder.snapshots.lock().unwrap(), vec![2, 3]);
}

struct Panicker;

impl EventObserver for Panicker {
    fn on_events_change(&self, events: &[Event]) {
        if !events.is_empty() {
            panic!("observer failure");
        }
    }
}

#[test]
fn panicking_observer_does_not_block_others() {
    common::init_tracing();
    let log = EventLog::new();
    let panicker = Arc::new(Panicker);
    let recorder = Arc::new(Recorder::default());
    log.subscribe(&panicker);
    log.subscribe(&recorder);

    log.store(Event::new("A", "attr", 1));
    log.store(Event::new("A", "attr", 2));

    assert_eq!(*recorder.snapshots.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(log.len(), 2);
    assert_eq!(log.observer_count(), 2);
}

struct Counter(AtomicUsize);

impl EventObserver for Counter {
    fn on_events_change(&self, _events: &[Event]) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn concurrent_producers_keep_every_event() {
    common::init_tracing();
    let log = Arc::new(EventLog::new());
    let counter = Arc::new(Counter(AtomicUsize::new(0)));
    log.subscribe(&counter);

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let log = Arc::clone(&log);
            std::thread::spawn(move || {
                for i in 0..50 {
                    log.store(Event::new(format!("dev/{p}"), "attr", i));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert_eq!(log.len(), 200);
    // one delivery at subscription plus one per store
    assert_eq!(counter.0.load(Ordering::SeqCst), 201);

    let events = log.events();
    for p in 0..4 {
        let source = format!("dev/{p}");
        let values: Vec<_> = events
            .iter()
            .filter(|e| e.has_source(&source))
            .map(|e| e.value().as_int().unwrap())
            .collect();
        assert_eq!(values, (0..50).collect::<Vec<i64>>());
    }
}

#[test]
fn unsubscribed_observer_sees_nothing_more() {
    common::init_tracing();
    let log = EventLog::new();
    let recorder = Arc::new(Recorder::default());
    let id = log.subscribe(&recorder);
    assert!(log.unsubscribe(id));
    assert!(!log.unsubscribe(id));

    log.store(Event::new("A", "attr", 1));
    log.clear();
    assert_eq!(*recorder.snapshots.lock().unwrap(), vec![0]);
}

#[test]
fn snapshots_are_copies() {
    let log = EventLog::new();
    let mut snapshot = log.store(Event::new("A", "attr", 1));
    snapshot.clear();
    assert_eq!(log.len(), 1);
}
