use std::sync::Arc;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use changeprobe::predicate::value_is;
use changeprobe::{
    Event, EventLog, NEventsMatch, NEventsMatchQuery, NStateChanges, NStateChangesQuery,
    StateChangeCriteria,
};

fn seeded_log(n: i64) -> EventLog {
    let log = EventLog::new();
    for i in 0..n {
        log.store(Event::new("bench/dev/1", "counter", i));
    }
    log
}

fn bench_store_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_log/store");
    group.throughput(Throughput::Elements(1));

    for observers in [0usize, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(observers), &observers, |b, &observers| {
            b.iter_custom(|iters| {
                // Fresh log per sample: snapshot cost grows with the log length.
                let log = EventLog::new();
                let queries: Vec<_> = (0..observers)
                    .map(|_| Arc::new(NEventsMatchQuery::new(NEventsMatch::from_event_predicate(value_is(-1)))))
                    .collect();
                for query in &queries {
                    log.subscribe(query);
                }

                let start = Instant::now();
                for i in 0..iters {
                    log.store(Event::new("bench/dev/1", "counter", i as i64));
                }
                start.elapsed()
            })
        });
    }

    group.finish();
}

fn bench_previous_value_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query/previous_value");

    for len in [100i64, 1_000] {
        let log = seeded_log(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter(|| {
                let query = Arc::new(NStateChangesQuery::new(NStateChanges::new(
                    StateChangeCriteria::new().value(len - 1).previous_value(len - 2),
                )));
                log.evaluate(&query).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(event_log, bench_store_fan_out, bench_previous_value_query);
criterion_main!(event_log);
