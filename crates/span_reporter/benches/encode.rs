use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use span_reporter::{emit_batch_message, encode_batch, Batch, Log, Process, Span};

fn make_batch(spans: usize) -> Batch {
    let process = Process::new("bench-service")
        .with_tag("hostname", "bench-host")
        .with_tag("ip", "10.0.0.1");
    let spans = (0..spans as u64)
        .map(|i| {
            let mut span = Span::new(u128::from(i) << 64 | 0xABCD, i + 1, i, "GET /api/items")
                .with_start_time(1_700_000_000_000_000);
            span.set_tag("http.status_code", 200_i64);
            span.set_tag("http.url", "/api/items?page=2");
            if i % 4 == 0 {
                span.log(Log::new(1_700_000_000_000_100).with_field("event", "cache.miss"));
            }
            span.finish_at(1_700_000_000_000_500);
            span
        })
        .collect();
    Batch::with_spans(process, spans)
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_batch");

    for size in [1, 10, 100] {
        let batch = make_batch(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| black_box(encode_batch(black_box(batch))));
        });
    }

    group.finish();
}

fn bench_emit_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit_batch_message");
    let batch = make_batch(100);
    group.throughput(Throughput::Bytes(emit_batch_message(&batch).len() as u64));

    group.bench_function("100_spans", |b| {
        b.iter(|| black_box(emit_batch_message(black_box(&batch))));
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_emit_message);
criterion_main!(benches);
