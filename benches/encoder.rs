//! Benchmarks for record encoding on the caller's thread.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::json;
use unix_dgram_log::{Fields, LogRecord, Prefix, RecordEncoder};

fn producer() -> Fields {
    let mut fields = Fields::new();
    fields.insert("service".into(), json!("billing"));
    fields.insert("host".into(), json!("db-1"));
    fields
}

fn bench_encode(c: &mut Criterion) {
    let plain = RecordEncoder::new(producer(), None);
    let prefixed = RecordEncoder::new(producer(), Some(Prefix::dynamic(|| "<14>".to_owned())));
    let message = LogRecord::new("info", "request served in 12ms");
    let structured = LogRecord::new("warning", "ignored")
        .field("user", "ada")
        .field("latency_ms", 12)
        .field("path", "/v1/invoices");

    c.bench_function("encode_message", |b| {
        b.iter(|| plain.encode(black_box(&message)))
    });
    c.bench_function("encode_structured", |b| {
        b.iter(|| plain.encode(black_box(&structured)))
    });
    c.bench_function("encode_prefixed", |b| {
        b.iter(|| prefixed.encode(black_box(&message)))
    });
    c.bench_function("encode_unknown_level", |b| {
        let bad = LogRecord::new("verbose", "rejected");
        b.iter(|| prefixed.encode(black_box(&bad)))
    });
}

criterion_group!(benches, bench_encode);
criterion_main!(benches);
