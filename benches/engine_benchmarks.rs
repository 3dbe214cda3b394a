//! Criterion benchmarks for log_pipeline

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use log_pipeline::prelude::*;
use log_pipeline::sinks::{FileSink, FileSinkConfig};
use std::time::Duration;

struct NullSink;

impl Sink for NullSink {
    fn write(&self, entry: &LogEntry) -> Result<()> {
        black_box(entry.formatted());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

// ============================================================================
// Threshold Fast Path Benchmarks
// ============================================================================

fn bench_below_threshold(c: &mut Criterion) {
    let mut group = c.benchmark_group("below_threshold");
    group.throughput(Throughput::Elements(1));

    let engine = LogEngine::builder()
        .threshold(LogLevel::Warn)
        .sink(NullSink)
        .build()
        .expect("engine");

    group.bench_function("debug_str", |b| {
        b.iter(|| engine.debug(black_box("Debug message")));
    });

    group.bench_function("debug_macro_with_args", |b| {
        b.iter(|| log_pipeline::debug!(engine, "Value {} of {}", black_box(7), black_box(9)));
    });

    group.finish();
}

// ============================================================================
// Formatter Benchmarks
// ============================================================================

fn bench_formatters(c: &mut Criterion) {
    let mut group = c.benchmark_group("formatters");
    group.throughput(Throughput::Elements(1));

    let entry = LogEntry::new("bench", LogLevel::Info, "Request processed").with_context(
        LogContext::new()
            .with_field("route", "/api/orders")
            .with_field("status", 200)
            .with_field("latency_ms", 12.5),
    );

    let formatters: [(&str, Box<dyn Formatter>); 3] = [
        ("text", Box::new(TextFormatter::new())),
        ("json", Box::new(JsonFormatter::new())),
        ("logfmt", Box::new(LogfmtFormatter::new())),
    ];
    for (name, formatter) in formatters.iter() {
        group.bench_function(*name, |b| b.iter(|| black_box(formatter.format(black_box(&entry)))));
    }

    group.finish();
}

// ============================================================================
// Dispatch Benchmarks
// ============================================================================

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    let sync_engine = LogEngine::builder().sink(NullSink).build().expect("engine");
    group.bench_function("sync_null_sink", |b| {
        b.iter(|| sync_engine.info(black_box("Info message")));
    });

    let async_engine = LogEngine::builder()
        .async_mode(8192)
        .overflow_policy(OverflowPolicy::DropNewest)
        .sink(NullSink)
        .build()
        .expect("engine");
    group.bench_function("async_null_sink", |b| {
        b.iter(|| async_engine.info(black_box("Info message")));
    });
    async_engine.shutdown(Duration::from_secs(5));

    group.finish();
}

fn bench_file_sink(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_sink");
    group.throughput(Throughput::Elements(1));

    let dir = tempfile::tempdir().expect("temp dir");
    let sink = FileSink::new(
        FileSinkConfig::new(dir.path().join("bench.log"))
            .with_max_file_size(1024 * 1024)
            .with_max_backups(2),
    )
    .expect("file sink");
    let engine = LogEngine::builder().sink(sink).build().expect("engine");

    group.bench_function("buffered_rotating", |b| {
        b.iter(|| engine.info(black_box("File message with a typical amount of text in it")));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_below_threshold,
    bench_formatters,
    bench_dispatch,
    bench_file_sink
);
criterion_main!(benches);
