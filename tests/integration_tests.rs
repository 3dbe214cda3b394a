//! Integration tests for the logging pipeline
//!
//! These tests verify:
//! - Threshold fast path and filtering
//! - Log injection prevention
//! - File rotation and the backup ring through the engine
//! - JSON line layout
//! - Async dispatch and fallback reporting

use log_pipeline::core::fallback::{FailureKind, FallbackHandler, FallbackReport};
use log_pipeline::prelude::*;
use log_pipeline::sinks::{FileSink, FileSinkConfig};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct CountingSink {
    writes: AtomicUsize,
    lines: Mutex<Vec<String>>,
}

impl Sink for CountingSink {
    fn write(&self, entry: &LogEntry) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.lines.lock().push(entry.formatted().to_string());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn collecting_fallback() -> (FallbackHandler, Arc<Mutex<Vec<FallbackReport>>>) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    let handler: FallbackHandler = Arc::new(move |r: &FallbackReport| sink.lock().push(r.clone()));
    (handler, reports)
}

#[test]
fn test_threshold_info_scenario() {
    let spy = Arc::new(CountingSink::default());
    let engine = LogEngine::builder()
        .threshold(LogLevel::Info)
        .shared_sink(spy.clone())
        .build()
        .expect("Failed to build engine");

    engine.debug("x");
    assert_eq!(spy.writes.load(Ordering::SeqCst), 0);

    engine.info("y");
    assert_eq!(spy.writes.load(Ordering::SeqCst), 1);

    let line = spy.lines.lock()[0].clone();
    assert!(line.contains('y'));
    assert!(line.contains("INFO"));
}

#[test]
fn test_every_level_below_threshold_is_skipped() {
    for threshold in LogLevel::ALL {
        let spy = Arc::new(CountingSink::default());
        let engine = LogEngine::builder()
            .threshold(threshold)
            .shared_sink(spy.clone())
            .build()
            .expect("Failed to build engine");

        for level in LogLevel::ALL {
            engine.log(level, "each level");
        }

        let expected = LogLevel::ALL.iter().filter(|l| **l >= threshold).count();
        assert_eq!(spy.writes.load(Ordering::SeqCst), expected, "threshold {}", threshold);
    }
}

#[test]
fn test_log_injection_prevention() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("injection_test.log");

    let sink = FileSink::open(&log_file).expect("Failed to create sink");
    let engine = LogEngine::builder().sink(sink).build().expect("Failed to build engine");

    let malicious_message = "User login\nERROR [2024-10-17] Fake error injected\nINFO Continuation";
    engine.info(malicious_message);
    engine.flush().expect("Failed to flush");

    let content = fs::read_to_string(&log_file).expect("Failed to read log file");
    assert!(content.contains("\\n"));
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1, "Log should be a single line, not multiple");
}

#[test]
fn test_file_rotation_through_engine() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("rotating.log");

    let sink = Arc::new(
        FileSink::new(
            FileSinkConfig::new(&log_file)
                .with_max_file_size(100)
                .with_max_backups(3),
        )
        .expect("Failed to create sink"),
    );
    let engine = LogEngine::builder()
        .logger_id("svc")
        .shared_sink(sink.clone())
        .build()
        .expect("Failed to build engine");

    // Lines are over 50 bytes, so the file passes 100 bytes before the third write
    engine.info("first entry");
    engine.info("second entry");
    engine.info("third entry");
    engine.flush().expect("Failed to flush");

    assert!(sink.rotation_count() >= 1);
    let backup = fs::read_to_string(sink.backup_path(1)).expect("Failed to read backup");
    assert!(backup.contains("second entry"));
    let active = fs::read_to_string(&log_file).expect("Failed to read active file");
    assert!(active.contains("third entry"));
    assert!(active.contains("Log file rotated"));
}

#[test]
fn test_backup_ring_bound() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("ring.log");

    for max_backups in [1usize, 2, 4] {
        let _ = fs::remove_file(&log_file);
        for i in 1..=6 {
            let _ = fs::remove_file(log_file.with_file_name(format!("ring.log.{}", i)));
        }

        let sink = Arc::new(
            FileSink::new(
                FileSinkConfig::new(&log_file)
                    .with_max_file_size(1)
                    .with_max_backups(max_backups),
            )
            .expect("Failed to create sink"),
        );
        let engine = LogEngine::builder()
            .shared_sink(sink.clone())
            .build()
            .expect("Failed to build engine");

        // First write never rotates; each later one does
        let rotations = 5;
        for i in 0..=rotations {
            engine.info(format!("entry {}", i));
        }
        engine.shutdown(Duration::from_secs(1));

        assert_eq!(sink.rotation_count(), rotations as u64);
        let kept = rotations.min(max_backups);
        for i in 1..=kept {
            assert!(sink.backup_path(i).exists(), "missing backup {} (max {})", i, max_backups);
        }
        assert!(!sink.backup_path(kept + 1).exists());
    }
}

#[test]
fn test_json_lines_keep_key_order() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("json.log");

    let engine = LogEngine::builder()
        .logger_id("api")
        .formatter(JsonFormatter::new())
        .sink(FileSink::open(&log_file).expect("Failed to create sink"))
        .build()
        .expect("Failed to build engine");

    let err = io::Error::new(io::ErrorKind::TimedOut, "upstream timed out");
    engine.log_full(
        LogLevel::Error,
        "request failed",
        Some(&err),
        Some(LogContext::new().with_field("route", "/orders").with_field("status", 504)),
    );
    engine.shutdown(Duration::from_secs(1));

    let content = fs::read_to_string(&log_file).expect("Failed to read log file");
    let line = content.lines().next().expect("one line");

    let keys = ["\"timestamp\"", "\"level\"", "\"logger\"", "\"thread\"", "\"message\"", "\"context\"", "\"exception\""];
    let positions: Vec<usize> = keys.iter().map(|k| line.find(k).expect("key present")).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    let value: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert_eq!(value["level"], "ERROR");
    assert_eq!(value["context"]["status"], 504);
    assert_eq!(value["exception"][0], "upstream timed out");
}

#[test]
fn test_async_engine_writes_everything_before_shutdown_returns() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("async.log");

    let engine = LogEngine::builder()
        .async_mode(16)
        .overflow_policy(OverflowPolicy::Block)
        .sink(FileSink::open(&log_file).expect("Failed to create sink"))
        .build()
        .expect("Failed to build engine");

    for i in 0..200 {
        engine.info(format!("async message {}", i));
    }
    assert!(engine.shutdown(Duration::from_secs(5)));

    let content = fs::read_to_string(&log_file).expect("Failed to read log file");
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 200);
    assert!(lines[0].ends_with("async message 0"));
    assert!(lines[199].ends_with("async message 199"));
}

#[test]
fn test_write_after_shutdown_is_dropped() {
    let spy = Arc::new(CountingSink::default());
    let engine = LogEngine::builder().shared_sink(spy.clone()).build().expect("Failed to build engine");

    engine.shutdown(Duration::from_secs(1));
    engine.info("too late");

    assert_eq!(spy.writes.load(Ordering::SeqCst), 0);
    assert_eq!(engine.metrics().dropped(), 1);
}

#[test]
fn test_closed_file_sink_reports_to_fallback() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let sink = Arc::new(FileSink::open(temp_dir.path().join("closed.log")).expect("Failed to create sink"));
    sink.close().expect("Failed to close");

    let (fallback, reports) = collecting_fallback();
    let engine = LogEngine::builder()
        .logger_id("audit")
        .shared_sink(sink)
        .fallback(fallback)
        .build()
        .expect("Failed to build engine");

    engine.warn("user deleted");

    let reports = reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, FailureKind::Write);
    assert_eq!(reports[0].logger, "audit");
    assert_eq!(reports[0].message, "user deleted");
}

#[test]
fn test_timestamp_format_in_text_lines() {
    let spy = Arc::new(CountingSink::default());
    let engine = LogEngine::builder()
        .formatter(TextFormatter::new().with_timestamp_format(TimestampFormat::UnixMillis))
        .shared_sink(spy.clone())
        .build()
        .expect("Failed to build engine");

    engine.info("epoch");
    let line = spy.lines.lock()[0].clone();
    let ts = &line[1..line.find(']').expect("closing bracket")];
    assert!(ts.parse::<i64>().is_ok(), "timestamp was {}", ts);
}
