//! Basic usage example
//!
//! Demonstrates thresholds, context fields, error chains, and formatters.
//!
//! Run with: cargo run --example basic_usage

use log_pipeline::prelude::*;
use log_pipeline::sinks::ConsoleSink;
use log_pipeline::{info, warn};
use std::io;
use std::time::Duration;

fn main() -> Result<()> {
    println!("=== Log Pipeline - Basic Usage Example ===\n");

    let engine = LogEngine::builder()
        .logger_id("demo")
        .threshold(LogLevel::Debug)
        .sink(ConsoleSink::new())
        .build()?;

    println!("1. Leveled calls (trace is below the threshold):");
    engine.trace("This will not appear");
    engine.debug("Debug message");
    engine.info("Info message");
    engine.warn("Warning message");

    println!("\n2. Macros with format arguments:");
    let port = 8080;
    info!(engine, "Server listening on port {}", port);
    warn!(engine, "{} of {} workers busy", 7, 8);

    println!("\n3. Context fields and error chains:");
    engine.log_with_context(
        LogLevel::Info,
        "Request processed",
        LogContext::new()
            .with_field("route", "/api/orders")
            .with_field("status", 200)
            .with_field("latency_ms", 12.5),
    );
    let cause = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
    engine.log_error(LogLevel::Error, "Upstream call failed", &cause);

    println!("\n4. Named loggers share the pipeline:");
    let db = engine.named("demo.db");
    db.info("Connection pool ready");

    println!("\n5. JSON output:");
    let json = LogEngine::builder()
        .logger_id("demo.json")
        .formatter(JsonFormatter::new())
        .sink(ConsoleSink::with_colors(false))
        .build()?;
    json.info("Structured line");

    engine.shutdown(Duration::from_secs(1));
    json.shutdown(Duration::from_secs(1));

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
