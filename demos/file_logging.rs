//! File logging example
//!
//! Demonstrates size-based rotation with a small threshold so backups
//! appear quickly.
//!
//! Run with: cargo run --example file_logging

use log_pipeline::prelude::*;
use log_pipeline::sinks::{FileSink, FileSinkConfig};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    println!("=== Log Pipeline - File Logging Example ===\n");

    let config = FileSinkConfig::from_options([
        ("path", "logs/file_logging.log"),
        ("maxFileSizeBytes", "2048"),
        ("maxBackups", "3"),
    ])?;
    let sink = Arc::new(FileSink::new(config)?);

    let engine = LogEngine::builder()
        .logger_id("file-demo")
        .async_mode(256)
        .overflow_policy(OverflowPolicy::Block)
        .shared_sink(sink.clone())
        .build()?;

    for i in 1..=100 {
        engine.info(format!("Processing item {}/100", i));
        if i % 25 == 0 {
            engine.warn(format!("Checkpoint at item {}", i));
        }
    }
    engine.error("Simulated failure; error lines are flushed immediately");

    engine.shutdown(Duration::from_secs(5));

    println!("Active file: {}", sink.path().display());
    println!("Rotations:   {}", sink.rotation_count());
    for i in 1..=sink.config().max_backups {
        let backup = sink.backup_path(i);
        if backup.exists() {
            println!("Backup {}:    {}", i, backup.display());
        }
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
