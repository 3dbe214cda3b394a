//! Database logging example
//!
//! Stores entries in a SQLite table through the batched database sink.
//!
//! Run with: cargo run --example database_logging

use log_pipeline::prelude::*;
use log_pipeline::sinks::{DatabaseSink, DatabaseSinkConfig, SqliteConnector};
use std::time::Duration;

fn main() -> Result<()> {
    println!("=== Log Pipeline - Database Logging Example ===\n");

    std::fs::create_dir_all("logs")?;
    let config = DatabaseSinkConfig::new("logs/database_logging.db")
        .with_table_name("application_logs")
        .with_batch_size(20)
        .with_retry_base_delay(Duration::from_millis(100));
    let connector = SqliteConnector::from_config(&config);

    let engine = LogEngine::builder()
        .logger_id("orders")
        .sink(DatabaseSink::new(config, connector)?)
        .build()?;

    for order in 1..=50 {
        engine.log_with_context(
            LogLevel::Info,
            "Order accepted",
            LogContext::new()
                .with_field("order_id", order)
                .with_field("amount", 19.99 * f64::from(order)),
        );
    }
    engine.warn("Inventory sync delayed");

    // Drains the batch queue and closes the connection
    engine.shutdown(Duration::from_secs(5));

    println!("Rows written to logs/database_logging.db (table application_logs)");
    println!("\n=== Example completed successfully! ===");
    Ok(())
}
