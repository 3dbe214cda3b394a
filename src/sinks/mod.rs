//! Sink implementations

#[cfg(feature = "console")]
pub mod console;
pub mod database;
pub mod file;

#[cfg(feature = "console")]
pub use console::ConsoleSink;
#[cfg(feature = "sqlite")]
pub use database::SqliteConnector;
pub use database::{
    Connection, Connector, DatabaseSink, DatabaseSinkConfig, DbError, DbErrorKind, LogRow,
};
pub use file::{FileSink, FileSinkConfig};

use crate::core::error::{LoggerError, Result};
use std::str::FromStr;

pub(crate) fn parse_bool(component: &str, name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(LoggerError::config(
            component,
            format!("option '{}' expects a boolean, got '{}'", name, other),
        )),
    }
}

pub(crate) fn parse_number<T: FromStr>(component: &str, name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        LoggerError::config(
            component,
            format!("option '{}' expects a non-negative integer, got '{}'", name, value),
        )
    })
}
