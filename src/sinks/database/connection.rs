//! Connection abstraction for the database sink

use crate::core::log_entry::LogEntry;
use crate::core::timestamp::TimestampFormat;
use serde::Serialize;
use std::fmt;

/// Whether a failure invalidates the connection itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// The link to the database is unusable; the sink reconnects
    Connection,
    /// The statement failed on a healthy connection
    Statement,
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbErrorKind::Connection => write!(f, "connection"),
            DbErrorKind::Statement => write!(f, "statement"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct DbError {
    pub kind: DbErrorKind,
    pub message: String,
}

impl DbError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: DbErrorKind::Connection,
            message: message.into(),
        }
    }

    pub fn statement(message: impl Into<String>) -> Self {
        Self {
            kind: DbErrorKind::Statement,
            message: message.into(),
        }
    }

    pub fn is_connection(&self) -> bool {
        self.kind == DbErrorKind::Connection
    }
}

/// One log entry flattened into column values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRow {
    pub timestamp: String,
    pub level: String,
    pub logger: String,
    pub thread: String,
    pub message: String,
    /// Context fields as a JSON object
    pub context: Option<String>,
    /// Error chain joined with "; caused by: "
    pub exception: Option<String>,
    pub formatted: String,
}

impl LogRow {
    pub fn from_entry(entry: &LogEntry) -> Self {
        Self {
            timestamp: TimestampFormat::Iso8601.format(&entry.timestamp),
            level: entry.level.to_str().to_string(),
            logger: entry.logger.clone(),
            thread: entry.thread.to_string(),
            message: entry.message.clone(),
            context: entry
                .context
                .as_ref()
                .filter(|c| !c.is_empty())
                .and_then(|c| serde_json::to_string(c).ok()),
            exception: entry.error.as_ref().map(ToString::to_string),
            formatted: entry.formatted().to_string(),
        }
    }
}

/// An open link to a database, owned by exactly one sink
pub trait Connection: Send {
    /// Insert all rows in one unit of work
    fn insert_batch(&mut self, table: &str, rows: &[LogRow]) -> Result<(), DbError>;

    fn is_valid(&self) -> bool;

    fn close(&mut self) -> Result<(), DbError>;
}

/// Opens connections; called once at construction and again on every reconnect
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Connection>, DbError>;

    /// Table this connector prepares on connect, if it prepares one
    fn table_name(&self) -> Option<&str> {
        None
    }
}

impl<F> Connector for F
where
    F: Fn() -> Result<Box<dyn Connection>, DbError> + Send + Sync,
{
    fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        self()
    }
}
