//! SQLite backend for the database sink

use super::connection::{Connection, Connector, DbError, LogRow};
use super::DatabaseSinkConfig;
use rusqlite::{params, ErrorCode};

/// Opens SQLite databases for [`DatabaseSink`](super::DatabaseSink)
///
/// The URL is a file path, `:memory:`, or either of those behind a
/// `sqlite://` / `sqlite:` prefix. The log table is created if missing.
///
/// # Examples
///
/// ```
/// use log_pipeline::sinks::{Connector, SqliteConnector};
///
/// let connector = SqliteConnector::new(":memory:", "application_logs");
/// assert!(connector.connect().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    target: String,
    table: String,
}

impl SqliteConnector {
    pub fn new(url: impl AsRef<str>, table: impl Into<String>) -> Self {
        let url = url.as_ref();
        let target = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url)
            .to_string();
        Self {
            target,
            table: table.into(),
        }
    }

    /// Connector for the URL and table of a validated config
    ///
    /// User and password are not used by SQLite.
    pub fn from_config(config: &DatabaseSinkConfig) -> Self {
        Self::new(&config.url, config.table_name.clone())
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Connector for SqliteConnector {
    fn table_name(&self) -> Option<&str> {
        Some(&self.table)
    }

    fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        let opened = if self.target == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&self.target)
        };
        let conn = opened
            .map_err(|e| DbError::connection(format!("cannot open '{}': {}", self.target, e)))?;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                logger TEXT NOT NULL,
                thread TEXT NOT NULL,
                message TEXT NOT NULL,
                context TEXT,
                exception TEXT,
                formatted TEXT NOT NULL
            )",
            self.table
        ))
        .map_err(classify)?;

        Ok(Box::new(SqliteConnection { conn: Some(conn) }))
    }
}

struct SqliteConnection {
    conn: Option<rusqlite::Connection>,
}

impl Connection for SqliteConnection {
    fn insert_batch(&mut self, table: &str, rows: &[LogRow]) -> Result<(), DbError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DbError::connection("connection is closed"))?;

        let tx = conn.transaction().map_err(classify)?;
        {
            let mut stmt = tx
                .prepare_cached(&format!(
                    "INSERT INTO {} (timestamp, level, logger, thread, message, context, exception, formatted)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    table
                ))
                .map_err(classify)?;

            for row in rows {
                stmt.execute(params![
                    row.timestamp,
                    row.level,
                    row.logger,
                    row.thread,
                    row.message,
                    row.context,
                    row.exception,
                    row.formatted,
                ])
                .map_err(classify)?;
            }
        }
        tx.commit().map_err(classify)
    }

    fn is_valid(&self) -> bool {
        self.conn
            .as_ref()
            .is_some_and(|c| c.query_row("SELECT 1", [], |r| r.get::<_, i64>(0)).is_ok())
    }

    fn close(&mut self) -> Result<(), DbError> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| DbError::connection(format!("close failed: {}", e))),
            None => Ok(()),
        }
    }
}

/// Map SQLite failures that leave the handle unusable to connection errors
fn classify(error: rusqlite::Error) -> DbError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::SystemIoFailure
            ) =>
        {
            DbError::connection(error.to_string())
        }
        _ => DbError::statement(error.to_string()),
    }
}
