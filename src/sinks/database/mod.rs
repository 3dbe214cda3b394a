//! Database sink with batching, retry and reconnection
//!
//! Rows are written through a [`Connection`] opened by a [`Connector`]. In
//! batched mode `write` only enqueues; a background worker and `flush` both
//! pull from the queue while holding the sink mutex, so rows reach the
//! database in enqueue order.

mod connection;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use connection::{Connection, Connector, DbError, DbErrorKind, LogRow};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnector;

use super::{parse_bool, parse_number};
use crate::core::error::{LoggerError, Result};
use crate::core::fallback::{stderr_handler, FailureKind, FallbackHandler, FallbackReport};
use crate::core::log_entry::LogEntry;
use crate::core::overflow_policy::{offer, Offer, OverflowPolicy};
use crate::core::sink::Sink;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Select, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const COMPONENT: &str = "DatabaseSink";

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Configuration for [`DatabaseSink`]
///
/// # Examples
///
/// ```
/// use log_pipeline::sinks::DatabaseSinkConfig;
/// use std::time::Duration;
///
/// let config = DatabaseSinkConfig::new("logs.db")
///     .with_table_name("service_logs")
///     .with_batch_size(50)
///     .with_retry_base_delay(Duration::from_millis(200));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DatabaseSinkConfig {
    #[serde(rename = "connectionURL")]
    pub url: String,
    pub user: Option<String>,
    #[serde(rename = "pass")]
    pub password: Option<String>,
    pub table_name: String,
    pub batching_enabled: bool,
    pub batch_size: usize,
    /// Retries after the first attempt; a write makes at most `max_retries + 1` attempts
    pub max_retries: u32,
    #[serde(rename = "retryBaseDelayMs", with = "duration_ms")]
    pub retry_base_delay: Duration,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    #[serde(rename = "idleWaitMs", with = "duration_ms")]
    pub idle_wait: Duration,
    #[serde(rename = "workerErrorPauseMs", with = "duration_ms")]
    pub worker_error_pause: Duration,
    #[serde(rename = "shutdownTimeoutMs", with = "duration_ms")]
    pub shutdown_timeout: Duration,
}

impl Default for DatabaseSinkConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: None,
            password: None,
            table_name: "application_logs".to_string(),
            batching_enabled: true,
            batch_size: 100,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            queue_capacity: 10_000,
            overflow_policy: OverflowPolicy::Block,
            idle_wait: Duration::from_millis(100),
            worker_error_pause: Duration::from_millis(1000),
            shutdown_timeout: Duration::from_millis(5000),
        }
    }
}

impl DatabaseSinkConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_batching(mut self, enabled: bool) -> Self {
        self.batching_enabled = enabled;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait = wait;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_worker_error_pause(mut self, pause: Duration) -> Self {
        self.worker_error_pause = pause;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Build a config from `(name, value)` option pairs
    ///
    /// Recognized names: `connectionURL`, `user`, `pass`, `tableName`,
    /// `batchingEnabled`, `batchSize`, `maxRetries`, `retryBaseDelayMs`,
    /// `queueCapacity`, `overflowPolicy`, `idleWaitMs`, `workerErrorPauseMs`,
    /// `shutdownTimeoutMs`. `overflowPolicy` takes `block`, `reject`,
    /// `dropNewest`, `dropOldest` or `blockWithTimeout:<ms>`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown name, an unparsable value,
    /// or a config that fails [`DatabaseSinkConfig::validate`].
    pub fn from_options<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let millis = |name: &str, value: &str| -> Result<Duration> {
            parse_number::<u64>(COMPONENT, name, value).map(Duration::from_millis)
        };

        let mut config = Self::default();
        for (name, value) in options {
            let (name, value) = (name.as_ref(), value.as_ref());
            match name {
                "connectionURL" => config.url = value.to_string(),
                "user" => config.user = Some(value.to_string()),
                "pass" => config.password = Some(value.to_string()),
                "tableName" => config.table_name = value.to_string(),
                "batchingEnabled" => config.batching_enabled = parse_bool(COMPONENT, name, value)?,
                "batchSize" => config.batch_size = parse_number(COMPONENT, name, value)?,
                "maxRetries" => config.max_retries = parse_number(COMPONENT, name, value)?,
                "retryBaseDelayMs" => config.retry_base_delay = millis(name, value)?,
                "queueCapacity" => config.queue_capacity = parse_number(COMPONENT, name, value)?,
                "overflowPolicy" => config.overflow_policy = parse_policy(value)?,
                "idleWaitMs" => config.idle_wait = millis(name, value)?,
                "workerErrorPauseMs" => config.worker_error_pause = millis(name, value)?,
                "shutdownTimeoutMs" => config.shutdown_timeout = millis(name, value)?,
                unknown => {
                    return Err(LoggerError::config(
                        COMPONENT,
                        format!("unknown option '{}'", unknown),
                    ))
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Empty URL, a table name that is not a plain SQL identifier, or a zero
    /// batch size or queue capacity.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(LoggerError::config(COMPONENT, "connectionURL must not be empty"));
        }
        if !is_identifier(&self.table_name) {
            return Err(LoggerError::config(
                COMPONENT,
                format!("tableName '{}' is not a valid identifier", self.table_name),
            ));
        }
        if self.batch_size == 0 {
            return Err(LoggerError::config(COMPONENT, "batchSize must be greater than 0"));
        }
        if self.queue_capacity == 0 {
            return Err(LoggerError::config(COMPONENT, "queueCapacity must be greater than 0"));
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_policy(value: &str) -> Result<OverflowPolicy> {
    let value = value.trim();
    if let Some(ms) = value.strip_prefix("blockWithTimeout:") {
        let ms = parse_number::<u64>(COMPONENT, "overflowPolicy", ms)?;
        return Ok(OverflowPolicy::BlockWithTimeout(Duration::from_millis(ms)));
    }
    match value {
        "block" => Ok(OverflowPolicy::Block),
        "reject" => Ok(OverflowPolicy::Reject),
        "dropNewest" => Ok(OverflowPolicy::DropNewest),
        "dropOldest" => Ok(OverflowPolicy::DropOldest),
        other => Err(LoggerError::config(
            COMPONENT,
            format!("unknown overflowPolicy '{}'", other),
        )),
    }
}

struct Shared {
    config: DatabaseSinkConfig,
    name: String,
    connector: Box<dyn Connector>,
    /// Guards the connection and every pull from the queue
    connection: Mutex<Option<Box<dyn Connection>>>,
    queue_tx: Sender<LogRow>,
    queue_rx: Receiver<LogRow>,
    fallback: FallbackHandler,
    connection_attempts: AtomicU64,
    reconnects: AtomicU64,
}

impl Shared {
    /// Write `rows` with at most `max_retries + 1` attempts and linear backoff
    fn write_with_retry(&self, conn: &mut Option<Box<dyn Connection>>, rows: &[LogRow]) -> Result<()> {
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt: u32 = 1;

        loop {
            let result = match conn.as_mut() {
                Some(c) => c.insert_batch(&self.config.table_name, rows),
                None => Err(DbError::connection("no open connection")),
            };

            let err = match result {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                return Err(LoggerError::exhausted_retries(&self.name, attempt, err.to_string()));
            }

            thread::sleep(self.config.retry_base_delay * attempt);

            if err.is_connection() || !conn.as_ref().is_some_and(|c| c.is_valid()) {
                self.reconnect(conn);
            }
            attempt += 1;
        }
    }

    /// Replace the connection wholesale; on failure leave none
    fn reconnect(&self, conn: &mut Option<Box<dyn Connection>>) {
        if let Some(mut old) = conn.take() {
            let _ = old.close();
        }
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
        if let Ok(fresh) = self.connector.connect() {
            *conn = Some(fresh);
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Pull up to `batch_size` rows and write them as one batch
    ///
    /// Returns the number of rows taken off the queue. A batch that fails
    /// is handed back with its rows, which are no longer queued.
    fn write_next_batch(&self) -> std::result::Result<usize, FailedBatch> {
        let mut conn = self.connection.lock();
        let rows: Vec<LogRow> = self.queue_rx.try_iter().take(self.config.batch_size).collect();
        if rows.is_empty() {
            return Ok(0);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.write_with_retry(&mut conn, &rows)));
        match outcome {
            Ok(Ok(())) => Ok(rows.len()),
            Ok(Err(error)) => Err(FailedBatch { error, rows }),
            Err(panic_info) => {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                let error =
                    LoggerError::database(&self.name, format!("panic during batch insert: {}", panic_msg));
                Err(FailedBatch { error, rows })
            }
        }
    }

    /// Drain what is queued now, continuing past failed batches
    ///
    /// Takes the sink mutex at least once, so a batch the worker is writing
    /// has committed before this returns.
    fn drain(&self) -> Result<()> {
        let mut remaining = self.queue_rx.len();
        let mut first_error = None;

        loop {
            match self.write_next_batch() {
                Ok(0) => break,
                Ok(n) => remaining = remaining.saturating_sub(n),
                Err(failed) => {
                    remaining = remaining.saturating_sub(failed.rows.len());
                    self.report_lost(FailureKind::Write, &failed);
                    first_error.get_or_insert(failed.error);
                }
            }
            if remaining == 0 {
                break;
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn report(&self, kind: FailureKind, reason: impl Into<String>) {
        (self.fallback)(&FallbackReport::new(kind, "", self.name.as_str(), reason, ""));
    }

    /// One report per discarded row, naming its logger and message
    fn report_lost(&self, kind: FailureKind, failed: &FailedBatch) {
        let reason = format!(
            "batch of {} row(s) discarded: {}",
            failed.rows.len(),
            failed.error
        );
        for row in &failed.rows {
            (self.fallback)(&FallbackReport::new(
                kind,
                row.logger.as_str(),
                self.name.as_str(),
                reason.as_str(),
                row.message.as_str(),
            ));
        }
    }

    fn run_worker(&self, stop: Receiver<()>) {
        loop {
            let mut select = Select::new();
            let stop_idx = select.recv(&stop);
            select.recv(&self.queue_rx);

            match select.ready_timeout(self.config.idle_wait) {
                Ok(idx) if idx == stop_idx => break,
                Ok(_) => {}
                Err(_) => continue,
            }

            match self.write_next_batch() {
                Ok(_) => continue,
                Err(failed) => self.report_lost(FailureKind::Worker, &failed),
            }

            match stop.recv_timeout(self.config.worker_error_pause) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }
        }
    }
}

/// A batch given up on after its retries, with the rows it carried
struct FailedBatch {
    error: LoggerError,
    rows: Vec<LogRow>,
}

/// Sink that stores entries as rows in a database table
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "sqlite")]
/// # {
/// use log_pipeline::prelude::*;
/// use log_pipeline::sinks::{DatabaseSink, DatabaseSinkConfig, SqliteConnector};
///
/// let config = DatabaseSinkConfig::new(":memory:").with_batch_size(10);
/// let connector = SqliteConnector::from_config(&config);
/// let sink = DatabaseSink::new(config, connector).unwrap();
///
/// let engine = LogEngine::builder().sink(sink).build().unwrap();
/// engine.info("stored as a row");
/// engine.shutdown(std::time::Duration::from_secs(5));
/// # }
/// ```
pub struct DatabaseSink {
    shared: Arc<Shared>,
    stop_tx: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    closed: AtomicBool,
}

impl DatabaseSink {
    /// Connect and, in batched mode, start the worker thread
    ///
    /// Worker failures go to stderr; see [`DatabaseSink::with_fallback`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid config or a failed
    /// initial connection.
    pub fn new<C: Connector + 'static>(config: DatabaseSinkConfig, connector: C) -> Result<Self> {
        Self::with_fallback(config, connector, stderr_handler())
    }

    /// # Errors
    ///
    /// See [`DatabaseSink::new`].
    pub fn with_fallback<C: Connector + 'static>(
        config: DatabaseSinkConfig,
        connector: C,
        fallback: FallbackHandler,
    ) -> Result<Self> {
        config.validate()?;
        if let Some(table) = connector.table_name() {
            if table != config.table_name {
                return Err(LoggerError::config(
                    COMPONENT,
                    format!(
                        "connector creates table '{}' but rows go to '{}'",
                        table, config.table_name
                    ),
                ));
            }
        }

        let connection = connector.connect().map_err(|e| {
            LoggerError::config(COMPONENT, format!("initial connection failed: {}", e))
        })?;

        let (queue_tx, queue_rx) = bounded(config.queue_capacity);
        let batching = config.batching_enabled;
        let shared = Arc::new(Shared {
            name: format!("database:{}", config.table_name),
            config,
            connector: Box::new(connector),
            connection: Mutex::new(Some(connection)),
            queue_tx,
            queue_rx,
            fallback,
            connection_attempts: AtomicU64::new(1),
            reconnects: AtomicU64::new(0),
        });

        let (stop_tx, worker) = if batching {
            let (stop_tx, stop_rx) = bounded::<()>(1);
            let worker_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name("db-sink-worker".to_string())
                .spawn(move || worker_shared.run_worker(stop_rx))
                .map_err(|e| LoggerError::io_operation("spawn worker", "cannot start database worker", e))?;
            (Some(stop_tx), Some(handle))
        } else {
            (None, None)
        };

        Ok(Self {
            shared,
            stop_tx: Mutex::new(stop_tx),
            worker: Mutex::new(worker),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &DatabaseSinkConfig {
        &self.shared.config
    }

    /// Rows waiting in the batch queue
    pub fn pending(&self) -> usize {
        self.shared.queue_rx.len()
    }

    /// Connect calls made so far, including the initial one
    pub fn connection_attempts(&self) -> u64 {
        self.shared.connection_attempts.load(Ordering::Relaxed)
    }

    /// Successful reconnects
    pub fn reconnect_count(&self) -> u64 {
        self.shared.reconnects.load(Ordering::Relaxed)
    }

    fn enqueue(&self, row: LogRow) -> Result<()> {
        let shared = &self.shared;
        let outcome = offer(shared.config.overflow_policy, &shared.queue_tx, row, || {
            shared.queue_rx.try_recv().is_ok()
        });

        match outcome {
            Offer::Queued | Offer::Dropped => Ok(()),
            Offer::QueuedAfterEviction(n) => {
                shared.report(
                    FailureKind::Dispatch,
                    format!("queue full; evicted {} oldest row(s)", n),
                );
                Ok(())
            }
            Offer::Full => Err(LoggerError::queue_full(
                shared.queue_rx.len(),
                shared.config.queue_capacity,
            )),
            Offer::Disconnected => Err(LoggerError::sink_closed(&shared.name)),
        }
    }

    fn stop_worker(&self) {
        drop(self.stop_tx.lock().take());

        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        let timeout = self.shared.config.shutdown_timeout;
        let start = Instant::now();
        loop {
            if handle.is_finished() {
                if handle.join().is_err() {
                    self.shared.report(FailureKind::Close, "worker thread panicked");
                }
                return;
            }

            if start.elapsed() >= timeout {
                self.shared.report(
                    FailureKind::Close,
                    format!("worker did not stop within {:?}; queued rows are flushed by the caller", timeout),
                );
                return;
            }

            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Sink for DatabaseSink {
    fn write(&self, entry: &LogEntry) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LoggerError::sink_closed(&self.shared.name));
        }

        let row = LogRow::from_entry(entry);
        if self.shared.config.batching_enabled {
            self.enqueue(row)
        } else {
            let mut conn = self.shared.connection.lock();
            self.shared.write_with_retry(&mut conn, std::slice::from_ref(&row))
        }
    }

    /// Batched: drain the queue on the calling thread. Unbatched: no-op,
    /// every successful insert has already committed.
    fn flush(&self) -> Result<()> {
        if self.shared.config.batching_enabled {
            self.shared.drain()
        } else {
            Ok(())
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.stop_worker();
        let flushed = self.flush();

        let closed = match self.shared.connection.lock().take() {
            Some(mut conn) => conn
                .close()
                .map_err(|e| LoggerError::database(&self.shared.name, e.to_string())),
            None => Ok(()),
        };

        flushed.and(closed)
    }

    fn name(&self) -> &str {
        &self.shared.name
    }
}

impl Drop for DatabaseSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            self.shared.report(FailureKind::Close, e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::log_level::LogLevel;
    use std::sync::atomic::AtomicUsize;

    /// In-memory connection recording every batch it accepts
    #[derive(Clone, Default)]
    struct Recorder {
        batches: Arc<Mutex<Vec<Vec<String>>>>,
        closes: Arc<AtomicUsize>,
        failures_left: Arc<AtomicUsize>,
        connects: Arc<AtomicUsize>,
    }

    struct RecordingConnection(Recorder);

    impl Connection for RecordingConnection {
        fn insert_batch(&mut self, _table: &str, rows: &[LogRow]) -> std::result::Result<(), DbError> {
            let left = self.0.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.0.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(DbError::connection("connection reset"));
            }
            self.0
                .batches
                .lock()
                .push(rows.iter().map(|r| r.message.clone()).collect());
            Ok(())
        }

        fn is_valid(&self) -> bool {
            true
        }

        fn close(&mut self) -> std::result::Result<(), DbError> {
            self.0.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Connector for Recorder {
        fn connect(&self) -> std::result::Result<Box<dyn Connection>, DbError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingConnection(self.clone())))
        }
    }

    fn entry(message: &str) -> LogEntry {
        LogEntry::new("db-test", LogLevel::Info, message)
    }

    fn fast_config() -> DatabaseSinkConfig {
        DatabaseSinkConfig::new("mem://test")
            .with_retry_base_delay(Duration::from_millis(1))
            .with_idle_wait(Duration::from_millis(5))
            .with_worker_error_pause(Duration::from_millis(5))
    }

    #[test]
    fn test_unbatched_write_commits_immediately() {
        let recorder = Recorder::default();
        let sink = DatabaseSink::new(fast_config().with_batching(false), recorder.clone()).unwrap();

        sink.write(&entry("one")).unwrap();
        sink.write(&entry("two")).unwrap();

        assert_eq!(*recorder.batches.lock(), vec![vec!["one".to_string()], vec!["two".to_string()]]);
        assert_eq!(sink.pending(), 0);
    }

    #[test]
    fn test_reconnects_after_connection_error() {
        let recorder = Recorder::default();
        recorder.failures_left.store(2, Ordering::SeqCst);
        let sink = DatabaseSink::new(fast_config().with_batching(false), recorder.clone()).unwrap();

        sink.write(&entry("eventually")).unwrap();

        assert_eq!(recorder.batches.lock().len(), 1);
        assert_eq!(sink.reconnect_count(), 2);
        assert_eq!(sink.connection_attempts(), 3);
        assert_eq!(recorder.connects.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_retries() {
        let recorder = Recorder::default();
        recorder.failures_left.store(usize::MAX, Ordering::SeqCst);
        let sink = DatabaseSink::new(
            fast_config().with_batching(false).with_max_retries(2),
            recorder.clone(),
        )
        .unwrap();

        let err = sink.write(&entry("lost")).unwrap_err();
        assert!(err.is_exhausted_retries());
        assert!(matches!(err, LoggerError::ExhaustedRetries { attempts: 3, .. }));
    }

    #[test]
    fn test_flush_drains_in_batches_and_order() {
        let recorder = Recorder::default();
        let sink = DatabaseSink::new(
            fast_config()
                .with_batch_size(2)
                .with_idle_wait(Duration::from_secs(60)),
            recorder.clone(),
        )
        .unwrap();

        for m in ["a", "b", "c", "d", "e"] {
            sink.write(&entry(m)).unwrap();
        }
        sink.flush().unwrap();

        let batches = recorder.batches.lock();
        assert!(batches.iter().all(|b| b.len() <= 2));
        let flat: Vec<_> = batches.iter().flatten().cloned().collect();
        assert_eq!(flat, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(sink.pending(), 0);
    }

    #[test]
    fn test_failed_flush_reports_every_lost_row() {
        let recorder = Recorder::default();
        recorder.failures_left.store(1, Ordering::SeqCst);
        let reports = Arc::new(Mutex::new(Vec::new()));
        let reports_clone = Arc::clone(&reports);
        let sink = DatabaseSink::with_fallback(
            fast_config().with_max_retries(0).with_batch_size(3),
            recorder.clone(),
            Arc::new(move |r: &FallbackReport| reports_clone.lock().push(r.clone())),
        )
        .unwrap();
        sink.stop_worker();

        for m in ["r1", "r2", "r3", "r4"] {
            sink.write(&entry(m)).unwrap();
        }
        let err = sink.flush().unwrap_err();
        assert!(err.is_exhausted_retries());

        let reports = reports.lock();
        let lost: Vec<&str> = reports.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(lost, vec!["r1", "r2", "r3"]);
        assert!(reports
            .iter()
            .all(|r| r.kind == FailureKind::Write && r.logger == "db-test"));
        assert!(reports[0].reason.contains("batch of 3 row(s) discarded"));
        assert_eq!(*recorder.batches.lock(), vec![vec!["r4".to_string()]]);
    }

    #[test]
    fn test_panicking_insert_is_a_failed_batch() {
        struct Exploding;

        impl Connection for Exploding {
            fn insert_batch(&mut self, _table: &str, _rows: &[LogRow]) -> std::result::Result<(), DbError> {
                panic!("driver bug");
            }

            fn is_valid(&self) -> bool {
                true
            }

            fn close(&mut self) -> std::result::Result<(), DbError> {
                Ok(())
            }
        }

        let connector = || -> std::result::Result<Box<dyn Connection>, DbError> { Ok(Box::new(Exploding)) };
        let sink = DatabaseSink::with_fallback(fast_config(), connector, Arc::new(|_: &FallbackReport| {}))
            .unwrap();
        sink.stop_worker();

        sink.write(&entry("boom")).unwrap();
        let err = sink.flush().unwrap_err();
        assert!(err.to_string().contains("driver bug"));
        assert_eq!(sink.pending(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let recorder = Recorder::default();
        let sink = DatabaseSink::new(fast_config(), recorder.clone()).unwrap();

        sink.write(&entry("last words")).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        drop(sink);

        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        let flat: Vec<_> = recorder.batches.lock().iter().flatten().cloned().collect();
        assert_eq!(flat, vec!["last words"]);
    }

    #[test]
    fn test_write_after_close_fails() {
        let sink = DatabaseSink::new(fast_config(), Recorder::default()).unwrap();
        sink.close().unwrap();
        assert!(matches!(
            sink.write(&entry("late")).unwrap_err(),
            LoggerError::SinkClosed { .. }
        ));
    }

    #[test]
    fn test_initial_connect_failure_is_configuration_error() {
        let connector = || -> std::result::Result<Box<dyn Connection>, DbError> {
            Err(DbError::connection("host unreachable"))
        };
        let err = DatabaseSink::new(fast_config(), connector).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_reject_policy_reports_queue_full() {
        let recorder = Recorder::default();
        let sink = DatabaseSink::new(
            fast_config()
                .with_queue_capacity(1)
                .with_overflow_policy(OverflowPolicy::Reject)
                .with_idle_wait(Duration::from_secs(60)),
            recorder,
        )
        .unwrap();

        // Hold the sink mutex so the worker cannot pull
        let guard = sink.shared.connection.lock();
        sink.write(&entry("fits")).unwrap();
        let err = sink.write(&entry("overflow")).unwrap_err();
        drop(guard);

        assert!(matches!(err, LoggerError::QueueFull { max: 1, .. }));
    }

    #[test]
    fn test_config_from_options() {
        let config = DatabaseSinkConfig::from_options([
            ("connectionURL", "sqlite://logs.db"),
            ("user", "svc"),
            ("pass", "secret"),
            ("tableName", "audit_logs"),
            ("batchSize", "25"),
            ("maxRetries", "5"),
            ("retryBaseDelayMs", "250"),
            ("overflowPolicy", "blockWithTimeout:40"),
        ])
        .unwrap();

        assert_eq!(config.user.as_deref(), Some("svc"));
        assert_eq!(config.table_name, "audit_logs");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_base_delay, Duration::from_millis(250));
        assert_eq!(
            config.overflow_policy,
            OverflowPolicy::BlockWithTimeout(Duration::from_millis(40))
        );
        assert!(config.batching_enabled);

        assert!(DatabaseSinkConfig::from_options([("connectionURL", "x"), ("poolSize", "4")])
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_config_validation() {
        assert!(DatabaseSinkConfig::default().validate().is_err());
        assert!(DatabaseSinkConfig::new("x").with_table_name("logs; DROP").validate().is_err());
        assert!(DatabaseSinkConfig::new("x").with_table_name("").validate().is_err());
        assert!(DatabaseSinkConfig::new("x").with_batch_size(0).validate().is_err());
        assert!(DatabaseSinkConfig::new("x").with_queue_capacity(0).validate().is_err());
        assert!(DatabaseSinkConfig::new("x").with_table_name("_logs_2").validate().is_ok());
    }

    #[test]
    fn test_config_deserializes_camel_case() {
        let config: DatabaseSinkConfig = serde_json::from_str(
            r#"{"connectionURL": "logs.db", "tableName": "t1", "batchSize": 10, "idleWaitMs": 50}"#,
        )
        .unwrap();
        assert_eq!(config.url, "logs.db");
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.idle_wait, Duration::from_millis(50));
        assert_eq!(config.max_retries, 3);
    }
}
