//! Log engine: threshold check, filter, format, dispatch

use super::{
    error::{LoggerError, Result},
    fallback::{stderr_handler, FailureKind, FallbackHandler, FallbackReport},
    filter::{AcceptAll, Filter},
    formatter::{Formatter, TextFormatter},
    log_context::LogContext,
    log_entry::LogEntry,
    log_level::LogLevel,
    metrics::EngineMetrics,
    overflow_policy::{offer, Offer, OverflowPolicy},
    sink::Sink,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Default shutdown timeout for engine cleanup (5 seconds)
///
/// Used when the last engine handle is dropped without explicit shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the async dispatch queue
pub const DEFAULT_ASYNC_CAPACITY: usize = 1024;

/// How entries reach the sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// `Sink::write` runs on the calling thread
    Sync,
    /// Entries go through a bounded queue to a single dispatcher thread
    Async { capacity: usize },
}

type SinkList = Arc<[Arc<dyn Sink>]>;

struct Pipeline {
    threshold: LogLevel,
    filter: Arc<dyn Filter>,
    formatter: Arc<dyn Formatter>,
    sinks: SinkList,
    fallback: FallbackHandler,
    metrics: Arc<EngineMetrics>,
    overflow_policy: OverflowPolicy,
    /// Taken on shutdown; async engines drop entries once it is gone
    sender: RwLock<Option<Sender<LogEntry>>>,
    asynchronous: bool,
    /// Receiver clone used only to evict under `DropOldest`
    evictor: Option<Receiver<LogEntry>>,
    dispatcher: Mutex<Option<thread::JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Pipeline {
    fn submit(&self, entry: LogEntry) {
        if self.stopped.load(Ordering::Acquire) {
            self.metrics.record_dropped();
            return;
        }

        if !self.filter.accept(&entry) {
            self.metrics.record_filtered();
            return;
        }

        entry.attach_formatted(self.formatter.format(&entry));

        let sender = self.sender.read();
        match sender.as_ref() {
            Some(sender) => self.enqueue(sender, entry),
            None if self.asynchronous => {
                self.metrics.record_dropped();
            }
            None => {
                drop(sender);
                self.metrics.record_dispatched();
                write_to_sinks(&self.sinks, &entry, &self.fallback, &self.metrics);
            }
        }
    }

    fn enqueue(&self, sender: &Sender<LogEntry>, entry: LogEntry) {
        let logger = entry.logger.clone();
        let message = entry.message.clone();

        let outcome = offer(self.overflow_policy, sender, entry, || {
            self.evictor
                .as_ref()
                .and_then(|rx| rx.try_recv().ok())
                .map(|evicted| self.report_dropped(&evicted.logger, &evicted.message, "evicted by DropOldest"))
                .is_some()
        });

        match outcome {
            Offer::Queued => {
                self.metrics.record_dispatched();
            }
            Offer::QueuedAfterEviction(_) => {
                self.metrics.record_queue_full();
                self.metrics.record_dispatched();
            }
            Offer::Dropped => {
                self.metrics.record_queue_full();
                self.metrics.record_dropped();
            }
            Offer::Full => {
                self.metrics.record_queue_full();
                let reason = LoggerError::queue_full(sender.len(), sender.capacity().unwrap_or(0));
                self.report_dropped(&logger, &message, &reason.to_string());
            }
            Offer::Disconnected => {
                self.report_dropped(&logger, &message, &LoggerError::LoggerStopped.to_string());
            }
        }
    }

    fn report_dropped(&self, logger: &str, message: &str, reason: &str) {
        self.metrics.record_dropped();
        (self.fallback)(&FallbackReport::new(
            FailureKind::Dispatch,
            logger,
            "dispatcher",
            reason,
            message,
        ));
    }

    fn flush(&self) -> Result<()> {
        let mut first_error = None;
        for sink in self.sinks.iter() {
            if let Err(e) = sink.flush() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return true;
        }

        // Close the channel so the dispatcher drains and exits
        drop(self.sender.write().take());

        let mut clean = true;
        if let Some(handle) = self.dispatcher.lock().take() {
            let start = Instant::now();
            loop {
                if handle.is_finished() {
                    if handle.join().is_err() {
                        self.report_close("dispatcher", "dispatcher thread panicked");
                        clean = false;
                    }
                    break;
                }

                if start.elapsed() >= timeout {
                    self.report_close(
                        "dispatcher",
                        &format!("dispatcher did not finish within {:?}; queued entries may be lost", timeout),
                    );
                    clean = false;
                    break;
                }

                thread::sleep(Duration::from_millis(10));
            }
        }

        for sink in self.sinks.iter() {
            if let Err(e) = sink.flush() {
                self.report_close(sink.name(), &e.to_string());
                clean = false;
            }
            if let Err(e) = sink.close() {
                self.report_close(sink.name(), &e.to_string());
                clean = false;
            }
        }

        clean
    }

    fn report_close(&self, sink: &str, reason: &str) {
        (self.fallback)(&FallbackReport::new(FailureKind::Close, "", sink, reason, ""));
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
    }
}

/// Write one entry to every sink with per-sink failure isolation
///
/// An error or panic in one sink is reported to the fallback channel and
/// does not stop the remaining sinks from receiving the entry.
fn write_to_sinks(
    sinks: &SinkList,
    entry: &LogEntry,
    fallback: &FallbackHandler,
    metrics: &EngineMetrics,
) {
    for sink in sinks.iter() {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.write(entry)));

        let reason = match result {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(panic_info) => {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                format!("sink panicked: {}", panic_msg)
            }
        };

        metrics.record_write_failure();
        fallback(&FallbackReport::new(
            FailureKind::Write,
            entry.logger.as_str(),
            sink.name(),
            reason,
            entry.message.as_str(),
        ));
    }
}

fn spawn_dispatcher(
    receiver: Receiver<LogEntry>,
    sinks: SinkList,
    fallback: FallbackHandler,
    metrics: Arc<EngineMetrics>,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("log-dispatcher".to_string())
        .spawn(move || {
            // Ends once every sender is dropped and the queue is drained
            for entry in receiver.iter() {
                write_to_sinks(&sinks, &entry, &fallback, &metrics);
            }
        })
        .map_err(|e| LoggerError::io_operation("spawn dispatcher", "cannot start dispatcher thread", e))
}

/// Level-filtered, formatted, multi-sink logging front end
///
/// Cloning is cheap; clones share sinks, dispatcher and metrics. The pipeline
/// shuts down when the last handle is dropped.
///
/// # Example
///
/// ```
/// use log_pipeline::prelude::*;
///
/// let engine = LogEngine::builder()
///     .logger_id("api")
///     .threshold(LogLevel::Debug)
///     .build()
///     .unwrap();
///
/// engine.info("Server started");
/// engine.debug("Listening on 0.0.0.0:8080");
/// ```
#[derive(Clone)]
pub struct LogEngine {
    logger_id: Arc<str>,
    pipeline: Arc<Pipeline>,
}

impl LogEngine {
    /// Create a builder for LogEngine
    #[must_use]
    pub fn builder() -> LogEngineBuilder {
        LogEngineBuilder::new()
    }

    /// Handle logging under another logger id through the same pipeline
    #[must_use]
    pub fn named(&self, logger_id: impl Into<String>) -> LogEngine {
        LogEngine {
            logger_id: Arc::from(logger_id.into()),
            pipeline: Arc::clone(&self.pipeline),
        }
    }

    pub fn logger_id(&self) -> &str {
        &self.logger_id
    }

    pub fn threshold(&self) -> LogLevel {
        self.pipeline.threshold
    }

    /// Whether entries at `level` pass the threshold
    #[inline]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level.priority() >= self.pipeline.threshold.priority()
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_full(level, message, None, None);
    }

    /// Log with structured context fields
    pub fn log_with_context(&self, level: LogLevel, message: impl Into<String>, context: LogContext) {
        self.log_full(level, message, None, Some(context));
    }

    /// Log with an error and its cause chain
    pub fn log_error(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        error: &(dyn StdError + 'static),
    ) {
        self.log_full(level, message, Some(error), None);
    }

    pub fn log_full(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        error: Option<&(dyn StdError + 'static)>,
        context: Option<LogContext>,
    ) {
        if !self.is_enabled(level) {
            return;
        }

        let mut entry = LogEntry::new(self.logger_id.as_ref(), level, message);
        if let Some(error) = error {
            entry = entry.with_error(error);
        }
        if let Some(context) = context {
            entry = entry.with_context(context);
        }

        self.pipeline.submit(entry);
    }

    #[inline]
    pub fn trace(&self, message: impl Into<String>) {
        self.log(LogLevel::Trace, message);
    }

    #[inline]
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    #[inline]
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    #[inline]
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    #[inline]
    pub fn fatal(&self, message: impl Into<String>) {
        self.log(LogLevel::Fatal, message);
    }

    /// Get the engine metrics
    pub fn metrics(&self) -> &EngineMetrics {
        &self.pipeline.metrics
    }

    /// Flush every sink, returning the first error
    ///
    /// In async mode entries still queued for the dispatcher are not awaited;
    /// use [`LogEngine::shutdown`] to drain them.
    pub fn flush(&self) -> Result<()> {
        self.pipeline.flush()
    }

    /// Drain the dispatcher, then flush and close every sink
    ///
    /// Returns `true` if shutdown completed within `timeout` without errors.
    /// Failures are reported to the fallback channel. Later calls return
    /// `true` immediately and later log calls are dropped.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.pipeline.shutdown(timeout)
    }
}

/// Builder for constructing LogEngine with a fluent API
///
/// Formatter, filter, threshold, sinks and dispatch mode are fixed once the
/// engine is built.
///
/// # Example
/// ```
/// use log_pipeline::prelude::*;
/// use std::sync::Arc;
///
/// let engine = LogEngine::builder()
///     .threshold(LogLevel::Debug)
///     .formatter(JsonFormatter::new())
///     .async_mode(1000)
///     .overflow_policy(OverflowPolicy::Reject)
///     .fallback(Arc::new(|report: &FallbackReport| eprintln!("{}", report)))
///     .build()
///     .unwrap();
/// ```
pub struct LogEngineBuilder {
    logger_id: String,
    threshold: LogLevel,
    filter: Arc<dyn Filter>,
    formatter: Arc<dyn Formatter>,
    sinks: Vec<Arc<dyn Sink>>,
    mode: DispatchMode,
    overflow_policy: OverflowPolicy,
    fallback: FallbackHandler,
}

impl LogEngineBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            logger_id: "root".to_string(),
            threshold: LogLevel::Info,
            filter: Arc::new(AcceptAll),
            formatter: Arc::new(TextFormatter::default()),
            sinks: Vec::new(),
            mode: DispatchMode::Sync,
            overflow_policy: OverflowPolicy::Reject,
            fallback: stderr_handler(),
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn logger_id(mut self, logger_id: impl Into<String>) -> Self {
        self.logger_id = logger_id.into();
        self
    }

    /// Set minimum log level
    #[must_use = "builder methods return a new value"]
    pub fn threshold(mut self, level: LogLevel) -> Self {
        self.threshold = level;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn filter<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn formatter<F: Formatter + 'static>(mut self, formatter: F) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    /// Add a sink
    #[must_use = "builder methods return a new value"]
    pub fn sink<S: Sink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Add a sink the caller keeps a handle to
    #[must_use = "builder methods return a new value"]
    pub fn shared_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Enable async mode with the given queue capacity
    ///
    /// If not called, the engine dispatches synchronously.
    #[must_use = "builder methods return a new value"]
    pub fn async_mode(mut self, capacity: usize) -> Self {
        self.mode = DispatchMode::Async { capacity };
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the policy for a full async queue. Default is `Reject`.
    #[must_use = "builder methods return a new value"]
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Set the fallback handler. Default writes to stderr.
    #[must_use = "builder methods return a new value"]
    pub fn fallback(mut self, handler: FallbackHandler) -> Self {
        self.fallback = handler;
        self
    }

    /// Build the LogEngine
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero async capacity, or an IO
    /// error if the dispatcher thread cannot be started.
    pub fn build(self) -> Result<LogEngine> {
        let sinks: SinkList = self.sinks.into();
        let metrics = Arc::new(EngineMetrics::new());

        let (sender, evictor, dispatcher) = match self.mode {
            DispatchMode::Sync => (None, None, None),
            DispatchMode::Async { capacity } => {
                if capacity == 0 {
                    return Err(LoggerError::config("LogEngine", "async capacity must be greater than 0"));
                }
                let (sender, receiver) = bounded(capacity);
                let evictor = matches!(self.overflow_policy, OverflowPolicy::DropOldest)
                    .then(|| receiver.clone());
                let handle = spawn_dispatcher(
                    receiver,
                    Arc::clone(&sinks),
                    Arc::clone(&self.fallback),
                    Arc::clone(&metrics),
                )?;
                (Some(sender), evictor, Some(handle))
            }
        };

        Ok(LogEngine {
            logger_id: Arc::from(self.logger_id),
            pipeline: Arc::new(Pipeline {
                threshold: self.threshold,
                filter: self.filter,
                formatter: self.formatter,
                sinks,
                fallback: self.fallback,
                metrics,
                overflow_policy: self.overflow_policy,
                asynchronous: sender.is_some(),
                sender: RwLock::new(sender),
                evictor,
                dispatcher: Mutex::new(dispatcher),
                stopped: AtomicBool::new(false),
            }),
        })
    }
}

impl Default for LogEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
