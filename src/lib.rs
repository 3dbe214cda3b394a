//! # Log Pipeline
//!
//! A level-filtered, multi-destination logging pipeline with a rotating file
//! sink and a batched, retrying database sink.
//!
//! ## Features
//!
//! - **Fast Threshold Check**: entries below the engine's level cost nothing
//! - **Pluggable Stages**: filters, formatters (text, JSON, logfmt) and sinks
//! - **Sync or Async Dispatch**: inline writes or a bounded dispatcher queue
//! - **File Rotation**: size-based with a numbered backup ring
//! - **Database Sink**: batching, linear-backoff retry and reconnection
//!
//! ## Example
//!
//! ```no_run
//! use log_pipeline::prelude::*;
//! use log_pipeline::sinks::{FileSink, FileSinkConfig};
//!
//! let engine = LogEngine::builder()
//!     .logger_id("app")
//!     .threshold(LogLevel::Debug)
//!     .sink(FileSink::new(FileSinkConfig::new("logs/app.log"))?)
//!     .build()?;
//!
//! engine.info("Application started");
//! # Ok::<(), LoggerError>(())
//! ```

pub mod core;
pub mod macros;
pub mod sinks;

pub mod prelude {
    pub use crate::core::{
        FallbackHandler, FallbackReport, FieldValue, Filter, Formatter, JsonFormatter, LogContext,
        LogEngine, LogEngineBuilder, LogEntry, LogLevel, LogfmtFormatter, LoggerError, OverflowPolicy,
        Result, Sink, TextFormatter, TimestampFormat, DEFAULT_SHUTDOWN_TIMEOUT,
    };
}

pub use core::{
    AcceptAll, DispatchMode, EngineMetrics, ErrorChain, FailureKind, FallbackHandler,
    FallbackReport, FieldValue, Filter, Formatter, JsonFormatter, LogContext, LogEngine,
    LogEngineBuilder, LogEntry, LogLevel, LogfmtFormatter, LoggerError, LoggerFilter,
    OverflowPolicy, Result, SamplingConfig, SamplingFilter, Sink, TextFormatter, ThreadIdentity,
    TimestampFormat, DEFAULT_ASYNC_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use sinks::{DatabaseSink, DatabaseSinkConfig, FileSink, FileSinkConfig};
