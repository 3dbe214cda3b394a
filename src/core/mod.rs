//! Core pipeline types and traits

pub mod engine;
pub mod error;
pub mod fallback;
pub mod filter;
pub mod formatter;
pub mod log_context;
pub mod log_entry;
pub mod log_level;
pub mod metrics;
pub mod overflow_policy;
pub mod sink;
pub mod timestamp;

pub use engine::{
    DispatchMode, LogEngine, LogEngineBuilder, DEFAULT_ASYNC_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use error::{LoggerError, Result};
pub use fallback::{stderr_handler, FailureKind, FallbackHandler, FallbackReport};
pub use filter::{AcceptAll, Filter, LoggerFilter, SamplingConfig, SamplingFilter};
pub use formatter::{Formatter, JsonFormatter, LogfmtFormatter, TextFormatter};
pub use log_context::{FieldValue, LogContext};
pub use log_entry::{ErrorChain, LogEntry, ThreadIdentity};
pub use log_level::LogLevel;
pub use metrics::EngineMetrics;
pub use overflow_policy::OverflowPolicy;
pub use sink::Sink;
pub use timestamp::TimestampFormat;
