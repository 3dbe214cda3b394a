//! Fallback channel for failures the pipeline cannot record itself
//!
//! Sync write failures, async dispatch failures, database worker failures and
//! close-time failures all end up here instead of reaching application code.

use std::fmt;
use std::sync::Arc;

/// Where in the pipeline a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// `Sink::write` failed on the caller's thread or the dispatcher
    Write,
    /// The entry never reached a sink (queue full, engine stopped)
    Dispatch,
    /// A sink's background worker failed
    Worker,
    /// Flushing or releasing resources failed during shutdown
    Close,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Write => write!(f, "write"),
            FailureKind::Dispatch => write!(f, "dispatch"),
            FailureKind::Worker => write!(f, "worker"),
            FailureKind::Close => write!(f, "close"),
        }
    }
}

/// One failure delivered to the fallback channel
#[derive(Debug, Clone)]
pub struct FallbackReport {
    pub kind: FailureKind,
    pub logger: String,
    pub sink: String,
    pub reason: String,
    /// Original log message, empty when the failure is not tied to one entry
    pub message: String,
}

impl FallbackReport {
    pub fn new(
        kind: FailureKind,
        logger: impl Into<String>,
        sink: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            logger: logger.into(),
            sink: sink.into(),
            reason: reason.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FallbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            FailureKind::Close => "[LOGGER WARNING]",
            _ => "[LOGGER ERROR]",
        };
        write!(
            f,
            "{} {} failure in sink '{}' for logger '{}': {}",
            prefix, self.kind, self.sink, self.logger, self.reason
        )?;
        if !self.message.is_empty() {
            write!(f, " (original message: {})", self.message)?;
        }
        Ok(())
    }
}

/// Callback receiving fallback reports
pub type FallbackHandler = Arc<dyn Fn(&FallbackReport) + Send + Sync>;

/// Default handler: one line per failure on stderr
pub fn stderr_handler() -> FallbackHandler {
    Arc::new(|report: &FallbackReport| eprintln!("{}", report))
}
