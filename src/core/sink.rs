//! Sink trait for log output destinations

use super::{error::Result, log_entry::LogEntry};

/// A destination that durably records formatted log entries
///
/// Each implementation guards its own mutable state, so a sink can be shared
/// between producer threads and the engine's dispatcher as `Arc<dyn Sink>`.
pub trait Sink: Send + Sync {
    fn write(&self, entry: &LogEntry) -> Result<()>;

    fn flush(&self) -> Result<()>;

    /// Release the sink's resources. Calls after the first are no-ops.
    fn close(&self) -> Result<()>;

    fn name(&self) -> &str;
}
