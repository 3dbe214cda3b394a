//! Error types for the logging pipeline

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// Invalid configuration with details. Fatal at sink construction.
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A single write attempt failed
    #[error("Write to '{sink}' failed: {message}")]
    Write { sink: String, message: String },

    /// File rotation error
    #[error("File rotation failed for '{path}': {message}")]
    FileRotationError { path: String, message: String },

    /// Database write error (one attempt)
    #[error("Database error on '{sink}': {message}")]
    Database { sink: String, message: String },

    /// Write error surfaced once the retry budget is spent
    #[error("Write to '{sink}' failed after {attempts} attempts (retries exhausted): {last_error}")]
    ExhaustedRetries {
        sink: String,
        attempts: u32,
        last_error: String,
    },

    /// Sink was already closed
    #[error("Sink '{sink}' is closed")]
    SinkClosed { sink: String },

    /// Bounded queue full with buffer details
    #[error("Log queue full: {current}/{max} entries buffered")]
    QueueFull { current: usize, max: usize },

    /// Engine already shut down
    #[error("Logger already stopped")]
    LoggerStopped,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl LoggerError {
    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create a write error for one failed attempt
    pub fn write(sink: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::Write {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Create a file rotation error
    pub fn file_rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::FileRotationError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn database(sink: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::Database {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Create a retries-exhausted error
    pub fn exhausted_retries(
        sink: impl Into<String>,
        attempts: u32,
        last_error: impl Into<String>,
    ) -> Self {
        LoggerError::ExhaustedRetries {
            sink: sink.into(),
            attempts,
            last_error: last_error.into(),
        }
    }

    pub fn sink_closed(sink: impl Into<String>) -> Self {
        LoggerError::SinkClosed { sink: sink.into() }
    }

    /// Create a queue full error with buffer details
    pub fn queue_full(current: usize, max: usize) -> Self {
        LoggerError::QueueFull { current, max }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LoggerError::Other(msg.into())
    }

    /// True for errors raised while constructing a sink
    pub fn is_configuration(&self) -> bool {
        matches!(self, LoggerError::InvalidConfiguration { .. })
    }

    pub fn is_exhausted_retries(&self) -> bool {
        matches!(self, LoggerError::ExhaustedRetries { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LoggerError::queue_full(100, 1000);
        assert!(matches!(err, LoggerError::QueueFull { .. }));

        let err = LoggerError::config("FileSink", "Invalid path");
        assert!(err.is_configuration());

        let err = LoggerError::exhausted_retries("database", 4, "disk I/O error");
        assert!(err.is_exhausted_retries());
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_error_display() {
        let err = LoggerError::queue_full(100, 1000);
        assert_eq!(err.to_string(), "Log queue full: 100/1000 entries buffered");

        let err = LoggerError::file_rotation("/var/log/app.log", "Disk full");
        assert_eq!(
            err.to_string(),
            "File rotation failed for '/var/log/app.log': Disk full"
        );

        let err = LoggerError::exhausted_retries("database", 4, "locked");
        assert_eq!(
            err.to_string(),
            "Write to 'database' failed after 4 attempts (retries exhausted): locked"
        );
    }

    #[test]
    fn test_io_operation_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = LoggerError::io_operation("writing log file", "cannot write to file", io_err);

        assert!(matches!(err, LoggerError::IoOperation { .. }));
        assert!(err.to_string().contains("writing log file"));
        assert!(err.to_string().contains("cannot write to file"));
    }
}
