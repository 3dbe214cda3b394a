//! Formatters turning a log entry into destination-agnostic text
//!
//! Provides different output formats for log entries:
//! - [`TextFormatter`]: human-readable line (default)
//! - [`JsonFormatter`]: one JSON object per line under fixed keys
//! - [`LogfmtFormatter`]: key=value pairs for log aggregation tools
//!
//! Every format renders timestamp, level, logger id, thread identity and
//! message, followed by context fields and the error chain when present.

use super::log_context::{FieldValue, LogContext};
use super::log_entry::LogEntry;
use super::timestamp::TimestampFormat;
use serde::Serialize;

/// Turns a [`LogEntry`] into its formatted representation
pub trait Formatter: Send + Sync {
    fn format(&self, entry: &LogEntry) -> String;

    fn name(&self) -> &str;
}

/// Human-readable text format
///
/// Example: `[2025-01-08T10:30:45.123Z] [INFO] [api] [main#1] Request processed | status=200`
#[derive(Debug, Clone, Default)]
pub struct TextFormatter {
    timestamp_format: TimestampFormat,
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }
}

impl Formatter for TextFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let mut line = format!(
            "[{}] [{}] [{}] [{}] {}",
            self.timestamp_format.format(&entry.timestamp),
            entry.level.to_str(),
            entry.logger,
            entry.thread,
            entry.message
        );

        if let Some(ref context) = entry.context {
            if !context.is_empty() {
                line.push_str(" | ");
                line.push_str(&context.format_fields());
            }
        }

        if let Some(ref chain) = entry.error {
            if !chain.is_empty() {
                line.push_str(" | exception: ");
                line.push_str(&chain.to_string());
            }
        }

        line
    }

    fn name(&self) -> &str {
        "text"
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: serde_json::Value,
    level: &'static str,
    logger: &'a str,
    thread: String,
    message: &'a str,
    context: Option<&'a LogContext>,
    exception: Option<&'a [String]>,
}

/// JSON format, one object per line
///
/// Keys are always `timestamp`, `level`, `logger`, `thread`, `message`,
/// `context` and `exception`, in that order; absent parts are `null`.
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    timestamp_format: TimestampFormat,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let line = JsonLine {
            timestamp: self.timestamp_format.to_json_value(&entry.timestamp),
            level: entry.level.to_str(),
            logger: &entry.logger,
            thread: entry.thread.to_string(),
            message: &entry.message,
            context: entry.context.as_ref().filter(|c| !c.is_empty()),
            exception: entry.error.as_ref().map(|chain| chain.messages()),
        };

        serde_json::to_string(&line).unwrap_or_default()
    }

    fn name(&self) -> &str {
        "json"
    }
}

/// Logfmt format (key=value pairs)
///
/// Example: `timestamp=2025-01-08T10:30:45.123Z level=INFO logger=api thread=main#1 message="Request processed"`
#[derive(Debug, Clone, Default)]
pub struct LogfmtFormatter {
    timestamp_format: TimestampFormat,
}

impl LogfmtFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Escape a logfmt key (remove spaces and special chars)
    fn escape_key(key: &str) -> String {
        key.chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || *c == '.')
            .collect()
    }

    /// Quote a logfmt value if it contains spaces, quotes or '='
    fn escape_value(value: &str) -> String {
        if value.is_empty() || value.contains(' ') || value.contains('"') || value.contains('=') {
            Self::quote_value(value)
        } else {
            value.to_string()
        }
    }

    fn quote_value(value: &str) -> String {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

impl Formatter for LogfmtFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let mut parts = vec![
            format!(
                "timestamp={}",
                Self::escape_value(&self.timestamp_format.format(&entry.timestamp))
            ),
            format!("level={}", entry.level.to_str()),
            format!("logger={}", Self::escape_value(&entry.logger)),
            format!("thread={}", Self::escape_value(&entry.thread.to_string())),
            // message is always quoted
            format!("message={}", Self::quote_value(&entry.message)),
        ];

        if let Some(ref context) = entry.context {
            for (key, value) in context.iter() {
                let formatted = match value {
                    FieldValue::String(s) => Self::quote_value(s),
                    other => other.to_string(),
                };
                parts.push(format!("{}={}", Self::escape_key(key), formatted));
            }
        }

        if let Some(ref chain) = entry.error {
            parts.push(format!("exception={}", Self::quote_value(&chain.to_string())));
        }

        parts.join(" ")
    }

    fn name(&self) -> &str {
        "logfmt"
    }
}
