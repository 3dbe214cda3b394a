//! Log entry structure

use super::formatter::{Formatter, TextFormatter};
use super::log_context::LogContext;
use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

// Thread-local cache for thread identity to avoid repeated allocations
thread_local! {
    static THREAD_IDENTITY: RefCell<Option<ThreadIdentity>> = const { RefCell::new(None) };
}

/// Escape newlines, carriage returns and tabs so one entry stays one line
pub(crate) fn sanitize(text: &str) -> String {
    if !text.contains(['\n', '\r', '\t']) {
        return text.to_string();
    }
    text.replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

/// Name and process-unique numeric id of the thread that created an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadIdentity {
    pub name: String,
    pub id: u64,
}

impl ThreadIdentity {
    pub fn new(name: impl Into<String>, id: u64) -> Self {
        Self {
            name: sanitize(&name.into()),
            id,
        }
    }

    /// Identity of the calling thread, computed once per thread
    pub fn current() -> Self {
        THREAD_IDENTITY.with(|cache| {
            cache
                .borrow_mut()
                .get_or_insert_with(|| {
                    let thread = std::thread::current();
                    ThreadIdentity {
                        name: sanitize(thread.name().unwrap_or("unnamed")),
                        id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
                    }
                })
                .clone()
        })
    }
}

impl fmt::Display for ThreadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// An error and its `source()` chain, outermost first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorChain(Vec<String>);

impl ErrorChain {
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut messages = vec![sanitize(&error.to_string())];
        let mut source = error.source();
        while let Some(cause) = source {
            messages.push(sanitize(&cause.to_string()));
            source = cause.source();
        }
        ErrorChain(messages)
    }

    pub fn from_messages<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ErrorChain(
            messages
                .into_iter()
                .map(|m| sanitize(&m.into()))
                .collect(),
        )
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ErrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("; caused by: "))
    }
}

#[derive(Debug)]
pub struct LogEntry {
    pub logger: String,
    pub level: LogLevel,
    pub message: String,
    pub error: Option<ErrorChain>,
    pub context: Option<LogContext>,
    pub timestamp: DateTime<Utc>,
    pub thread: ThreadIdentity,
    formatted: OnceLock<String>,
}

impl LogEntry {
    pub fn new(logger: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            logger: sanitize(&logger.into()),
            level,
            message: sanitize(&message.into()),
            error: None,
            context: None,
            timestamp: Utc::now(),
            thread: ThreadIdentity::current(),
            formatted: OnceLock::new(),
        }
    }

    pub fn with_context(mut self, context: LogContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_error(mut self, error: &(dyn StdError + 'static)) -> Self {
        self.error = Some(ErrorChain::from_error(error));
        self
    }

    pub fn with_error_chain(mut self, chain: ErrorChain) -> Self {
        self.error = Some(chain);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_thread(mut self, thread: ThreadIdentity) -> Self {
        self.thread = thread;
        self
    }

    /// Attach the formatted representation. Only the first call has effect.
    ///
    /// Returns `false` when text was already attached.
    pub fn attach_formatted(&self, text: String) -> bool {
        self.formatted.set(text).is_ok()
    }

    pub fn is_formatted(&self) -> bool {
        self.formatted.get().is_some()
    }

    /// Formatted text, falling back to the default text format
    pub fn formatted(&self) -> &str {
        self.formatted
            .get_or_init(|| TextFormatter::default().format(self))
    }
}
