//! Filters deciding whether an entry continues down the pipeline
//!
//! A filter runs after the threshold check and before formatting. Rejected
//! entries are discarded silently.

use super::log_context::FieldValue;
use super::log_entry::LogEntry;
use super::log_level::LogLevel;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Predicate over a log entry
pub trait Filter: Send + Sync {
    fn accept(&self, entry: &LogEntry) -> bool;
}

/// Accepts every entry (the engine default)
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Filter for AcceptAll {
    #[inline]
    fn accept(&self, _entry: &LogEntry) -> bool {
        true
    }
}

impl<F> Filter for F
where
    F: Fn(&LogEntry) -> bool + Send + Sync,
{
    fn accept(&self, entry: &LogEntry) -> bool {
        self(entry)
    }
}

/// Accepts entries whose logger id starts with one of the given prefixes
///
/// Entries at or above `always_level` pass regardless of logger.
#[derive(Debug, Clone)]
pub struct LoggerFilter {
    prefixes: Vec<String>,
    always_level: LogLevel,
}

impl LoggerFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            always_level: LogLevel::Error,
        }
    }

    #[must_use]
    pub fn with_always_level(mut self, level: LogLevel) -> Self {
        self.always_level = level;
        self
    }
}

impl Filter for LoggerFilter {
    fn accept(&self, entry: &LogEntry) -> bool {
        entry.level >= self.always_level
            || self.prefixes.iter().any(|p| entry.logger.starts_with(p.as_str()))
    }
}

/// Configuration for log sampling
///
/// # Example
///
/// ```
/// use log_pipeline::core::{LogLevel, SamplingConfig};
///
/// // Sample 10% of logs, but always log warnings and above
/// let config = SamplingConfig::new(0.1)
///     .with_always_sample(vec![LogLevel::Warn, LogLevel::Error, LogLevel::Fatal])
///     .with_category_rate("http", 0.01);
/// ```
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    /// Sample rate between 0.0 and 1.0
    pub rate: f64,

    /// Log levels that are never sampled (always logged)
    pub always_sample: Vec<LogLevel>,

    /// Per-category sample rates, keyed by the `category` context field
    pub category_rates: HashMap<String, f64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            always_sample: vec![LogLevel::Error, LogLevel::Fatal],
            category_rates: HashMap::new(),
        }
    }
}

impl SamplingConfig {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Set the levels that should always be logged
    #[must_use]
    pub fn with_always_sample(mut self, levels: Vec<LogLevel>) -> Self {
        self.always_sample = levels;
        self
    }

    /// Add a category-specific sample rate
    #[must_use]
    pub fn with_category_rate(mut self, category: impl Into<String>, rate: f64) -> Self {
        self.category_rates.insert(category.into(), rate.clamp(0.0, 1.0));
        self
    }
}

/// Random sampling filter
///
/// Levels listed in `always_sample` bypass sampling. Counters are atomic so
/// the filter can be shared by every producer thread.
#[derive(Debug)]
pub struct SamplingFilter {
    config: SamplingConfig,
    sampled: AtomicU64,
    dropped: AtomicU64,
}

impl SamplingFilter {
    pub fn new(config: SamplingConfig) -> Self {
        Self {
            config,
            sampled: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn sampled_count(&self) -> u64 {
        self.sampled.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn effective_rate(&self, entry: &LogEntry) -> f64 {
        let category = entry.context.as_ref().and_then(|c| match c.get("category") {
            Some(FieldValue::String(s)) => Some(s.as_str()),
            _ => None,
        });

        category
            .and_then(|cat| self.config.category_rates.get(cat).copied())
            .unwrap_or(self.config.rate)
    }

    fn record(&self, sampled: bool) -> bool {
        if sampled {
            self.sampled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        sampled
    }
}

impl Filter for SamplingFilter {
    fn accept(&self, entry: &LogEntry) -> bool {
        if self.config.always_sample.contains(&entry.level) {
            return self.record(true);
        }

        let rate = self.effective_rate(entry);
        if rate >= 1.0 {
            return self.record(true);
        }
        if rate <= 0.0 {
            return self.record(false);
        }

        self.record(rand::thread_rng().gen::<f64>() < rate)
    }
}
