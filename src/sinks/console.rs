//! Console sink implementation

use crate::core::{LogEntry, Result, Sink};
use colored::Colorize;
use std::io::Write;

/// Prints formatted lines; Error and Fatal go to stderr, the rest to stdout
pub struct ConsoleSink {
    use_colors: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self { use_colors: true }
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    fn render(&self, entry: &LogEntry) -> String {
        if self.use_colors {
            entry.formatted().color(entry.level.color_code()).to_string()
        } else {
            entry.formatted().to_string()
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ConsoleSink {
    fn write(&self, entry: &LogEntry) -> Result<()> {
        let line = self.render(entry);
        if entry.level.is_critical() {
            writeln!(std::io::stderr().lock(), "{}", line)?;
        } else {
            writeln!(std::io::stdout().lock(), "{}", line)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // Flush both stdout and stderr since we write to both
        std::io::stdout().flush()?;
        std::io::stderr().flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.flush()
    }

    fn name(&self) -> &str {
        "console"
    }
}
