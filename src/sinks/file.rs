//! File sink with size-based rotation
//!
//! The active file lives at `path`; rotated backups are `path.1` (newest)
//! through `path.N` (oldest).

use super::{parse_bool, parse_number};
use crate::core::error::{LoggerError, Result};
use crate::core::log_entry::LogEntry;
use crate::core::log_level::LogLevel;
use crate::core::sink::Sink;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const COMPONENT: &str = "FileSink";

/// Configuration for [`FileSink`]
///
/// # Examples
///
/// ```
/// use log_pipeline::sinks::FileSinkConfig;
///
/// let config = FileSinkConfig::new("logs/app.log")
///     .with_max_file_size(50 * 1024 * 1024)
///     .with_max_backups(7)
///     .with_buffered(false);
/// assert!(config.validate().is_ok());
///
/// let parsed = FileSinkConfig::from_options([
///     ("path", "logs/app.log"),
///     ("maxFileSizeBytes", "1048576"),
/// ])
/// .unwrap();
/// assert_eq!(parsed.max_file_size, 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct FileSinkConfig {
    pub path: PathBuf,
    pub rotation_enabled: bool,
    #[serde(rename = "maxFileSizeBytes")]
    pub max_file_size: u64,
    pub max_backups: usize,
    /// When false every line is flushed immediately
    pub buffered: bool,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs/application.log"),
            rotation_enabled: true,
            max_file_size: 10 * 1024 * 1024, // 10 MB
            max_backups: 5,
            buffered: true,
        }
    }
}

impl FileSinkConfig {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_rotation(mut self, enabled: bool) -> Self {
        self.rotation_enabled = enabled;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_buffered(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    /// Build a config from `(name, value)` option pairs
    ///
    /// Recognized names: `path`, `rotationEnabled`, `maxFileSizeBytes`,
    /// `maxBackups`, `buffered`. Options not given keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown name, an unparsable value,
    /// or a config that fails [`FileSinkConfig::validate`].
    pub fn from_options<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (name, value) in options {
            let (name, value) = (name.as_ref(), value.as_ref());
            match name {
                "path" => config.path = PathBuf::from(value),
                "rotationEnabled" => config.rotation_enabled = parse_bool(COMPONENT, name, value)?,
                "maxFileSizeBytes" => config.max_file_size = parse_number(COMPONENT, name, value)?,
                "maxBackups" => config.max_backups = parse_number(COMPONENT, name, value)?,
                "buffered" => config.buffered = parse_bool(COMPONENT, name, value)?,
                unknown => {
                    return Err(LoggerError::config(
                        COMPONENT,
                        format!("unknown option '{}'", unknown),
                    ))
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Empty path, or zero max file size while rotation is enabled.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(LoggerError::config(COMPONENT, "path must not be empty"));
        }
        if self.rotation_enabled && self.max_file_size == 0 {
            return Err(LoggerError::config(
                COMPONENT,
                "maxFileSizeBytes must be greater than 0 when rotation is enabled",
            ));
        }
        Ok(())
    }
}

struct FileState {
    writer: Option<BufWriter<File>>,
    current_size: u64,
    closed: bool,
}

/// Appends formatted lines to a file and rotates it by size
///
/// All writes, flushes, rotations and close go through one mutex, so lines
/// from concurrent callers never interleave.
///
/// # Examples
///
/// ```no_run
/// use log_pipeline::prelude::*;
/// use log_pipeline::sinks::{FileSink, FileSinkConfig};
///
/// let sink = FileSink::new(FileSinkConfig::new("/var/log/app.log").with_max_backups(3)).unwrap();
/// let engine = LogEngine::builder().sink(sink).build().unwrap();
/// engine.info("Application started");
/// ```
pub struct FileSink {
    config: FileSinkConfig,
    name: String,
    state: Mutex<FileState>,
    rotations: AtomicU64,
}

impl FileSink {
    /// Open (or create) the active file in append mode
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config is invalid, the parent
    /// directory cannot be created, or the file cannot be opened.
    pub fn new(config: FileSinkConfig) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                LoggerError::config(
                    COMPONENT,
                    format!("Failed to create directory '{}': {}", parent.display(), e),
                )
            })?;
        }

        let (file, current_size) = open_append(&config.path).map_err(|e| {
            LoggerError::config(
                COMPONENT,
                format!("Failed to open '{}': {}", config.path.display(), e),
            )
        })?;

        Ok(Self {
            name: format!("file:{}", config.path.display()),
            config,
            state: Mutex::new(FileState {
                writer: Some(BufWriter::new(file)),
                current_size,
                closed: false,
            }),
            rotations: AtomicU64::new(0),
        })
    }

    /// Shorthand for a default config at `path`
    ///
    /// # Errors
    ///
    /// See [`FileSink::new`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(FileSinkConfig::new(path.as_ref()))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    #[must_use]
    pub fn config(&self) -> &FileSinkConfig {
        &self.config
    }

    /// Bytes written to the active file since it was opened or rotated
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.state.lock().current_size
    }

    #[must_use]
    pub fn rotation_count(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Get backup file path for given index
    #[must_use]
    pub fn backup_path(&self, index: usize) -> PathBuf {
        let mut path = self.config.path.clone();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("application.log")
            .to_string();
        path.set_file_name(format!("{}.{}", filename, index));
        path
    }

    fn should_rotate(&self, state: &FileState) -> bool {
        self.config.rotation_enabled && state.current_size >= self.config.max_file_size
    }

    fn rotate(&self, state: &mut FileState) -> Result<()> {
        let base = self.config.path.display().to_string();

        // Explicitly drop writer to release file handle before renaming
        if let Some(mut writer) = state.writer.take() {
            writer.flush().map_err(|e| {
                LoggerError::file_rotation(&base, format!("Failed to flush before rotation: {}", e))
            })?;
        }

        let max_backups = self.config.max_backups;
        for i in (1..max_backups).rev() {
            let old_path = self.backup_path(i);
            if !old_path.exists() {
                continue;
            }
            if i == max_backups - 1 {
                let oldest = self.backup_path(max_backups);
                if oldest.exists() {
                    fs::remove_file(&oldest).map_err(|e| {
                        LoggerError::file_rotation(
                            oldest.display().to_string(),
                            format!("Failed to remove oldest backup: {}", e),
                        )
                    })?;
                }
            }
            rename_replacing(&old_path, &self.backup_path(i + 1))?;
        }

        if self.config.path.exists() {
            if max_backups == 0 {
                fs::remove_file(&self.config.path).map_err(|e| {
                    LoggerError::file_rotation(&base, format!("Failed to discard active file: {}", e))
                })?;
            } else {
                rename_replacing(&self.config.path, &self.backup_path(1))?;
            }
        }

        let (file, _) = open_append(&self.config.path).map_err(|e| {
            LoggerError::file_rotation(&base, format!("Failed to create new log file: {}", e))
        })?;
        state.writer = Some(BufWriter::new(file));
        state.current_size = 0;
        self.rotations.fetch_add(1, Ordering::Relaxed);

        let target = if max_backups == 0 {
            "previous content discarded".to_string()
        } else {
            format!("previous content moved to {}", self.backup_path(1).display())
        };
        let marker = LogEntry::new(COMPONENT, LogLevel::Info, format!("Log file rotated; {}", target));
        self.append_line(state, marker.formatted())
    }

    fn append_line(&self, state: &mut FileState, line: &str) -> Result<()> {
        let writer = state
            .writer
            .as_mut()
            .ok_or_else(|| LoggerError::write(&self.name, "Writer not initialized"))?;

        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .map_err(|e| LoggerError::write(&self.name, format!("Failed to write log entry: {}", e)))?;

        state.current_size += line.len() as u64 + 1;
        Ok(())
    }

    /// Restore a usable handle after a failed rotation
    fn recover(&self, state: &mut FileState) {
        if state.writer.is_some() {
            return;
        }
        match open_append(&self.config.path) {
            Ok((file, size)) => {
                state.writer = Some(BufWriter::new(file));
                state.current_size = size;
            }
            Err(e) => eprintln!(
                "[LOGGER ERROR] Failed to reopen '{}' after rotation failure: {}",
                self.config.path.display(),
                e
            ),
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata()?.len();
    Ok((file, size))
}

fn rename_replacing(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    // On some platforms rename fails if the destination exists
    if to.exists() {
        let _ = fs::remove_file(to);
    }
    fs::rename(from, to).map_err(|e| {
        LoggerError::file_rotation(
            from.display().to_string(),
            format!("Failed to rename to '{}': {}", to.display(), e),
        )
    })
}

impl Sink for FileSink {
    fn write(&self, entry: &LogEntry) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(LoggerError::sink_closed(&self.name));
        }

        if self.should_rotate(&state) {
            if let Err(e) = self.rotate(&mut state) {
                self.recover(&mut state);
                return Err(LoggerError::write(&self.name, e.to_string()));
            }
        }

        self.append_line(&mut state, entry.formatted())?;

        if !self.config.buffered || entry.level.is_critical() {
            if let Some(writer) = state.writer.as_mut() {
                writer
                    .flush()
                    .map_err(|e| LoggerError::write(&self.name, format!("Failed to flush: {}", e)))?;
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(writer) = state.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| LoggerError::write(&self.name, format!("Failed to flush: {}", e)))?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        if let Some(mut writer) = state.writer.take() {
            writer
                .flush()
                .map_err(|e| LoggerError::write(&self.name, format!("Failed to flush on close: {}", e)))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        // Best effort flush; the handle is released with the writer
        if let Some(mut writer) = self.state.get_mut().writer.take() {
            let _ = writer.flush();
        }
    }
}
