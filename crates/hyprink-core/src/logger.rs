//! Leveled log lines with named presets.
//!
//! Every record is rendered as `[timestamp] [LEVEL] [scope] message` and
//! written to stderr, plus the configured log file if any. Logging never
//! fails the caller; trouble with the file target is reported through
//! `tracing` instead.

use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Local};
use crossterm::style::Stylize;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigStore, DEFAULT_TIMESTAMP_FORMAT, LoggingConfig};
use crate::paths;
use crate::reporter::Reporter;

/// Severity of a log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Very fine-grained progress.
    Trace,
    /// Progress useful when debugging.
    Debug,
    /// Normal operation.
    Info,
    /// Something unexpected that did not stop the operation.
    Warn,
    /// An operation failed.
    Error,
}

impl Level {
    /// Lowercase name, as accepted by [`Level::from_str`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a level name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A single log line before formatting.
#[derive(Debug, Clone)]
pub struct LogRecord<'a> {
    /// Severity.
    pub level: Level,
    /// Subsystem the line belongs to.
    pub scope: &'a str,
    /// Message text.
    pub message: &'a str,
    /// When the record was created.
    pub timestamp: DateTime<Local>,
}

impl<'a> LogRecord<'a> {
    /// Record stamped with the current local time.
    pub fn now(level: Level, scope: &'a str, message: &'a str) -> Self {
        Self {
            level,
            scope,
            message,
            timestamp: Local::now(),
        }
    }

    /// Render as `[timestamp] [LEVEL] [scope] message`.
    ///
    /// An invalid `timestamp_format` falls back to the default format.
    pub fn format(&self, timestamp_format: &str) -> String {
        let mut line = String::with_capacity(self.message.len() + 48);
        line.push('[');
        if write!(line, "{}", self.timestamp.format(timestamp_format)).is_err() {
            line.truncate(1);
            let _ = write!(line, "{}", self.timestamp.format(DEFAULT_TIMESTAMP_FORMAT));
        }
        let _ = write!(
            line,
            "] [{}] [{}] {}",
            self.level.tag(),
            self.scope,
            self.message
        );
        line
    }
}

/// Writes log records to the console and an optional file.
///
/// Holds its own copy of the logging settings so the app name can change
/// without touching the context's configuration.
#[derive(Debug)]
pub struct Logger {
    app_name: String,
    settings: LoggingConfig,
    file: RefCell<Option<(PathBuf, File)>>,
    warned_bad_level: Cell<bool>,
}

impl Logger {
    /// Logger for the given configuration.
    pub fn new(config: &ConfigStore) -> Self {
        Self {
            app_name: config.app_name.clone(),
            settings: config.logging.clone(),
            file: RefCell::new(None),
            warned_bad_level: Cell::new(false),
        }
    }

    /// Current app name.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Change the app name used in templates and the log file path.
    pub fn set_app_name(&mut self, name: impl Into<String>) {
        self.app_name = name.into();
    }

    /// Path of the file target after expansion, if configured.
    pub fn file_path(&self) -> Option<PathBuf> {
        let raw = self.settings.file.as_deref()?;
        Some(paths::expand_path(&self.expand(raw)))
    }

    /// Emit a record at `level`.
    pub fn log(&self, level: Level, scope: &str, message: &str) {
        if level < self.settings.min_level {
            return;
        }
        let record = LogRecord::now(level, scope, message);
        let line = record.format(&self.settings.timestamp_format);
        self.write_console(level, &line);
        self.write_file(&line);
    }

    /// Emit a record whose level is given as text.
    ///
    /// Unrecognised levels are logged at `info`.
    pub fn log_text(&self, level: &str, scope: &str, message: &str) {
        let level = self.parse_lenient(level);
        self.log(level, scope, message);
    }

    /// Emit the preset `name` from `config`, optionally replacing its message.
    pub fn log_preset(&self, config: &ConfigStore, name: &str, message: Option<&str>) {
        let Some(preset) = config.preset(name) else {
            self.log(Level::Warn, "presets", &format!("unknown preset: {name}"));
            return;
        };
        let text = match message {
            Some(m) => m.to_string(),
            None => self.expand(&preset.msg),
        };
        let scope = preset.scope.as_deref().unwrap_or(name);
        self.log(preset.level, scope, &text);
    }

    fn parse_lenient(&self, level: &str) -> Level {
        match level.parse() {
            Ok(level) => level,
            Err(e) => {
                if !self.warned_bad_level.replace(true) {
                    tracing::warn!("{e}, logging at info");
                }
                Level::Info
            }
        }
    }

    fn expand(&self, template: &str) -> String {
        template.replace("{app}", &self.app_name)
    }

    fn write_console(&self, level: Level, line: &str) {
        let stderr = std::io::stderr();
        if !self.settings.colors || !stderr.is_terminal() {
            eprintln!("{line}");
            return;
        }
        // Only the level tag is colored.
        let tag = format!("[{}]", level.tag());
        let colored = match level {
            Level::Trace => tag.clone().dark_grey(),
            Level::Debug => tag.clone().blue(),
            Level::Info => tag.clone().green(),
            Level::Warn => tag.clone().yellow(),
            Level::Error => tag.clone().red().bold(),
        };
        eprintln!("{}", line.replacen(&tag, &colored.to_string(), 1));
    }

    fn write_file(&self, line: &str) {
        let Some(path) = self.file_path() else {
            return;
        };
        let mut slot = self.file.borrow_mut();
        let stale = slot.as_ref().is_none_or(|(open, _)| *open != path);
        if stale {
            *slot = match open_append(&path) {
                Ok(file) => Some((path.clone(), file)),
                Err(e) => {
                    tracing::warn!("cannot open log file {}: {e}", path.display());
                    None
                }
            };
        }
        if let Some((_, file)) = slot.as_mut() {
            if let Err(e) = writeln!(file, "{line}") {
                tracing::warn!("cannot write log file {}: {e}", path.display());
            }
        }
    }
}

fn open_append(path: &std::path::Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

impl Reporter for Logger {
    fn phase(&self, scope: &str, title: &str) {
        self.log(Level::Debug, scope, title);
    }

    fn entry(&self, scope: &str, path: &str, current: usize, total: usize) {
        self.log(Level::Trace, scope, &format!("({current}/{total}) {path}"));
    }

    fn info(&self, scope: &str, msg: &str) {
        self.log(Level::Info, scope, msg);
    }

    fn warning(&self, scope: &str, msg: &str) {
        self.log(Level::Warn, scope, msg);
    }
}
