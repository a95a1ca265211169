//! Error taxonomy shared by every fallible operation, and the per-context
//! slot holding the last failure message.

#![deny(missing_docs)]

use std::path::{Path, PathBuf};

use hyprink_schema::FormatError;
use thiserror::Error;

/// Closed set of failure classes, each with a stable status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input path does not exist or has the wrong type.
    NotFound,
    /// Read or write failure.
    IoError,
    /// Not a package, unsupported version, or malformed manifest.
    InvalidFormat,
    /// Checksums or lengths do not match.
    CorruptData,
    /// Refused to overwrite an existing entry.
    PathConflict,
    /// Configuration could not be loaded.
    ConfigError,
    /// Anything else, including misuse of the foreign boundary.
    Unknown,
}

impl ErrorKind {
    /// Status code returned across the foreign boundary. Zero is success.
    pub fn status_code(self) -> i32 {
        match self {
            Self::NotFound => 1,
            Self::IoError => 2,
            Self::InvalidFormat => 3,
            Self::CorruptData => 4,
            Self::PathConflict => 5,
            Self::ConfigError => 6,
            Self::Unknown => 7,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::IoError => "io_error",
            Self::InvalidFormat => "invalid_format",
            Self::CorruptData => "corrupt_data",
            Self::PathConflict => "path_conflict",
            Self::ConfigError => "config_error",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by hyprink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A source file, package or directory does not exist.
    #[error("{what} not found: {}", path.display())]
    NotFound {
        /// What was being looked for, e.g. "package".
        what: &'static str,
        /// The missing path.
        path: PathBuf,
    },

    /// A filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being done, e.g. "reading demo.pkg".
        context: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a readable package: bad magic, version, header or
    /// manifest.
    #[error("invalid package {}: {reason}", path.display())]
    InvalidFormat {
        /// The package file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The package parses but its content does not match its digests.
    #[error("corrupt package {}: {reason}", path.display())]
    CorruptData {
        /// The package file.
        path: PathBuf,
        /// Which digest failed.
        reason: String,
    },

    /// An existing entry would be replaced without permission.
    #[error("refusing to overwrite existing entry: {}", path.display())]
    PathConflict {
        /// The entry that is in the way.
        path: PathBuf,
    },

    /// Configuration could not be used.
    #[error("config error: {0}")]
    Config(String),

    /// Anything else.
    #[error("{0}")]
    Unknown(String),
}

impl Error {
    /// I/O failure with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Attribute a format error to the package at `path`.
    pub fn format(path: &Path, err: FormatError) -> Self {
        match err {
            FormatError::Io(source) => Self::io(format!("reading {}", path.display()), source),
            e if e.is_corruption() => Self::CorruptData {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
            e => Self::InvalidFormat {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        }
    }

    /// The failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Io { .. } => ErrorKind::IoError,
            Self::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            Self::CorruptData { .. } => ErrorKind::CorruptData,
            Self::PathConflict { .. } => ErrorKind::PathConflict,
            Self::Config(_) => ErrorKind::ConfigError,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Shorthand for `self.kind().status_code()`.
    pub fn status_code(&self) -> i32 {
        self.kind().status_code()
    }
}

/// Result type for hyprink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Holds the message of the last failed operation.
///
/// Overwritten by every fallible operation: a failure stores its message,
/// a success clears it.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    last: Option<(ErrorKind, String)>,
}

impl ErrorSlot {
    /// Store `err` as the last failure.
    pub fn set(&mut self, err: &Error) {
        // Callers read this back as a C string.
        let message = err.to_string().replace('\0', "");
        self.last = Some((err.kind(), message));
    }

    /// Mark the last operation as successful.
    pub fn clear(&mut self) {
        self.last = None;
    }

    /// Update the slot from an operation outcome.
    pub fn record<T>(&mut self, result: &Result<T>) {
        match result {
            Ok(_) => self.clear(),
            Err(e) => self.set(e),
        }
    }

    /// Message of the last failure, if the last operation failed.
    pub fn message(&self) -> Option<&str> {
        self.last.as_ref().map(|(_, m)| m.as_str())
    }

    /// Kind of the last failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.last.as_ref().map(|(k, _)| *k)
    }

    /// Copy the message plus a NUL terminator into `buf`.
    ///
    /// Returns the number of message bytes written (terminator excluded), or
    /// `None` when there is no message or it does not fit. Never truncates.
    pub fn copy_to(&self, buf: &mut [u8]) -> Option<usize> {
        let bytes = self.message()?.as_bytes();
        if bytes.len() >= buf.len() {
            return None;
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        buf[bytes.len()] = 0;
        Some(bytes.len())
    }
}
