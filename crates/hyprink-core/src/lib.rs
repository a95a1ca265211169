//! Core library for hyprink: configuration, logging, packaging and
//! installation behind a single [`Context`].

pub mod config;
pub mod context;
pub mod error;
pub mod install;
pub mod io;
pub mod logger;
pub mod paths;
pub mod reporter;

pub use config::{ConfigStore, Preset};
pub use context::Context;
pub use error::{Error, ErrorKind, ErrorSlot, Result};
pub use install::{InstallOptions, InstallReport, Installer};
pub use io::pack::{PackOptions, PackSummary, pack};
pub use io::reader::{PackageReader, read_manifest, verify};
pub use io::unpack::{UnpackOptions, UnpackSummary, unpack};
pub use logger::{Level, LogRecord, Logger};
pub use reporter::{NullReporter, Reporter};
