//! `hyprink.conf` parsing.
//!
//! The file is TOML. Every section is optional; missing keys take the
//! built-in defaults, and presets from the file are layered over the
//! built-in ones.
//!
//! ```toml
//! app_name = "demo"
//!
//! [logging]
//! min_level = "debug"
//! file = "~/.local/state/hyprink/{app}.log"
//!
//! [packaging]
//! overwrite = false
//!
//! [install]
//! root = "~/.local/share/demo"
//! entry_points = ["run.sh"]
//!
//! [presets.deploy]
//! level = "info"
//! msg = "{app} deployed"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::logger::Level;
use crate::paths;

/// Default `chrono` format for log timestamps.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A named, pre-configured log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    /// Level the line is emitted at.
    pub level: Level,
    /// Message template; `{app}` expands to the current app name.
    pub msg: String,
    /// Scope override. Defaults to the preset name.
    #[serde(default)]
    pub scope: Option<String>,
}

impl Preset {
    fn new(level: Level, msg: &str) -> Self {
        Self {
            level,
            msg: msg.to_string(),
            scope: None,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Records below this level are dropped.
    pub min_level: Level,
    /// Color the level tag on the console when stderr is a terminal.
    pub colors: bool,
    /// `chrono` strftime format for the timestamp field.
    pub timestamp_format: String,
    /// Append log lines to this file. `~/` and `{app}` are expanded.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            min_level: Level::Info,
            colors: true,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            file: None,
        }
    }
}

/// `[packaging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    /// Allow unpack/install to replace existing entries.
    pub overwrite: bool,
    /// zstd-compress the manifest section of new packages.
    pub compress_manifest: bool,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            overwrite: false,
            compress_manifest: true,
        }
    }
}

/// `[install]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Install root. Defaults to `<hyprink home>/installed`.
    pub root: Option<String>,
    /// Relative paths marked executable after install, in addition to `bin/*`.
    pub entry_points: Vec<String>,
}

impl InstallConfig {
    /// Resolved install root.
    pub fn root(&self) -> PathBuf {
        self.root
            .as_deref()
            .map_or_else(paths::default_install_root, paths::expand_path)
    }
}

/// Configuration owned by a context. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigStore {
    /// Application name used in log formatting.
    pub app_name: String,
    /// Log targets and formatting.
    pub logging: LoggingConfig,
    /// Pack/unpack behaviour.
    pub packaging: PackagingConfig,
    /// Installer behaviour.
    pub install: InstallConfig,
    /// Named log presets.
    pub presets: BTreeMap<String, Preset>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            app_name: "hyprink".to_string(),
            logging: LoggingConfig::default(),
            packaging: PackagingConfig::default(),
            install: InstallConfig::default(),
            presets: builtin_presets(),
        }
    }
}

/// Presets available even without a config file.
pub fn builtin_presets() -> BTreeMap<String, Preset> {
    [
        ("info", Preset::new(Level::Info, "{app} ready")),
        ("warn", Preset::new(Level::Warn, "{app} needs attention")),
        ("error", Preset::new(Level::Error, "{app} failed")),
        ("pack_ok", Preset::new(Level::Info, "package written")),
        ("unpack_ok", Preset::new(Level::Info, "package extracted")),
        ("install_ok", Preset::new(Level::Info, "payload installed")),
    ]
    .into_iter()
    .map(|(name, preset)| (name.to_string(), preset))
    .collect()
}

impl ConfigStore {
    /// Load from the first existing candidate in [`paths::config_candidates`].
    ///
    /// No config file at all is not an error: the defaults are returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a config file exists but cannot be read
    /// or parsed.
    pub fn load() -> Result<Self> {
        match Self::locate() {
            Some(path) => Self::load_from_path(&path),
            None => {
                debug!("No {} found, using defaults", paths::CONFIG_FILE_NAME);
                Ok(Self::default())
            }
        }
    }

    /// First existing config file, if any.
    pub fn locate() -> Option<PathBuf> {
        paths::config_candidates().into_iter().find(|p| p.is_file())
    }

    /// Load a specific config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the file on read or parse failure.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        debug!("Loaded config from: {:?}", path);
        Ok(config)
    }

    /// Parse config text, layering file presets over the built-ins.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the text does not match the schema.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        for (name, preset) in builtin_presets() {
            config.presets.entry(name).or_insert(preset);
        }
        Ok(config)
    }

    /// Look up a preset by name.
    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }
}
