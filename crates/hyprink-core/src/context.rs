//! The composition root: one configuration, one error slot, one logger.

use std::path::Path;

use hyprink_schema::PackageManifest;

use crate::config::ConfigStore;
use crate::error::{Error, ErrorSlot, Result};
use crate::install::{InstallOptions, InstallReport, Installer};
use crate::io::pack::{self, PackOptions, PackSummary};
use crate::io::reader;
use crate::io::unpack::{self, UnpackOptions, UnpackSummary};
use crate::logger::{Level, Logger};
use crate::reporter::NullReporter;

/// Owns everything a caller needs between creation and release.
///
/// Each fallible operation records its outcome in the error slot: a failure
/// stores its message (and is logged at `error`), a success clears it. A
/// context is used from one thread at a time; it may be moved between
/// threads but not shared.
#[derive(Debug)]
pub struct Context {
    config: ConfigStore,
    error: ErrorSlot,
    logger: Logger,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a context from the first `hyprink.conf` found.
    ///
    /// Never fails: if the config file cannot be read or parsed, the
    /// defaults are used and a warning is logged.
    pub fn new() -> Self {
        match ConfigStore::load() {
            Ok(config) => Self::with_config(config),
            Err(e) => {
                let ctx = Self::with_config(ConfigStore::default());
                ctx.logger
                    .log(Level::Warn, "config", &format!("{e}; using defaults"));
                ctx
            }
        }
    }

    /// Create a context from an explicit configuration.
    pub fn with_config(config: ConfigStore) -> Self {
        let logger = Logger::new(&config);
        Self {
            config,
            error: ErrorSlot::default(),
            logger,
        }
    }

    /// Loaded configuration.
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// The context's logger.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// App name currently used for log formatting.
    pub fn app_name(&self) -> &str {
        self.logger.app_name()
    }

    /// Override the app name used for log formatting.
    pub fn set_app_name(&mut self, name: &str) {
        self.logger.set_app_name(name);
    }

    /// Log `message` at a level given as text; unknown levels log at `info`.
    pub fn log(&self, level: &str, scope: &str, message: &str) {
        self.logger.log_text(level, scope, message);
    }

    /// Log a named preset, optionally replacing its message.
    ///
    /// Counts as a successful operation: the error slot is cleared. Plain
    /// [`log`](Self::log) leaves it alone so a host can log a failure before
    /// reading it.
    pub fn log_preset(&mut self, name: &str, message: Option<&str>) {
        self.logger.log_preset(&self.config, name, message);
        self.error.clear();
    }

    /// Pack the directory `src` into the package file `out`.
    ///
    /// # Errors
    ///
    /// See [`pack::pack`].
    pub fn pack(&mut self, src: &Path, out: &Path) -> Result<PackSummary> {
        let options = PackOptions {
            compress_manifest: self.config.packaging.compress_manifest,
        };
        let result = pack::pack(src, out, options, &self.logger);
        if let Ok(summary) = &result {
            self.log_preset(
                "pack_ok",
                Some(&format!(
                    "packed {} entries from {} into {}",
                    summary.entries,
                    src.display(),
                    out.display()
                )),
            );
        }
        self.record("pack", result)
    }

    /// Unpack the package file `pkg` into `target`.
    ///
    /// # Errors
    ///
    /// See [`unpack::unpack`].
    pub fn unpack(&mut self, pkg: &Path, target: &Path) -> Result<UnpackSummary> {
        let options = UnpackOptions {
            overwrite: self.config.packaging.overwrite,
        };
        let result = unpack::unpack(pkg, target, options, &self.logger);
        if let Ok(summary) = &result {
            self.log_preset(
                "unpack_ok",
                Some(&format!(
                    "extracted {} entries into {}",
                    summary.entries,
                    target.display()
                )),
            );
        }
        self.record("unpack", result)
    }

    /// Install a package file or directory into the configured install root.
    ///
    /// # Errors
    ///
    /// See [`Installer::install`].
    pub fn install(&mut self, path: &Path) -> Result<InstallReport> {
        let installer = Installer::new(InstallOptions::from_config(&self.config));
        let result = installer.install(path, &self.logger);
        if let Ok(report) = &result {
            let verb = if report.replaced { "replaced" } else { "installed" };
            self.log_preset(
                "install_ok",
                Some(&format!("{verb} {} at {}", report.name, report.path.display())),
            );
        }
        self.record("install", result)
    }

    /// Fully validate a package file without writing anything.
    ///
    /// # Errors
    ///
    /// See [`reader::verify`].
    pub fn verify(&mut self, pkg: &Path) -> Result<PackageManifest> {
        let result = reader::verify(pkg, &NullReporter);
        if let Ok(manifest) = &result {
            self.logger.log(
                Level::Info,
                "verify",
                &format!("{} is intact ({} entries)", pkg.display(), manifest.len()),
            );
        }
        self.record("verify", result)
    }

    /// Read the manifest of a package file.
    ///
    /// # Errors
    ///
    /// See [`reader::read_manifest`].
    pub fn list(&mut self, pkg: &Path) -> Result<PackageManifest> {
        let result = reader::read_manifest(pkg);
        self.record("list", result)
    }

    /// Message of the last failed operation, if the last operation failed.
    pub fn last_error(&self) -> Option<&str> {
        self.error.message()
    }

    /// The error slot itself.
    pub fn error_slot(&self) -> &ErrorSlot {
        &self.error
    }

    /// Record a failure that happened before an operation could run, such as
    /// an unusable argument at the foreign boundary.
    pub fn fail(&mut self, err: &Error) {
        self.logger.log(Level::Error, "ffi", &err.to_string());
        self.error.set(err);
    }

    fn record<T>(&mut self, op: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.logger.log(Level::Error, op, &e.to_string());
        }
        self.error.record(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn quiet_config(tmp: &TempDir) -> ConfigStore {
        let mut config = ConfigStore::default();
        config.logging.colors = false;
        config.logging.file = Some(tmp.path().join("ctx.log").to_string_lossy().into_owned());
        config.install.root = Some(tmp.path().join("installed").to_string_lossy().into_owned());
        config
    }

    #[test]
    fn failure_then_success_clears_the_slot() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = Context::with_config(quiet_config(&tmp));
        let out = tmp.path().join("output.pkg");

        let err = ctx.pack(Path::new("/path/to/nothing"), &out).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(ctx.last_error().unwrap().contains("/path/to/nothing"));

        let src = tmp.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("f"), "x").unwrap();
        ctx.pack(&src, &out).unwrap();
        assert_eq!(ctx.last_error(), None);
        assert_eq!(ctx.error_slot().copy_to(&mut [0u8; 256]), None);
    }

    #[test]
    fn failures_are_logged_with_operation_scope() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = Context::with_config(quiet_config(&tmp));
        let _ = ctx.unpack(&tmp.path().join("missing.pkg"), &tmp.path().join("t"));

        let log = fs::read_to_string(tmp.path().join("ctx.log")).unwrap();
        assert!(log.contains("[ERROR] [unpack] package file not found"));
    }

    #[test]
    fn successes_use_builtin_presets() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = Context::with_config(quiet_config(&tmp));
        let src = tmp.path().join("demo");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("f"), "x").unwrap();
        let pkg = tmp.path().join("demo.pkg");

        ctx.pack(&src, &pkg).unwrap();
        ctx.verify(&pkg).unwrap();
        ctx.unpack(&pkg, &tmp.path().join("out")).unwrap();
        ctx.install(&pkg).unwrap();
        assert!(tmp.path().join("installed/demo/f").is_file());

        let log = fs::read_to_string(tmp.path().join("ctx.log")).unwrap();
        assert!(log.contains("[INFO] [pack_ok] packed 1 entries"));
        assert!(log.contains("[INFO] [verify]"));
        assert!(log.contains("[INFO] [unpack_ok] extracted 1 entries"));
        assert!(log.contains("[INFO] [install_ok] installed demo"));
    }

    #[test]
    fn set_app_name_affects_preset_templates() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = Context::with_config(quiet_config(&tmp));
        ctx.set_app_name("renamed");
        ctx.log_preset("info", None);
        ctx.log("bogus", "scope", "fallback level");

        assert_eq!(ctx.app_name(), "renamed");
        assert_eq!(ctx.config().app_name, "hyprink");
        let log = fs::read_to_string(tmp.path().join("ctx.log")).unwrap();
        assert!(log.contains("[INFO] [info] renamed ready"));
        assert!(log.contains("[INFO] [scope] fallback level"));
    }

    #[test]
    fn plain_log_keeps_the_slot_and_preset_clears_it() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = Context::with_config(quiet_config(&tmp));
        ctx.fail(&Error::Unknown("boom".into()));
        ctx.log("info", "s", "m");
        ctx.set_app_name("other");
        assert_eq!(ctx.last_error(), Some("boom"));

        ctx.log_preset("does-not-exist", None);
        assert_eq!(ctx.last_error(), None);
    }

    #[test]
    fn context_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Context>();
    }
}
