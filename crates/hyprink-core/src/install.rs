//! Installing a package file or an unpacked directory into the install root.
//!
//! Everything is assembled in a staging directory inside the install root
//! and renamed into `<root>/<name>` at the end, so an install is either
//! fully present or absent.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use hyprink_schema::{MAGIC, has_magic};
use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ConfigStore;
use crate::error::{Error, Result};
use crate::io::reader::PackageReader;
use crate::io::unpack::{UnpackOptions, unpack_reader};
use crate::io::{lstat, mode_of, set_mode, symlink};
use crate::reporter::Reporter;

const SCOPE: &str = "install";

/// Where a replaced install is parked inside the staging directory.
const PREVIOUS_DIR: &str = ".previous";

/// Where and how [`Installer`] installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Directory that receives `<name>` subdirectories.
    pub root: PathBuf,
    /// Replace an existing install of the same name.
    pub overwrite: bool,
    /// Relative paths marked executable in addition to `bin/*`.
    pub entry_points: Vec<String>,
}

impl InstallOptions {
    /// Options taken from the `[install]` and `[packaging]` config sections.
    pub fn from_config(config: &ConfigStore) -> Self {
        Self {
            root: config.install.root(),
            overwrite: config.packaging.overwrite,
            entry_points: config.install.entry_points.clone(),
        }
    }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Install name (package file stem or directory name).
    pub name: String,
    /// Final location, `<root>/<name>`.
    pub path: PathBuf,
    /// Regular files installed.
    pub files: usize,
    /// Total size of those files.
    pub bytes: u64,
    /// Whether a previous install was replaced.
    pub replaced: bool,
}

/// Source of an install.
enum Payload {
    Package(PackageReader),
    Directory(PathBuf),
}

/// Applies payloads into the install root.
#[derive(Debug, Clone)]
pub struct Installer {
    options: InstallOptions,
}

impl Installer {
    /// Installer with explicit options.
    pub fn new(options: InstallOptions) -> Self {
        Self { options }
    }

    /// Options in effect.
    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    /// Install `source`, a package file or a directory.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `source` does not exist
    /// - [`Error::InvalidFormat`] / [`Error::CorruptData`] for a file that is
    ///   not a valid package
    /// - [`Error::PathConflict`] if `<root>/<name>` exists and overwrite is off
    /// - [`Error::Io`] on any filesystem failure
    pub fn install(&self, source: &Path, reporter: &dyn Reporter) -> Result<InstallReport> {
        let (name, payload) = self.open_source(source, reporter)?;

        let root = &self.options.root;
        fs::create_dir_all(root)
            .map_err(|e| Error::io(format!("creating install root {}", root.display()), e))?;

        let final_path = root.join(&name);
        let commit_err = |e| Error::io(format!("installing into {}", final_path.display()), e);
        let existing = lstat(&final_path).map_err(commit_err)?;
        if existing.is_some() && !self.options.overwrite {
            return Err(Error::PathConflict {
                path: final_path.clone(),
            });
        }

        let staging = tempfile::Builder::new()
            .prefix(".hyprink-staging-")
            .tempdir_in(root)
            .map_err(commit_err)?;
        let staged = staging.path().join(&name);

        reporter.phase(SCOPE, &format!("staging {name}"));
        match payload {
            Payload::Package(mut reader) => {
                unpack_reader(&mut reader, &staged, UnpackOptions::default(), reporter)?;
            }
            Payload::Directory(dir) => copy_tree(&dir, &staged, reporter)?,
        }

        let (files, bytes) = fix_permissions(&staged, &self.options.entry_points, reporter)
            .map_err(|e| Error::io(format!("setting permissions in {}", staged.display()), e))?;

        reporter.phase(SCOPE, &format!("committing {}", final_path.display()));
        let replaced = existing.is_some();
        if replaced {
            let previous = staging.path().join(PREVIOUS_DIR);
            fs::rename(&final_path, &previous).map_err(commit_err)?;
            if let Err(e) = fs::rename(&staged, &final_path) {
                return Err(abort_replace(staging, &previous, &final_path, e));
            }
        } else {
            fs::rename(&staged, &final_path).map_err(commit_err)?;
        }

        debug!(
            "Installed {:?} as {:?} ({} files, {} bytes)",
            source, final_path, files, bytes
        );
        Ok(InstallReport {
            name,
            path: final_path,
            files,
            bytes,
            replaced,
        })
    }

    /// Resolve the install name and check the source before anything is
    /// written.
    fn open_source(&self, source: &Path, reporter: &dyn Reporter) -> Result<(String, Payload)> {
        let meta = match fs::metadata(source) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound {
                    what: "install source",
                    path: source.to_path_buf(),
                });
            }
            Err(e) => return Err(Error::io(format!("reading {}", source.display()), e)),
        };

        if meta.is_dir() {
            let canonical = fs::canonicalize(source)
                .map_err(|e| Error::io(format!("resolving {}", source.display()), e))?;
            let name = install_name(canonical.file_name(), source)?;
            return Ok((name, Payload::Directory(canonical)));
        }

        let name = install_name(source.file_stem(), source)?;
        if !starts_with_magic(source)? {
            return Err(Error::InvalidFormat {
                path: source.to_path_buf(),
                reason: "not a hyprink package".to_string(),
            });
        }
        let mut reader = PackageReader::open(source)?;
        reader.verify_blocks(reporter)?;
        Ok((name, Payload::Package(reader)))
    }
}

/// Put the parked previous install back after a failed replace.
///
/// If that fails too, the staging directory is kept so the previous install
/// survives, and the error names where it is.
fn abort_replace(staging: TempDir, previous: &Path, final_path: &Path, cause: io::Error) -> Error {
    let context = format!("installing into {}", final_path.display());
    match fs::rename(previous, final_path) {
        Ok(()) => Error::io(context, cause),
        Err(restore) => {
            let kept = staging.keep().join(PREVIOUS_DIR);
            warn!(
                "Could not restore {:?} from {:?}: {}",
                final_path, kept, restore
            );
            Error::io(
                format!(
                    "{context}; restoring the previous install failed ({restore}), it was kept at {}",
                    kept.display()
                ),
                cause,
            )
        }
    }
}

fn install_name(name: Option<&std::ffi::OsStr>, source: &Path) -> Result<String> {
    match name.map(|n| n.to_string_lossy().into_owned()) {
        Some(name) if !name.is_empty() && name != "." && name != ".." => Ok(name),
        _ => Err(Error::Unknown(format!(
            "cannot derive an install name from {}",
            source.display()
        ))),
    }
}

fn starts_with_magic(path: &Path) -> Result<bool> {
    let read_err = |e| Error::io(format!("reading {}", path.display()), e);
    let file = File::open(path).map_err(read_err)?;
    let mut prefix = Vec::with_capacity(MAGIC.len());
    file.take(MAGIC.len() as u64)
        .read_to_end(&mut prefix)
        .map_err(read_err)?;
    Ok(has_magic(&prefix))
}

/// Copy the tree under `src` into a new directory `dst`.
///
/// Symlinks are recreated with their original target, never followed, the
/// same way [`pack`](crate::io::pack::pack) records them. Special files are
/// skipped with a warning.
fn copy_tree(src: &Path, dst: &Path, reporter: &dyn Reporter) -> Result<()> {
    let copy_err = |path: &Path, e| Error::io(format!("copying {}", path.display()), e);

    fs::create_dir(dst).map_err(|e| copy_err(dst, e))?;
    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for item in walker {
        let item = item.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            copy_err(&path, io::Error::other(e))
        })?;
        let from = item.path();
        let rel = from.strip_prefix(src).unwrap_or(from);
        let to = dst.join(rel);

        let file_type = item.file_type();
        if file_type.is_dir() {
            fs::create_dir(&to).map_err(|e| copy_err(from, e))?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(from).map_err(|e| copy_err(from, e))?;
            let Some(target) = target.to_str() else {
                return Err(copy_err(
                    from,
                    io::Error::new(io::ErrorKind::InvalidData, "symlink target is not valid UTF-8"),
                ));
            };
            symlink(target, &to).map_err(|e| copy_err(from, e))?;
        } else if file_type.is_file() {
            fs::copy(from, &to).map_err(|e| copy_err(from, e))?;
        } else {
            reporter.warning(SCOPE, &format!("skipping special file {}", from.display()));
        }
    }
    Ok(())
}

/// Normalize modes under `root`: directories `0755`, files `0755` when they
/// were executable or are entry points, `0644` otherwise. Symlinks are left
/// alone. Returns the number and total size of regular files.
fn fix_permissions(root: &Path, entry_points: &[String], reporter: &dyn Reporter) -> io::Result<(usize, u64)> {
    let entry_points: Vec<PathBuf> = entry_points
        .iter()
        .map(|p| p.split('/').filter(|c| !c.is_empty()).collect())
        .collect();
    for missing in entry_points.iter().filter(|p| !root.join(p).is_file()) {
        reporter.warning(
            SCOPE,
            &format!("entry point {} is not a file in the payload", missing.display()),
        );
    }

    let mut files = 0;
    let mut bytes = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            continue;
        }
        let meta = entry.metadata().map_err(io::Error::other)?;
        if file_type.is_dir() {
            set_mode(entry.path(), 0o755)?;
            continue;
        }

        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let executable = mode_of(&meta) & 0o111 != 0
            || rel.starts_with("bin")
            || entry_points.iter().any(|p| p == rel);
        set_mode(entry.path(), if executable { 0o755 } else { 0o644 })?;

        files += 1;
        bytes += meta.len();
    }
    Ok((files, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::io::pack::{PackOptions, pack};
    use crate::reporter::NullReporter;
    use tempfile::TempDir;

    fn payload_dir(tmp: &TempDir) -> PathBuf {
        let src = tmp.path().join("demo");
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::create_dir_all(src.join("lib")).unwrap();
        fs::write(src.join("bin/demo"), "#!/bin/sh\n").unwrap();
        fs::write(src.join("lib/data.txt"), "data").unwrap();
        fs::write(src.join("start.sh"), "#!/bin/sh\n").unwrap();
        src
    }

    fn installer(tmp: &TempDir, overwrite: bool) -> Installer {
        Installer::new(InstallOptions {
            root: tmp.path().join("root"),
            overwrite,
            entry_points: vec!["start.sh".to_string()],
        })
    }

    #[test]
    fn installs_directory_under_its_name() {
        let tmp = TempDir::new().unwrap();
        let src = payload_dir(&tmp);
        let report = installer(&tmp, false).install(&src, &NullReporter).unwrap();

        assert_eq!(report.name, "demo");
        assert_eq!(report.path, tmp.path().join("root/demo"));
        assert_eq!(report.files, 3);
        assert!(!report.replaced);
        assert_eq!(
            fs::read_to_string(report.path.join("lib/data.txt")).unwrap(),
            "data"
        );
    }

    #[test]
    fn installs_package_under_its_stem() {
        let tmp = TempDir::new().unwrap();
        let src = payload_dir(&tmp);
        let pkg = tmp.path().join("app.pkg");
        pack(&src, &pkg, PackOptions::default(), &NullReporter).unwrap();

        let report = installer(&tmp, false).install(&pkg, &NullReporter).unwrap();
        assert_eq!(report.name, "app");
        assert!(report.path.join("bin/demo").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn permissions_are_normalized() {
        let tmp = TempDir::new().unwrap();
        let src = payload_dir(&tmp);
        set_mode(&src.join("lib/data.txt"), 0o600).unwrap();
        let report = installer(&tmp, false).install(&src, &NullReporter).unwrap();

        let mode = |rel: &str| mode_of(&fs::metadata(report.path.join(rel)).unwrap());
        assert_eq!(mode("bin/demo"), 0o755);
        assert_eq!(mode("start.sh"), 0o755);
        assert_eq!(mode("lib/data.txt"), 0o644);
        assert_eq!(mode("lib"), 0o755);
    }

    #[test]
    fn existing_install_conflicts_unless_overwrite() {
        let tmp = TempDir::new().unwrap();
        let src = payload_dir(&tmp);
        installer(&tmp, false).install(&src, &NullReporter).unwrap();

        let err = installer(&tmp, false)
            .install(&src, &NullReporter)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathConflict);

        fs::write(src.join("lib/data.txt"), "v2").unwrap();
        let report = installer(&tmp, true).install(&src, &NullReporter).unwrap();
        assert!(report.replaced);
        assert_eq!(
            fs::read_to_string(report.path.join("lib/data.txt")).unwrap(),
            "v2"
        );
    }

    #[test]
    fn missing_source_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = installer(&tmp, false)
            .install(&tmp.path().join("ghost"), &NullReporter)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn non_package_file_is_invalid_format() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("notes.txt");
        fs::write(&file, "hello").unwrap();
        let err = installer(&tmp, false)
            .install(&file, &NullReporter)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
        assert!(!tmp.path().join("root/notes").exists());
    }

    #[test]
    fn staging_is_cleaned_up() {
        let tmp = TempDir::new().unwrap();
        let src = payload_dir(&tmp);
        installer(&tmp, false).install(&src, &NullReporter).unwrap();

        let names: Vec<_> = fs::read_dir(tmp.path().join("root"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("demo")]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_copied_as_links() {
        let tmp = TempDir::new().unwrap();
        let src = payload_dir(&tmp);
        let secret = tmp.path().join("secret.txt");
        fs::write(&secret, "outside").unwrap();
        symlink(secret.to_str().unwrap(), &src.join("escape")).unwrap();
        symlink("lib/data.txt", &src.join("data")).unwrap();

        let report = installer(&tmp, false).install(&src, &NullReporter).unwrap();
        let escape = report.path.join("escape");
        assert!(fs::symlink_metadata(&escape).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&escape).unwrap(), secret);
        assert_eq!(
            fs::read_link(report.path.join("data")).unwrap(),
            PathBuf::from("lib/data.txt")
        );
        assert_eq!(report.files, 3);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_installs() {
        let tmp = TempDir::new().unwrap();
        let src = payload_dir(&tmp);
        symlink("does-not-exist", &src.join("dangling")).unwrap();

        let report = installer(&tmp, false).install(&src, &NullReporter).unwrap();
        assert_eq!(
            fs::read_link(report.path.join("dangling")).unwrap(),
            PathBuf::from("does-not-exist")
        );
    }

    #[test]
    fn failed_restore_keeps_previous_install() {
        let tmp = TempDir::new().unwrap();
        let staging = TempDir::new_in(tmp.path()).unwrap();
        let staging_path = staging.path().to_path_buf();
        let previous = staging_path.join(PREVIOUS_DIR);
        fs::create_dir(&previous).unwrap();
        fs::write(previous.join("old.txt"), "old").unwrap();
        // A missing parent makes the restore rename fail.
        let final_path = tmp.path().join("gone/demo");

        let cause = io::Error::other("rename failed");
        let err = abort_replace(staging, &previous, &final_path, cause);

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(err.to_string().contains(&previous.display().to_string()));
        assert_eq!(fs::read_to_string(previous.join("old.txt")).unwrap(), "old");
        fs::remove_dir_all(&staging_path).unwrap();
    }

    #[test]
    fn successful_restore_puts_previous_back() {
        let tmp = TempDir::new().unwrap();
        let staging = TempDir::new_in(tmp.path()).unwrap();
        let staging_path = staging.path().to_path_buf();
        let previous = staging_path.join(PREVIOUS_DIR);
        fs::create_dir(&previous).unwrap();
        let final_path = tmp.path().join("demo");

        let err = abort_replace(staging, &previous, &final_path, io::Error::other("rename failed"));
        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(final_path.is_dir());
        assert!(!staging_path.exists());
    }
}
