//! Package file to directory tree.
//!
//! Nothing under the target is touched until the whole package has been
//! validated and every conflict has been ruled out. Content is first
//! extracted into a staging directory next to the target and then moved
//! into place. Every move is journaled so a failure part-way through the
//! commit puts the target back the way it was.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use hyprink_schema::{EntryKind, ManifestEntry};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::io::reader::PackageReader;
use crate::io::{lstat, remove_any, set_mode, symlink};
use crate::paths;
use crate::reporter::Reporter;

const SCOPE: &str = "unpack";

/// Knobs for [`unpack`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnpackOptions {
    /// Replace existing non-directory entries instead of failing.
    pub overwrite: bool,
}

/// What [`unpack`] materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Manifest entries of every kind.
    pub entries: usize,
    /// Regular files among them.
    pub files: usize,
    /// Bytes of file content written.
    pub bytes: u64,
}

/// Validate the package at `pkg` and materialize it under `target`.
///
/// `target` and its parents are created if absent. Existing directories are
/// merged into; existing files and symlinks are a conflict unless
/// `overwrite` is set.
///
/// # Errors
///
/// - [`Error::NotFound`], [`Error::InvalidFormat`], [`Error::CorruptData`]
///   from validation, before anything is written
/// - [`Error::PathConflict`] when an entry would replace something it may not
/// - [`Error::Io`] if staging or committing fails; the target is restored
pub fn unpack(
    pkg: &Path,
    target: &Path,
    options: UnpackOptions,
    reporter: &dyn Reporter,
) -> Result<UnpackSummary> {
    let mut reader = PackageReader::open(pkg)?;
    reader.verify_blocks(reporter)?;
    unpack_reader(&mut reader, target, options, reporter)
}

/// Extract an already opened and verified package.
pub(crate) fn unpack_reader(
    reader: &mut PackageReader,
    target: &Path,
    options: UnpackOptions,
    reporter: &dyn Reporter,
) -> Result<UnpackSummary> {
    let entries = reader.manifest().entries.clone();
    check_conflicts(&entries, target, options.overwrite)?;

    let parent = paths::parent_or_cwd(target);
    let created = create_parents(parent)
        .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;

    let bytes = match extract(reader, &entries, target, parent, reporter) {
        Ok(bytes) => bytes,
        Err(e) => {
            remove_created(&created, reporter);
            return Err(e);
        }
    };

    debug!(
        "Unpacked {:?} into {:?}: {} entries, {} bytes",
        reader.path(),
        target,
        entries.len(),
        bytes
    );

    Ok(UnpackSummary {
        entries: entries.len(),
        files: entries.iter().filter(|e| e.kind == EntryKind::File).count(),
        bytes,
    })
}

/// Stage the entries next to `target` and commit them into place.
fn extract(
    reader: &mut PackageReader,
    entries: &[ManifestEntry],
    target: &Path,
    parent: &Path,
    reporter: &dyn Reporter,
) -> Result<u64> {
    let work = tempfile::Builder::new()
        .prefix(".hyprink-unpack-")
        .tempdir_in(parent)
        .map_err(|e| Error::io(format!("creating staging directory in {}", parent.display()), e))?;
    let tree = work.path().join("tree");
    let displaced = work.path().join("displaced");

    reporter.phase(SCOPE, "staging entries");
    let bytes = stage(reader, entries, &tree, reporter)?;

    reporter.phase(SCOPE, &format!("committing into {}", target.display()));
    let mut journal = Journal::new(displaced);
    if let Err(e) = commit(entries, &tree, target, &mut journal) {
        journal.rollback(reporter);
        return Err(e);
    }
    Ok(bytes)
}

/// `create_dir_all` that returns the directories it had to create, deepest
/// first.
fn create_parents(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut missing = Vec::new();
    let mut cursor = Some(dir);
    while let Some(dir) = cursor {
        if dir.as_os_str().is_empty() || lstat(dir)?.is_some() {
            break;
        }
        missing.push(dir.to_path_buf());
        cursor = dir.parent();
    }
    fs::create_dir_all(dir)?;
    Ok(missing)
}

/// Undo [`create_parents`]. Directories that are no longer empty stay.
fn remove_created(dirs: &[PathBuf], reporter: &dyn Reporter) {
    for dir in dirs {
        if let Err(e) = fs::remove_dir(dir) {
            reporter.warning(SCOPE, &format!("could not remove {}: {e}", dir.display()));
            return;
        }
    }
}

/// Reject the unpack if any entry would clobber something it must not.
fn check_conflicts(entries: &[ManifestEntry], target: &Path, overwrite: bool) -> Result<()> {
    let inspect = |path: &Path| {
        lstat(path).map_err(|e| Error::io(format!("inspecting {}", path.display()), e))
    };
    let conflict = |path: PathBuf| Error::PathConflict { path };

    match inspect(target)? {
        None => return Ok(()),
        Some(meta) if meta.is_dir() => {}
        Some(_) => return Err(conflict(target.to_path_buf())),
    }

    let dir_entries: HashSet<&str> = entries
        .iter()
        .filter(|e| e.kind == EntryKind::Dir)
        .map(|e| e.path.as_str())
        .collect();

    for entry in entries {
        // An existing symlink or file on the way down would redirect the
        // write, unless it is itself about to be replaced by a directory.
        let mut ancestor = entry.path.as_str();
        while let Some((parent, _)) = ancestor.rsplit_once('/') {
            ancestor = parent;
            let path = target.join(parent.split('/').collect::<PathBuf>());
            if let Some(meta) = inspect(&path)? {
                if !meta.is_dir() && !(overwrite && dir_entries.contains(parent)) {
                    return Err(conflict(path));
                }
            }
        }

        let dest = target.join(entry.native_path());
        let Some(meta) = inspect(&dest)? else {
            continue;
        };
        let merge = entry.kind == EntryKind::Dir && meta.is_dir();
        let replace = overwrite && !meta.is_dir();
        if !merge && !replace {
            return Err(conflict(dest));
        }
    }
    Ok(())
}

/// Extract every entry below `tree`, re-checking block digests on the way.
/// Returns the number of content bytes written.
fn stage(
    reader: &mut PackageReader,
    entries: &[ManifestEntry],
    tree: &Path,
    reporter: &dyn Reporter,
) -> Result<u64> {
    let stage_err = |path: &Path, e| Error::io(format!("staging {}", path.display()), e);

    fs::create_dir(tree).map_err(|e| stage_err(tree, e))?;
    set_mode(tree, 0o755).map_err(|e| stage_err(tree, e))?;

    let total = entries.len();
    let mut bytes = 0u64;
    for (index, entry) in entries.iter().enumerate() {
        let dest = tree.join(entry.native_path());
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| stage_err(parent, e))?;
        }

        match entry.kind {
            EntryKind::Dir => {
                fs::create_dir_all(&dest).map_err(|e| stage_err(&dest, e))?;
            }
            EntryKind::File => {
                let file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&dest)
                    .map_err(|e| stage_err(&dest, e))?;
                let mut out = BufWriter::new(file);
                reader.copy_block(index, &mut out)?;
                out.flush().map_err(|e| stage_err(&dest, e))?;
                set_mode(&dest, entry.permissions).map_err(|e| stage_err(&dest, e))?;
                bytes += entry.size;
            }
            EntryKind::Symlink => {
                let link_target = entry.link_target.as_deref().unwrap_or_default();
                symlink(link_target, &dest).map_err(|e| stage_err(&dest, e))?;
            }
        }
        reporter.entry(SCOPE, &entry.path, index + 1, total);
    }
    Ok(bytes)
}

/// Move the staged tree into `target`.
///
/// Directory modes are applied last, once nothing more needs to be written
/// into them.
fn commit(
    entries: &[ManifestEntry],
    tree: &Path,
    target: &Path,
    journal: &mut Journal,
) -> Result<()> {
    let commit_err = |e| Error::io(format!("committing into {}", target.display()), e);

    let created_dirs: Vec<&ManifestEntry> = if lstat(target).map_err(commit_err)?.is_none() {
        journal.place(tree, target).map_err(commit_err)?;
        entries.iter().filter(|e| e.kind == EntryKind::Dir).collect()
    } else {
        // Parents before children, whatever order the manifest uses.
        let mut ordered: Vec<&ManifestEntry> = entries.iter().collect();
        ordered.sort_by_key(|e| e.path.matches('/').count());

        let mut created = Vec::new();
        for entry in ordered {
            let rel = entry.native_path();
            let dest = target.join(&rel);
            if let Some(parent) = dest.parent() {
                journal.ensure_dirs(target, parent).map_err(commit_err)?;
            }
            let existing = lstat(&dest).map_err(commit_err)?;

            if entry.kind == EntryKind::Dir {
                match existing {
                    Some(meta) if meta.is_dir() => continue,
                    Some(_) => journal.displace(&dest).map_err(commit_err)?,
                    None => {}
                }
                journal.create_dir(&dest).map_err(commit_err)?;
                created.push(entry);
            } else {
                if existing.is_some() {
                    journal.displace(&dest).map_err(commit_err)?;
                }
                journal.place(&tree.join(&rel), &dest).map_err(commit_err)?;
            }
        }
        created
    };

    for entry in created_dirs.iter().rev() {
        let dest = target.join(entry.native_path());
        set_mode(&dest, entry.permissions).map_err(commit_err)?;
    }
    Ok(())
}

#[derive(Debug)]
enum Step {
    /// Something now exists at this path that did not before.
    Created(PathBuf),
    /// The previous occupant of `original` was parked at `backup`.
    Displaced { original: PathBuf, backup: PathBuf },
}

/// Record of filesystem changes made during a commit, in order.
#[derive(Debug)]
struct Journal {
    backup_dir: PathBuf,
    steps: Vec<Step>,
}

impl Journal {
    fn new(backup_dir: PathBuf) -> Self {
        Self {
            backup_dir,
            steps: Vec::new(),
        }
    }

    fn create_dir(&mut self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)?;
        self.steps.push(Step::Created(path.to_path_buf()));
        Ok(())
    }

    /// Create the missing directories between `root` and `dir`.
    fn ensure_dirs(&mut self, root: &Path, dir: &Path) -> io::Result<()> {
        let Ok(rel) = dir.strip_prefix(root) else {
            return Ok(());
        };
        let mut current = root.to_path_buf();
        for component in rel.components() {
            current.push(component);
            if lstat(&current)?.is_none() {
                self.create_dir(&current)?;
            }
        }
        Ok(())
    }

    fn place(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)?;
        self.steps.push(Step::Created(to.to_path_buf()));
        Ok(())
    }

    fn displace(&mut self, path: &Path) -> io::Result<()> {
        if !self.backup_dir.exists() {
            fs::create_dir(&self.backup_dir)?;
        }
        let backup = self.backup_dir.join(self.steps.len().to_string());
        fs::rename(path, &backup)?;
        self.steps.push(Step::Displaced {
            original: path.to_path_buf(),
            backup,
        });
        Ok(())
    }

    /// Undo every step, newest first. Keeps going past failures so as much
    /// as possible is restored.
    fn rollback(&mut self, reporter: &dyn Reporter) {
        while let Some(step) = self.steps.pop() {
            let result = match &step {
                Step::Created(path) => remove_any(path),
                Step::Displaced { original, backup } => {
                    remove_any(original).and_then(|()| fs::rename(backup, original))
                }
            };
            if let Err(e) = result {
                warn!("rollback step {:?} failed: {}", step, e);
                reporter.warning(SCOPE, &format!("could not roll back {step:?}: {e}"));
            }
        }
    }
}
