//! Directory tree to package file.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use hyprink_schema::{
    Blake3Hash, EntryKind, FLAG_ZSTD_MANIFEST, ManifestEntry, PackageHeader, PackageManifest,
    validate_relative_path,
};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::io::mode_of;
use crate::paths;
use crate::reporter::Reporter;

const SCOPE: &str = "pack";

/// Knobs for [`pack`].
#[derive(Debug, Clone, Copy)]
pub struct PackOptions {
    /// zstd-compress the manifest section.
    pub compress_manifest: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            compress_manifest: true,
        }
    }
}

/// What [`pack`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    /// Manifest entries of every kind.
    pub entries: usize,
    /// Regular files among them.
    pub files: usize,
    /// Payload section length.
    pub payload_bytes: u64,
    /// Length of the finished package file.
    pub package_bytes: u64,
}

/// A manifest entry plus where its content comes from.
struct Planned {
    entry: ManifestEntry,
    source: PathBuf,
}

/// Serialize the tree under `src` into the package file `out`.
///
/// The walk is depth-first in lexicographic order and does not follow
/// symlinks. The package is written to a temp file next to `out` and
/// renamed over it only once complete, so `out` is never seen half-written.
///
/// # Errors
///
/// - [`Error::NotFound`] if `src` is not a directory or `out` has no
///   existing parent directory
/// - [`Error::Io`] on read/write failure, unsupported file names, or a file
///   changing while it is packed
pub fn pack(
    src: &Path,
    out: &Path,
    options: PackOptions,
    reporter: &dyn Reporter,
) -> Result<PackSummary> {
    if !src.is_dir() {
        return Err(Error::NotFound {
            what: "source directory",
            path: src.to_path_buf(),
        });
    }
    let out_dir = paths::parent_or_cwd(out);
    if !out_dir.is_dir() {
        return Err(Error::NotFound {
            what: "output directory",
            path: out_dir.to_path_buf(),
        });
    }

    reporter.phase(SCOPE, &format!("indexing {}", src.display()));
    let planned = plan(src, reporter)?;

    let mut manifest = PackageManifest::new();
    for p in &planned {
        manifest.push(p.entry.clone());
    }
    let stored = manifest
        .encode(options.compress_manifest)
        .map_err(|e| Error::Unknown(format!("encoding manifest: {e}")))?;
    let header = PackageHeader {
        flags: if options.compress_manifest {
            FLAG_ZSTD_MANIFEST
        } else {
            0
        },
        manifest_size: stored.len() as u64,
        payload_size: manifest.payload_size(),
        manifest_hash: Blake3Hash::compute(&stored),
    };

    reporter.phase(SCOPE, &format!("writing {}", out.display()));
    let write_err = |e| Error::io(format!("writing {}", out.display()), e);
    let tmp = tempfile::Builder::new()
        .prefix(".hyprink-")
        .suffix(".tmp")
        .tempfile_in(out_dir)
        .map_err(write_err)?;

    {
        let mut writer = BufWriter::new(tmp.as_file());
        writer.write_all(&header.to_bytes()).map_err(write_err)?;
        writer.write_all(&stored).map_err(write_err)?;
        write_payload(&planned, &mut writer, reporter)?;
        writer.flush().map_err(write_err)?;
    }
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(out).map_err(|e| write_err(e.error))?;

    let summary = PackSummary {
        entries: manifest.len(),
        files: manifest.iter().filter(|e| e.kind == EntryKind::File).count(),
        payload_bytes: header.payload_size,
        package_bytes: header.total_len().unwrap_or(u64::MAX),
    };
    debug!("Packed {:?} into {:?}: {:?}", src, out, summary);
    Ok(summary)
}

/// Walk `src` and hash every file.
fn plan(src: &Path, reporter: &dyn Reporter) -> Result<Vec<Planned>> {
    let mut planned = Vec::new();

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for item in walker {
        let item = item.map_err(|e| {
            let path = e.path().unwrap_or(src).display().to_string();
            Error::io(format!("walking {path}"), io::Error::other(e))
        })?;
        let source = item.path().to_path_buf();
        let rel = relative_name(src, &source)?;
        let read_err = |e| Error::io(format!("reading {}", source.display()), e);

        let file_type = item.file_type();
        let entry = if file_type.is_dir() {
            let meta = item.metadata().map_err(|e| read_err(io::Error::other(e)))?;
            ManifestEntry::dir(rel, mode_of(&meta))
        } else if file_type.is_symlink() {
            let target = fs::read_link(&source).map_err(read_err)?;
            let Some(target) = target.to_str() else {
                return Err(read_err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "symlink target is not valid UTF-8",
                )));
            };
            ManifestEntry::symlink(rel, target)
        } else if file_type.is_file() {
            let meta = item.metadata().map_err(|e| read_err(io::Error::other(e)))?;
            let file = File::open(&source).map_err(read_err)?;
            let (hash, size) = Blake3Hash::compute_reader(file).map_err(read_err)?;
            ManifestEntry::file(rel, size, mode_of(&meta), hash)
        } else {
            reporter.warning(
                SCOPE,
                &format!("skipping special file {}", source.display()),
            );
            continue;
        };

        planned.push(Planned { entry, source });
    }

    Ok(planned)
}

/// `/`-joined path of `path` below `root`.
fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let unsupported = |reason: &str| {
        Error::io(
            format!("packing {}", path.display()),
            io::Error::new(io::ErrorKind::InvalidData, reason.to_string()),
        )
    };

    let rel = path
        .strip_prefix(root)
        .map_err(|_| unsupported("path escapes the source directory"))?;
    let mut parts = Vec::new();
    for component in rel.components() {
        let Some(part) = component.as_os_str().to_str() else {
            return Err(unsupported("file name is not valid UTF-8"));
        };
        parts.push(part);
    }
    let name = parts.join("/");
    validate_relative_path(&name).map_err(|_| unsupported("file name cannot be stored"))?;
    Ok(name)
}

/// Append every file's content, re-hashing to catch files that changed
/// since they were indexed.
fn write_payload<W: Write>(planned: &[Planned], writer: &mut W, reporter: &dyn Reporter) -> Result<()> {
    let total = planned.len();
    for (index, p) in planned.iter().enumerate() {
        reporter.entry(SCOPE, &p.entry.path, index + 1, total);
        if p.entry.kind != EntryKind::File {
            continue;
        }

        let read_err = |e| Error::io(format!("reading {}", p.source.display()), e);
        let file = File::open(&p.source).map_err(read_err)?;
        // Never copy past the indexed size; growth shows up as a hash change.
        let limited = io::Read::take(file, p.entry.size);
        let (hash, copied) = Blake3Hash::compute_copy(limited, &mut *writer).map_err(read_err)?;

        if copied != p.entry.size || Some(&hash) != p.entry.content_hash.as_ref() {
            return Err(read_err(io::Error::new(
                io::ErrorKind::InvalidData,
                "file changed while packing",
            )));
        }
    }
    Ok(())
}
