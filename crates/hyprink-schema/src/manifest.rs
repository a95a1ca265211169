//! Package manifest: the ordered index of entries in a package file.

use std::collections::HashSet;
use std::io::Read;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Blake3Hash, FormatError, Result};

/// zstd level used for the manifest section.
const MANIFEST_ZSTD_LEVEL: i32 = 3;

/// Upper bound on a decompressed manifest section.
pub const MAX_MANIFEST_SIZE: u64 = 64 * 1024 * 1024;

/// What a manifest entry materializes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file backed by a payload block.
    File,
    /// Directory.
    Dir,
    /// Symbolic link; the target lives in the manifest, not the payload.
    Symlink,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::File => "file",
            Self::Dir => "dir",
            Self::Symlink => "symlink",
        };
        f.write_str(s)
    }
}

/// A single entry of a [`PackageManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Relative, `/`-separated path inside the package.
    pub path: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// Payload block length; zero for directories and symlinks.
    pub size: u64,
    /// Unix permission bits (`0o7777` mask).
    pub permissions: u32,
    /// BLAKE3 of the block (files) or of the target string (symlinks).
    pub content_hash: Option<Blake3Hash>,
    /// Symlink target, verbatim.
    pub link_target: Option<String>,
}

impl ManifestEntry {
    /// Regular file entry.
    pub fn file(path: impl Into<String>, size: u64, permissions: u32, hash: Blake3Hash) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size,
            permissions: permissions & 0o7777,
            content_hash: Some(hash),
            link_target: None,
        }
    }

    /// Directory entry.
    pub fn dir(path: impl Into<String>, permissions: u32) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Dir,
            size: 0,
            permissions: permissions & 0o7777,
            content_hash: None,
            link_target: None,
        }
    }

    /// Symlink entry pointing at `target`.
    pub fn symlink(path: impl Into<String>, target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            path: path.into(),
            kind: EntryKind::Symlink,
            size: 0,
            permissions: 0o777,
            content_hash: Some(Blake3Hash::compute(target.as_bytes())),
            link_target: Some(target),
        }
    }

    /// Native relative path for this entry.
    pub fn native_path(&self) -> PathBuf {
        self.path.split('/').collect()
    }

    fn check(&self) -> Result<()> {
        validate_relative_path(&self.path)?;

        let invalid = |reason| FormatError::InvalidEntry {
            path: self.path.clone(),
            reason,
        };

        if self.permissions & !0o7777 != 0 {
            return Err(invalid("permission bits out of range"));
        }

        match self.kind {
            EntryKind::File => {
                if self.content_hash.is_none() {
                    return Err(invalid("file entry without content hash"));
                }
                if self.link_target.is_some() {
                    return Err(invalid("file entry with link target"));
                }
            }
            EntryKind::Dir => {
                if self.size != 0 || self.content_hash.is_some() || self.link_target.is_some() {
                    return Err(invalid("directory entry carries content"));
                }
            }
            EntryKind::Symlink => {
                let Some(target) = &self.link_target else {
                    return Err(invalid("symlink entry without target"));
                };
                if self.size != 0 {
                    return Err(invalid("symlink entry with payload"));
                }
                if self.content_hash.as_ref() != Some(&Blake3Hash::compute(target.as_bytes())) {
                    return Err(FormatError::BlockChecksum {
                        path: self.path.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Check a manifest path against the relative-path rules: non-empty,
/// `/`-separated, not absolute, and free of empty, `.` and `..` components.
///
/// # Errors
///
/// Returns [`FormatError::InvalidPath`] naming the broken rule.
pub fn validate_relative_path(path: &str) -> Result<()> {
    let invalid = |reason| {
        Err(FormatError::InvalidPath {
            path: path.to_string(),
            reason,
        })
    };

    if path.is_empty() {
        return invalid("empty path");
    }
    if path.starts_with('/') {
        return invalid("absolute path");
    }
    if path.contains('\\') || path.contains('\0') {
        return invalid("forbidden character");
    }
    for component in path.split('/') {
        match component {
            "" => return invalid("empty component"),
            "." => return invalid("'.' component"),
            ".." => return invalid("parent traversal"),
            _ => {}
        }
    }
    Ok(())
}

/// Ordered sequence of entries, in the same order as the payload blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Entries in payload order.
    pub entries: Vec<ManifestEntry>,
}

impl PackageManifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, entry: ManifestEntry) {
        self.entries.push(entry);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in payload order.
    pub fn iter(&self) -> std::slice::Iter<'_, ManifestEntry> {
        self.entries.iter()
    }

    /// Sum of all payload block sizes, saturating at `u64::MAX`.
    ///
    /// A validated manifest never saturates.
    pub fn payload_size(&self) -> u64 {
        self.checked_payload_size().unwrap_or(u64::MAX)
    }

    /// Sum of all payload block sizes, `None` if it overflows.
    pub fn checked_payload_size(&self) -> Option<u64> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .try_fold(0u64, |total, e| total.checked_add(e.size))
    }

    /// Validate every structural invariant: each path is well-formed and
    /// unique, entry fields match their kind, no entry lives below a
    /// file or symlink entry, and the block sizes fit in a `u64` total.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        let mut leaves = HashSet::new();

        for entry in &self.entries {
            entry.check()?;
            if !seen.insert(entry.path.as_str()) {
                return Err(FormatError::DuplicatePath(entry.path.clone()));
            }
            if entry.kind != EntryKind::Dir {
                leaves.insert(entry.path.as_str());
            }
        }

        for entry in &self.entries {
            let mut ancestor = entry.path.as_str();
            while let Some((parent, _)) = ancestor.rsplit_once('/') {
                if leaves.contains(parent) {
                    return Err(FormatError::InvalidEntry {
                        path: entry.path.clone(),
                        reason: "parent is not a directory",
                    });
                }
                ancestor = parent;
            }
        }

        if self.checked_payload_size().is_none() {
            return Err(FormatError::Manifest(
                "payload block sizes overflow".to_string(),
            ));
        }

        Ok(())
    }

    /// Encode the manifest section as stored on disk.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Manifest`] if serialization fails.
    pub fn encode(&self, compress: bool) -> Result<Vec<u8>> {
        let raw = postcard::to_allocvec(self).map_err(|e| FormatError::Manifest(e.to_string()))?;
        if compress {
            Ok(zstd::encode_all(&raw[..], MANIFEST_ZSTD_LEVEL)?)
        } else {
            Ok(raw)
        }
    }

    /// Decode a manifest section. Does not validate; call
    /// [`PackageManifest::validate`] before trusting the paths.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Manifest`] if the bytes do not decode or
    /// decompress past [`MAX_MANIFEST_SIZE`].
    pub fn decode(bytes: &[u8], compressed: bool) -> Result<Self> {
        let raw;
        let bytes = if compressed {
            raw = decompress_bounded(bytes, MAX_MANIFEST_SIZE)?;
            &raw[..]
        } else {
            bytes
        };
        postcard::from_bytes(bytes).map_err(|e| FormatError::Manifest(e.to_string()))
    }
}

fn decompress_bounded(bytes: &[u8], limit: u64) -> Result<Vec<u8>> {
    let malformed = |e: std::io::Error| FormatError::Manifest(e.to_string());
    let decoder = zstd::stream::read::Decoder::new(bytes).map_err(malformed)?;
    let mut raw = Vec::new();
    // One byte past the limit tells "exactly at the limit" from "too large".
    decoder
        .take(limit + 1)
        .read_to_end(&mut raw)
        .map_err(malformed)?;
    if raw.len() as u64 > limit {
        return Err(FormatError::Manifest(format!(
            "manifest expands past {limit} bytes"
        )));
    }
    Ok(raw)
}

impl<'a> IntoIterator for &'a PackageManifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
