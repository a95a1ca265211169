//! Package file reading and validation.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use hyprink_schema::{
    Blake3Hash, EntryKind, FormatError, ManifestEntry, PackageHeader, PackageManifest,
};
use tracing::debug;

use crate::error::{Error, Result};
use crate::reporter::Reporter;

/// An opened package whose header and manifest have been validated.
///
/// Opening checks everything that does not require reading the payload:
/// magic, version, total length, manifest digest, manifest structure and
/// path rules, and the declared payload size. Block contents are checked by
/// [`PackageReader::verify_blocks`] or while copying them out.
#[derive(Debug)]
pub struct PackageReader {
    path: PathBuf,
    file: File,
    header: PackageHeader,
    manifest: PackageManifest,
    /// Payload offset of each entry's block; `None` for non-file entries.
    offsets: Vec<Option<u64>>,
}

impl PackageReader {
    /// Open and validate the package at `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `path` is missing or not a regular file
    /// - [`Error::InvalidFormat`] for a foreign file or a malformed manifest
    /// - [`Error::CorruptData`] for length or digest mismatches
    pub fn open(path: &Path) -> Result<Self> {
        let not_found = || Error::NotFound {
            what: "package file",
            path: path.to_path_buf(),
        };
        let meta = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(not_found()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(Error::io(format!("reading {}", path.display()), e)),
        };

        let mut file = File::open(path)
            .map_err(|e| Error::io(format!("opening {}", path.display()), e))?;
        let header = PackageHeader::read_from(&mut file).map_err(|e| Error::format(path, e))?;

        let actual = meta.len();
        if header.total_len() != Some(actual) {
            return Err(Error::format(
                path,
                FormatError::LengthMismatch {
                    expected: header.total_len().unwrap_or(u64::MAX),
                    actual,
                },
            ));
        }

        // Bounded by the file length checked above.
        let manifest_len = usize::try_from(header.manifest_size).map_err(|_| {
            Error::format(path, FormatError::Manifest("manifest too large".into()))
        })?;
        let mut stored = vec![0u8; manifest_len];
        file.read_exact(&mut stored)
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;

        if Blake3Hash::compute(&stored) != header.manifest_hash {
            return Err(Error::format(path, FormatError::ManifestChecksum));
        }

        let manifest = PackageManifest::decode(&stored, header.manifest_compressed())
            .map_err(|e| Error::format(path, e))?;
        manifest.validate().map_err(|e| Error::format(path, e))?;

        let declared = header.payload_size;
        let summed = manifest.payload_size();
        if declared != summed {
            return Err(Error::format(
                path,
                FormatError::PayloadSize {
                    declared,
                    manifest: summed,
                },
            ));
        }

        let offsets = block_offsets(&manifest, header.payload_offset())
            .ok_or_else(|| {
                Error::format(path, FormatError::Manifest("payload offsets overflow".into()))
            })?;

        debug!(
            "Opened package {:?}: {} entries, {} payload bytes",
            path,
            manifest.len(),
            declared
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            manifest,
            offsets,
        })
    }

    /// Package file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validated header.
    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    /// Validated manifest.
    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    /// Consume the reader, keeping only the manifest.
    pub fn into_manifest(self) -> PackageManifest {
        self.manifest
    }

    /// Hash every payload block against the manifest without writing
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptData`] naming the first bad block.
    pub fn verify_blocks(&mut self, reporter: &dyn Reporter) -> Result<()> {
        reporter.phase("verify", "verifying payload blocks");
        let total = self.manifest.len();
        for index in 0..total {
            if self.offsets[index].is_none() {
                continue;
            }
            self.copy_block(index, io::sink())?;
            reporter.entry("verify", &self.manifest.entries[index].path, index + 1, total);
        }
        Ok(())
    }

    /// Stream the block of file entry `index` into `out`, checking its
    /// length and digest.
    ///
    /// Bytes reach `out` before the digest is known, so callers must treat
    /// the output as garbage when this returns an error.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptData`] on a digest mismatch, [`Error::Io`] on read or
    /// write failure.
    pub fn copy_block<W: Write>(&mut self, index: usize, out: W) -> Result<()> {
        let entry: &ManifestEntry = &self.manifest.entries[index];
        let Some(offset) = self.offsets[index] else {
            return Ok(());
        };
        let io_err = |e| Error::io(format!("reading {}", self.path.display()), e);

        self.file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
        let block = BufReader::new(&self.file).take(entry.size);
        let (hash, copied) = Blake3Hash::compute_copy(block, out).map_err(|e| {
            Error::io(
                format!("extracting '{}' from {}", entry.path, self.path.display()),
                e,
            )
        })?;

        let corrupt = || {
            Error::format(
                &self.path,
                FormatError::BlockChecksum {
                    path: entry.path.clone(),
                },
            )
        };
        if copied != entry.size || Some(&hash) != entry.content_hash.as_ref() {
            return Err(corrupt());
        }
        Ok(())
    }
}

/// Start of each entry's block; `None` for non-file entries. Returns
/// `None` overall if an offset does not fit in a `u64`.
fn block_offsets(manifest: &PackageManifest, payload_start: u64) -> Option<Vec<Option<u64>>> {
    let mut offset = payload_start;
    let mut offsets = Vec::with_capacity(manifest.len());
    for entry in manifest {
        if entry.kind == EntryKind::File {
            offsets.push(Some(offset));
            offset = offset.checked_add(entry.size)?;
        } else {
            offsets.push(None);
        }
    }
    Some(offsets)
}

/// Read the manifest of the package at `path`.
///
/// Header and manifest are validated; payload blocks are not read.
///
/// # Errors
///
/// Same as [`PackageReader::open`].
pub fn read_manifest(path: &Path) -> Result<PackageManifest> {
    PackageReader::open(path).map(PackageReader::into_manifest)
}

/// Fully validate the package at `path` without writing anything.
///
/// # Errors
///
/// Same as [`PackageReader::open`] and [`PackageReader::verify_blocks`].
pub fn verify(path: &Path, reporter: &dyn Reporter) -> Result<PackageManifest> {
    let mut reader = PackageReader::open(path)?;
    reader.verify_blocks(reporter)?;
    Ok(reader.into_manifest())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Hand-assembled packages for exercising the reader against
    //! inputs the pack engine would never produce.

    use hyprink_schema::{FLAG_ZSTD_MANIFEST, PackageHeader, PackageManifest};

    /// Assemble a package from a manifest and raw payload, computing a
    /// consistent header.
    pub(crate) fn assemble(manifest: &PackageManifest, payload: &[u8]) -> Vec<u8> {
        let stored = manifest.encode(true).unwrap();
        let header = PackageHeader {
            flags: FLAG_ZSTD_MANIFEST,
            manifest_size: stored.len() as u64,
            payload_size: payload.len() as u64,
            manifest_hash: hyprink_schema::Blake3Hash::compute(&stored),
        };
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&stored);
        bytes.extend_from_slice(payload);
        bytes
    }
}
