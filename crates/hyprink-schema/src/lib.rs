//! On-disk contract for hyprink package files.
//!
//! # Package Format (Version 1)
//!
//! ```text
//! +---------------------------+
//! | Header (64 bytes)         |
//! |  - magic: "HYPRPKG\0"     |
//! |  - version, flags, sizes  |
//! |  - manifest BLAKE3        |
//! +---------------------------+
//! | Manifest (postcard, zstd) |
//! +---------------------------+
//! | Payload blocks            |  file contents, manifest order
//! +---------------------------+
//! ```
//!
//! The header is the only part that must stay byte-stable across releases;
//! everything after it is interpreted according to `format_version`.

pub mod hash;
pub mod header;
pub mod manifest;

pub use hash::Blake3Hash;
pub use header::{FLAG_ZSTD_MANIFEST, FORMAT_VERSION, HEADER_SIZE, MAGIC, PackageHeader, has_magic};
pub use manifest::{
    EntryKind, MAX_MANIFEST_SIZE, ManifestEntry, PackageManifest, validate_relative_path,
};

use thiserror::Error;

/// Errors raised while decoding or validating a package file.
#[derive(Debug, Error)]
pub enum FormatError {
    /// I/O error while reading the package.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid magic bytes in the header.
    #[error("invalid magic: not a hyprink package")]
    InvalidMagic,

    /// Unsupported format version.
    #[error("unsupported package format version: {0}")]
    UnsupportedVersion(u32),

    /// Header advertises flags this build does not understand.
    #[error("unsupported header flags: {0:#x}")]
    UnsupportedFlags(u32),

    /// The file is shorter or longer than the header declares.
    #[error("package length mismatch: expected {expected} bytes, found {actual}")]
    LengthMismatch {
        /// Length implied by the header.
        expected: u64,
        /// Length found on disk.
        actual: u64,
    },

    /// Manifest section does not match the header digest.
    #[error("manifest checksum mismatch")]
    ManifestChecksum,

    /// Manifest bytes could not be decoded.
    #[error("malformed manifest: {0}")]
    Manifest(String),

    /// Manifest path violates the relative-path rules.
    #[error("invalid manifest path '{path}': {reason}")]
    InvalidPath {
        /// Offending path as stored.
        path: String,
        /// Which rule it broke.
        reason: &'static str,
    },

    /// The same path appears twice in the manifest.
    #[error("duplicate manifest path '{0}'")]
    DuplicatePath(String),

    /// Entry fields are inconsistent with its kind.
    #[error("invalid manifest entry '{path}': {reason}")]
    InvalidEntry {
        /// Entry path.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Header payload size disagrees with the manifest.
    #[error("payload size mismatch: header declares {declared} bytes, manifest sums to {manifest}")]
    PayloadSize {
        /// `payload_size` from the header.
        declared: u64,
        /// Sum of file entry sizes.
        manifest: u64,
    },

    /// A payload block does not hash to its manifest digest.
    #[error("content hash mismatch for '{path}'")]
    BlockChecksum {
        /// Entry whose block is corrupt.
        path: String,
    },
}

impl FormatError {
    /// True for damage to otherwise well-formed data (bad checksums,
    /// truncation), false for structural problems.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::LengthMismatch { .. } | Self::ManifestChecksum | Self::BlockChecksum { .. }
        )
    }
}

/// Result type for format operations.
pub type Result<T> = std::result::Result<T, FormatError>;
