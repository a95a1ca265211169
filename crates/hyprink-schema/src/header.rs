//! Fixed-size header at the start of every package file.

use std::io::Read;

use crate::{Blake3Hash, FormatError, Result};

/// Magic bytes identifying a hyprink package.
pub const MAGIC: &[u8; 8] = b"HYPRPKG\0";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Header size in bytes (fixed).
pub const HEADER_SIZE: usize = 64;

/// Manifest section is zstd-compressed.
pub const FLAG_ZSTD_MANIFEST: u32 = 0x1;

const KNOWN_FLAGS: u32 = FLAG_ZSTD_MANIFEST;

/// Layout (64 bytes total):
/// ```text
/// Offset  Size  Field
/// 0       8     magic ("HYPRPKG\0")
/// 8       4     version (u32 LE)
/// 12      4     flags (u32 LE)
/// 16      8     manifest_size (u64 LE) - stored manifest section length
/// 24      8     payload_size (u64 LE) - concatenated block length
/// 32      32    manifest_hash - BLAKE3 of the stored manifest section
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageHeader {
    /// Feature flags (`FLAG_*`).
    pub flags: u32,
    /// Length of the manifest section as stored.
    pub manifest_size: u64,
    /// Length of the payload section.
    pub payload_size: u64,
    /// Digest of the stored manifest section.
    pub manifest_hash: Blake3Hash,
}

impl PackageHeader {
    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[12..16].copy_from_slice(&self.flags.to_le_bytes());
        buf[16..24].copy_from_slice(&self.manifest_size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[32..64].copy_from_slice(&self.manifest_hash.to_bytes());

        buf
    }

    /// Deserialize header from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::InvalidMagic`], [`FormatError::UnsupportedVersion`]
    /// or [`FormatError::UnsupportedFlags`] when the header is not one this
    /// build can read.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if &buf[0..8] != MAGIC {
            return Err(FormatError::InvalidMagic);
        }

        let version = u32::from_le_bytes(le_array(&buf[8..12]));
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let flags = u32::from_le_bytes(le_array(&buf[12..16]));
        if flags & !KNOWN_FLAGS != 0 {
            return Err(FormatError::UnsupportedFlags(flags));
        }

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&buf[32..64]);

        Ok(Self {
            flags,
            manifest_size: u64::from_le_bytes(le_array(&buf[16..24])),
            payload_size: u64::from_le_bytes(le_array(&buf[24..32])),
            manifest_hash: Blake3Hash::from_bytes(digest),
        })
    }

    /// Read and parse the header from the start of `reader`.
    ///
    /// A stream shorter than [`HEADER_SIZE`] is reported as a bad magic: it
    /// cannot be a package.
    ///
    /// # Errors
    ///
    /// Same as [`PackageHeader::from_bytes`], plus I/O errors.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        match reader.read_exact(&mut buf) {
            Ok(()) => Self::from_bytes(&buf),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(FormatError::InvalidMagic)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the manifest section is zstd-compressed.
    pub fn manifest_compressed(&self) -> bool {
        self.flags & FLAG_ZSTD_MANIFEST != 0
    }

    /// Total file length implied by this header, `None` if it overflows.
    pub fn total_len(&self) -> Option<u64> {
        (HEADER_SIZE as u64)
            .checked_add(self.manifest_size)?
            .checked_add(self.payload_size)
    }

    /// Offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        HEADER_SIZE as u64 + self.manifest_size
    }
}

/// Check whether `prefix` starts with the package magic.
pub fn has_magic(prefix: &[u8]) -> bool {
    prefix.len() >= MAGIC.len() && &prefix[..MAGIC.len()] == MAGIC
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
