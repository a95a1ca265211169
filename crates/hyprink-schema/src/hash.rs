use serde::{Deserialize, Deserializer, Serialize};
use std::io::{self, Read, Write};

/// BLAKE3 digest of a payload block, a symlink target or a manifest section.
///
/// Stored as 64 lowercase hex characters so manifests stay readable when
/// dumped as JSON. Deserialization validates the encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Blake3Hash(String);

impl Blake3Hash {
    /// Compute BLAKE3 hash of data.
    pub fn compute(data: &[u8]) -> Self {
        Self::from(blake3::hash(data))
    }

    /// Stream `reader` to EOF and hash everything read.
    ///
    /// Returns the digest together with the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading fails.
    pub fn compute_reader<R: Read>(mut reader: R) -> io::Result<(Self, u64)> {
        let mut hasher = blake3::Hasher::new();
        let mut buf = [0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }
        Ok((Self::from(hasher.finalize()), total))
    }

    /// Copy `reader` into `writer` to EOF, hashing the bytes on the way.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading or writing fails.
    pub fn compute_copy<R: Read, W: Write>(mut reader: R, mut writer: W) -> io::Result<(Self, u64)> {
        let mut hasher = blake3::Hasher::new();
        let mut buf = [0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            writer.write_all(&buf[..n])?;
            total += n as u64;
        }
        Ok((Self::from(hasher.finalize()), total))
    }

    /// Create a validated `Blake3Hash` from a hex string.
    ///
    /// # Errors
    ///
    /// Returns an error string if `s` is not exactly 64 ASCII hex characters.
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(format!("invalid BLAKE3 hash: expected 64 hex chars, got '{s}'"))
        }
    }

    /// Build from the raw 32 digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Decode back into raw digest bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        // Validated on every construction path, cannot fail.
        let _ = hex::decode_to_slice(&self.0, &mut out);
        out
    }

    /// Return the inner hex string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<blake3::Hash> for Blake3Hash {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash.to_hex().to_string())
    }
}

impl<'de> Deserialize<'de> for Blake3Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Blake3Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Blake3Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
