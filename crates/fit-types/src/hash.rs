use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::TypeError;

/// Hex checksum of the empty blob, as printed by `git hash-object /dev/null`.
pub const EMPTY_BLOB_HEX: &str = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";

const HEX_LEN: usize = 40;

/// Content checksum of a tracked item.
///
/// A `ContentHash` is the git blob checksum of a file: SHA-1 over
/// `"blob <len>\0"` followed by the bytes. The same content always yields the
/// same hash, which is what lets the object cache deduplicate and lets the
/// manifest name content without storing it. Always 40 lowercase hex chars.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Parse from a hex string (case-insensitive, stored lowercase).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.trim();
        if s.len() != HEX_LEN {
            return Err(TypeError::InvalidLength {
                expected: HEX_LEN,
                actual: s.len(),
            });
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidHex(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Compute the blob checksum of in-memory content.
    pub fn of_blob(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(format!("blob {}\0", data.len()).as_bytes());
        hasher.update(data);
        Self(hex::encode(hasher.finalize()))
    }

    /// Compute the blob checksum of a file, streaming its content.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();

        let mut hasher = Sha1::new();
        hasher.update(format!("blob {len}\0").as_bytes());
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Checksum of zero-length content.
    pub fn empty_blob() -> Self {
        Self(EMPTY_BLOB_HEX.to_string())
    }

    /// The full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form used in listings (first 7 characters, like git).
    pub fn short(&self) -> &str {
        &self.0[..7]
    }

    /// Shard directory and file name under an object directory.
    pub fn shard(&self) -> (&str, &str) {
        self.0.split_at(2)
    }

    /// Key naming this object in a remote store: `ab/cdef...`.
    pub fn object_key(&self) -> String {
        let (dir, file) = self.shard();
        format!("{dir}/{file}")
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl std::str::FromStr for ContentHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
