//! The tracked-item manifest and its canonical on-disk codec.
//!
//! On disk the manifest is a flat, pretty-printed JSON object keyed by the
//! full item path, with keys in sorted order:
//!
//! ```text
//! {
//!   "assets/logo.png": [
//!     "d670460b4b4aece5915caf5c68d12f560a9fe3e4",
//!     13
//!   ]
//! }
//! ```
//!
//! Encoding is deterministic, so the same logical manifest always produces
//! byte-identical output and VCS diffs of `.fit` stay meaningful.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::hash::ContentHash;
use crate::persist::{read_optional, write_atomic};

/// Expected content of a single tracked item.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(ContentHash, u64)", into = "(ContentHash, u64)")]
pub struct ManifestEntry {
    pub hash: ContentHash,
    pub size: u64,
}

impl ManifestEntry {
    pub fn new(hash: ContentHash, size: u64) -> Self {
        Self { hash, size }
    }
}

impl From<(ContentHash, u64)> for ManifestEntry {
    fn from((hash, size): (ContentHash, u64)) -> Self {
        Self { hash, size }
    }
}

impl From<ManifestEntry> for (ContentHash, u64) {
    fn from(entry: ManifestEntry) -> Self {
        (entry.hash, entry.size)
    }
}

/// Ordered mapping from item path to expected content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Insert or replace an item, returning the previous entry.
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        entry: ManifestEntry,
    ) -> Option<ManifestEntry> {
        self.entries.insert(path.into(), entry)
    }

    pub fn remove(&mut self, path: &str) -> Option<ManifestEntry> {
        self.entries.remove(path)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ManifestEntry> {
        self.entries.iter()
    }

    /// All item paths, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Sum of recorded item sizes. The object cache is bounded relative to this.
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    /// Keep only the items for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &ManifestEntry) -> bool) {
        self.entries.retain(|path, entry| keep(path, entry));
    }

    pub fn into_inner(self) -> BTreeMap<String, ManifestEntry> {
        self.entries
    }

    // ---------------------------------------------------------------
    // Codec
    // ---------------------------------------------------------------

    /// Encode as canonical bytes (sorted, pretty JSON, trailing newline).
    pub fn to_bytes(&self) -> Vec<u8> {
        // A BTreeMap of strings to (string, u64) tuples cannot fail to encode.
        let mut out = serde_json::to_vec_pretty(&self.entries).unwrap_or_default();
        out.push(b'\n');
        out
    }

    /// Decode from bytes. Empty (or whitespace-only) input is an empty manifest.
    pub fn from_slice(data: &[u8]) -> TypeResult<Self> {
        if data.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Self::new());
        }

        let entries: BTreeMap<String, ManifestEntry> =
            serde_json::from_slice(data).map_err(|e| TypeError::Manifest {
                line: e.line(),
                column: e.column(),
                message: e.to_string(),
            })?;

        for path in entries.keys() {
            validate_path(path)?;
        }
        Ok(Self { entries })
    }

    /// Read a manifest file. A missing file is an empty manifest.
    pub fn load(path: &Path) -> TypeResult<Self> {
        match read_optional(path)? {
            Some(data) => Self::from_slice(&data),
            None => Ok(Self::new()),
        }
    }

    /// Atomically replace the manifest file.
    pub fn save(&self, path: &Path) -> TypeResult<()> {
        write_atomic(path, &self.to_bytes())?;
        Ok(())
    }

    /// Git blob checksum of the canonical encoding, i.e. what the VCS will
    /// record for this manifest once it is staged.
    pub fn blob_hash(&self) -> ContentHash {
        ContentHash::of_blob(&self.to_bytes())
    }
}

impl FromIterator<(String, ManifestEntry)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, ManifestEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<(String, ManifestEntry)> for Manifest {
    fn extend<I: IntoIterator<Item = (String, ManifestEntry)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = (&'a String, &'a ManifestEntry);
    type IntoIter = btree_map::Iter<'a, String, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Item paths are relative, forward-slash separated, with no empty,
/// `.` or `..` segments.
fn validate_path(path: &str) -> TypeResult<()> {
    let bad = path.is_empty()
        || path.contains('\\')
        || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(TypeError::InvalidPath(path.to_string()));
    }
    Ok(())
}
