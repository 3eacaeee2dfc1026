//! Memo of file checksums keyed by cheap filesystem metadata.
//!
//! An entry is trusted only while the live file still has exactly the
//! recorded `(size, mtime, ctime, inode)`. Anything else triggers a rehash.
//! The cache is advisory: deleting the file just costs one full rehash.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

use fit_types::{read_optional, write_atomic, ContentHash};
use fit_vcs::VersionControlBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IndexError, IndexResult};

/// Filesystem metadata that validates a cached checksum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    pub size: u64,
    /// Modification time, nanoseconds since the epoch.
    pub mtime: i64,
    /// Status change time, nanoseconds since the epoch (0 where unsupported).
    pub ctime: i64,
    pub inode: u64,
}

impl FileStats {
    /// Stat a file. `Ok(None)` when it does not exist.
    pub fn of(path: &Path) -> io::Result<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => Ok(Some(Self::from_metadata(&meta))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[cfg(unix)]
    fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            size: meta.len(),
            mtime: meta.mtime() * 1_000_000_000 + meta.mtime_nsec(),
            ctime: meta.ctime() * 1_000_000_000 + meta.ctime_nsec(),
            inode: meta.ino(),
        }
    }

    #[cfg(not(unix))]
    fn from_metadata(meta: &Metadata) -> Self {
        use std::time::UNIX_EPOCH;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Self {
            size: meta.len(),
            mtime,
            ctime: 0,
            inode: 0,
        }
    }
}

/// A cached checksum together with the stats it was computed under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatEntry {
    pub hash: ContentHash,
    pub stats: FileStats,
}

/// Result of [`StatCache::refresh`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Refresh {
    /// Current `(hash, stats)` of every requested non-empty file.
    pub entries: BTreeMap<String, StatEntry>,
    /// Requested files that exist but are zero bytes long.
    pub empty: BTreeSet<String>,
    /// Requested files that do not exist.
    pub missing: BTreeSet<String>,
    /// Paths whose checksum had to be recomputed.
    pub rehashed: Vec<String>,
    /// Whether the cache content changed.
    pub changed: bool,
}

/// Persisted `path -> (hash, stats)` memo.
#[derive(Debug)]
pub struct StatCache {
    file: PathBuf,
    entries: BTreeMap<String, StatEntry>,
    dirty: bool,
}

impl StatCache {
    /// An empty cache that will persist to `file`.
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the cache at `file`. A missing or unreadable cache is empty.
    pub fn open(file: impl Into<PathBuf>) -> Self {
        let mut cache = Self::new(file);
        match read_optional(&cache.file) {
            Ok(Some(data)) => match serde_json::from_slice(&data) {
                Ok(entries) => cache.entries = entries,
                Err(e) => {
                    warn!(file = %cache.file.display(), error = %e, "discarding corrupt stat cache")
                }
            },
            Ok(None) => {}
            Err(e) => warn!(file = %cache.file.display(), error = %e, "stat cache unreadable"),
        }
        cache
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&StatEntry> {
        self.entries.get(path)
    }

    /// Whether there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bring the cache up to date for `paths` and return their checksums.
    ///
    /// Files that are missing or empty are left out of the result and dropped
    /// from the cache, along with any other cached path whose file has gone.
    /// Every file whose stats are unknown or different is rehashed through
    /// `vcs` in a single batch.
    pub fn refresh(
        &mut self,
        vcs: &dyn VersionControlBackend,
        paths: &BTreeSet<String>,
    ) -> IndexResult<Refresh> {
        let root = vcs.root();
        let mut refresh = Refresh::default();
        let mut live = BTreeMap::new();

        for path in paths {
            match FileStats::of(&root.join(path)).map_err(|e| IndexError::io(path, e))? {
                None => {
                    refresh.missing.insert(path.clone());
                }
                Some(stats) if stats.size == 0 => {
                    refresh.empty.insert(path.clone());
                }
                Some(stats) => {
                    live.insert(path.clone(), stats);
                }
            }
        }

        let touched: Vec<String> = live
            .iter()
            .filter(|(path, stats)| self.entries.get(*path).map(|e| &e.stats) != Some(*stats))
            .map(|(path, _)| path.clone())
            .collect();

        if !touched.is_empty() {
            let hashes = vcs.hash_objects(&touched)?;
            for (path, hash) in touched.iter().zip(hashes) {
                let stats = live[path];
                self.entries.insert(path.clone(), StatEntry { hash, stats });
            }
            refresh.changed = true;
        }

        let before = self.entries.len();
        self.entries.retain(|path, _| {
            if paths.contains(path) {
                live.contains_key(path)
            } else {
                root.join(path).is_file()
            }
        });
        if self.entries.len() != before {
            refresh.changed = true;
        }

        for path in live.keys() {
            if let Some(entry) = self.entries.get(path) {
                refresh.entries.insert(path.clone(), entry.clone());
            }
        }

        debug!(
            requested = paths.len(),
            rehashed = touched.len(),
            empty = refresh.empty.len(),
            missing = refresh.missing.len(),
            "stat cache refreshed"
        );
        refresh.rehashed = touched;
        self.dirty |= refresh.changed;
        Ok(refresh)
    }

    /// Remember files whose checksum is already known, such as files just
    /// written from the object cache. Missing or empty files are forgotten.
    pub fn record(
        &mut self,
        root: &Path,
        items: &BTreeMap<String, ContentHash>,
    ) -> IndexResult<()> {
        for (path, hash) in items {
            match FileStats::of(&root.join(path)).map_err(|e| IndexError::io(path, e))? {
                Some(stats) if stats.size > 0 => {
                    self.entries.insert(
                        path.clone(),
                        StatEntry {
                            hash: hash.clone(),
                            stats,
                        },
                    );
                }
                _ => {
                    self.entries.remove(path);
                }
            }
            self.dirty = true;
        }
        Ok(())
    }

    /// Drop the memo for `path`.
    pub fn forget(&mut self, path: &str) {
        if self.entries.remove(path).is_some() {
            self.dirty = true;
        }
    }

    /// Write the cache if anything changed since it was loaded.
    pub fn save(&mut self) -> IndexResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let data = serde_json::to_vec(&self.entries)
            .map_err(|e| IndexError::Serialization(e.to_string()))?;
        write_atomic(&self.file, &data)
            .map_err(|e| IndexError::io(self.file.display().to_string(), e))?;
        self.dirty = false;
        Ok(())
    }
}
