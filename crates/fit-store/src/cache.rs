use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use fit_types::{read_optional, write_atomic, ContentHash};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::ledger::{Ledger, Partition};

const LEDGER_FILE: &str = "cache-ledger";
const OBJECTS_DIR: &str = "objects";
const TEMP_DIR: &str = "temp";

/// A working-tree file to be copied into the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewObject {
    pub hash: ContentHash,
    pub size: u64,
    pub source: PathBuf,
}

impl NewObject {
    pub fn new(hash: ContentHash, size: u64, source: impl Into<PathBuf>) -> Self {
        Self {
            hash,
            size,
            source: source.into(),
        }
    }
}

/// Result of [`ContentCache::insert`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Objects copied in by this call.
    pub inserted: Vec<ContentHash>,
    /// Objects that were already cached.
    pub found: Vec<ContentHash>,
}

/// Result of [`ContentCache::prune`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub evicted: Vec<ContentHash>,
    pub freed: u64,
}

/// The local object cache.
///
/// Every mutating operation persists the ledger before returning, and
/// object files are always written to a temporary file first and renamed
/// into place, so an interrupted run never leaves a truncated object under
/// a valid name.
#[derive(Debug)]
pub struct ContentCache {
    objects: PathBuf,
    temp: PathBuf,
    ledger_file: PathBuf,
    ledger: Ledger,
}

impl ContentCache {
    /// Open the cache under `fit_dir`, creating its directories.
    pub fn open(fit_dir: &Path) -> StoreResult<Self> {
        let objects = fit_dir.join(OBJECTS_DIR);
        let temp = fit_dir.join(TEMP_DIR);
        for dir in [&objects, &temp] {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }

        let ledger_file = fit_dir.join(LEDGER_FILE);
        let stored = read_optional(&ledger_file).map_err(|e| StoreError::io(&ledger_file, e))?;
        let ledger = match stored {
            Some(data) => serde_json::from_slice(&data).map_err(|e| StoreError::CorruptLedger {
                path: ledger_file.clone(),
                message: e.to_string(),
            })?,
            None => Ledger::new(),
        };

        Ok(Self {
            objects,
            temp,
            ledger_file,
            ledger,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Canonical location of an object, whether or not it is present.
    pub fn object_path(&self, hash: &ContentHash) -> PathBuf {
        let (dir, file) = hash.shard();
        self.objects.join(dir).join(file)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.ledger.contains(hash) && self.object_path(hash).is_file()
    }

    /// Directory for in-flight transfers. Same filesystem as the objects.
    pub fn temp_dir(&self) -> &Path {
        &self.temp
    }

    /// A fresh, uniquely named file in the temp directory.
    pub fn temp_file(&self) -> StoreResult<NamedTempFile> {
        NamedTempFile::new_in(&self.temp).map_err(|e| StoreError::io(&self.temp, e))
    }

    /// Copy objects into the cache.
    ///
    /// Provisional objects go to the pending partition, unless they are
    /// already in LRU, where they only become most recently used. Others go
    /// to LRU, leaving pending if they were there. Objects already present
    /// are not copied again.
    pub fn insert(&mut self, items: &[NewObject], provisional: bool) -> StoreResult<InsertOutcome> {
        let mut outcome = InsertOutcome::default();
        for item in items {
            let target = self.object_path(&item.hash);
            if target.is_file() {
                outcome.found.push(item.hash.clone());
            } else {
                self.copy_in(&item.source, &target)?;
                outcome.inserted.push(item.hash.clone());
            }

            if provisional {
                self.ledger.add_pending(&item.hash, item.size);
            } else {
                self.ledger.touch(&item.hash, item.size);
            }
        }
        debug!(
            inserted = outcome.inserted.len(),
            found = outcome.found.len(),
            provisional,
            "cache insert"
        );
        self.persist()?;
        Ok(outcome)
    }

    fn copy_in(&self, source: &Path, target: &Path) -> StoreResult<()> {
        let mut tmp = self.temp_file()?;
        let mut src = File::open(source).map_err(|e| StoreError::io(source, e))?;
        io::copy(&mut src, tmp.as_file_mut()).map_err(|e| StoreError::io(source, e))?;
        self.place(tmp, target)
    }

    fn place(&self, tmp: NamedTempFile, target: &Path) -> StoreResult<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        tmp.persist(target).map_err(|e| StoreError::io(target, e.error))?;
        Ok(())
    }

    /// Locate cached objects. Misses are simply absent from the result.
    /// LRU hits become most recently used when `mark_use` is set.
    pub fn find<'a, I>(
        &mut self,
        hashes: I,
        mark_use: bool,
    ) -> StoreResult<BTreeMap<ContentHash, PathBuf>>
    where
        I: IntoIterator<Item = &'a ContentHash>,
    {
        let mut found = BTreeMap::new();
        let mut bumped = false;
        for hash in hashes {
            if !self.contains(hash) {
                continue;
            }
            if mark_use && self.ledger.partition_of(hash) == Some(Partition::Lru) {
                self.ledger.bump(hash);
                bumped = true;
            }
            found.insert(hash.clone(), self.object_path(hash));
        }
        if bumped {
            self.persist()?;
        }
        Ok(found)
    }

    /// Flag pending objects as referenced by a landed commit.
    pub fn commit<'a, I>(&mut self, hashes: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = &'a ContentHash>,
    {
        let flagged = hashes.into_iter().filter(|h| self.ledger.set_committed(h)).count();
        if flagged > 0 {
            self.persist()?;
        }
        Ok(flagged)
    }

    /// Move pending objects to LRU once they are known to exist remotely.
    pub fn mark_synced<'a, I>(&mut self, hashes: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = &'a ContentHash>,
    {
        let moved = hashes.into_iter().filter(|h| self.ledger.promote(h)).count();
        if moved > 0 {
            self.persist()?;
        }
        Ok(moved)
    }

    /// Move a downloaded file into place as a most recently used LRU object.
    ///
    /// The content is checked against `hash` first; a mismatch leaves the
    /// cache untouched and the temporary file is deleted.
    pub fn admit(
        &mut self,
        hash: &ContentHash,
        size: u64,
        file: NamedTempFile,
    ) -> StoreResult<PathBuf> {
        let actual = ContentHash::of_file(file.path()).map_err(|e| StoreError::io(file.path(), e))?;
        if &actual != hash {
            return Err(StoreError::HashMismatch {
                expected: hash.clone(),
                actual,
            });
        }
        let target = self.object_path(hash);
        self.place(file, &target)?;
        self.ledger.touch(hash, size);
        self.persist()?;
        Ok(target)
    }

    /// Delete LRU objects. Pending objects are never touched.
    pub fn remove<'a, I>(&mut self, hashes: I) -> StoreResult<Vec<ContentHash>>
    where
        I: IntoIterator<Item = &'a ContentHash>,
    {
        let mut removed = Vec::new();
        for hash in hashes {
            if self.ledger.remove_lru(hash).is_some() {
                self.delete_file(hash)?;
                removed.push(hash.clone());
            }
        }
        if !removed.is_empty() {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Delete pending objects that were saved but never committed, because a
    /// newer save superseded them.
    pub fn discard_pending<'a, I>(&mut self, hashes: I) -> StoreResult<Vec<ContentHash>>
    where
        I: IntoIterator<Item = &'a ContentHash>,
    {
        let mut discarded = Vec::new();
        for hash in hashes {
            let uncommitted = self
                .ledger
                .pending
                .items
                .get(hash)
                .is_some_and(|item| !item.committed);
            if uncommitted {
                self.ledger.remove_pending(hash);
                self.delete_file(hash)?;
                discarded.push(hash.clone());
            }
        }
        if !discarded.is_empty() {
            debug!(count = discarded.len(), "discarded superseded saves");
            self.persist()?;
        }
        Ok(discarded)
    }

    /// Evict LRU objects, oldest first, until the LRU size is at most
    /// `target` bytes. Pending objects are never evicted.
    pub fn prune(&mut self, target: u64) -> StoreResult<PruneReport> {
        let mut report = PruneReport::default();
        for hash in self.ledger.eviction_candidates(target) {
            if let Some(item) = self.ledger.remove_lru(&hash) {
                self.delete_file(&hash)?;
                report.freed += item.size;
                report.evicted.push(hash);
            }
        }
        self.ledger.renumber();
        if !report.evicted.is_empty() {
            info!(
                evicted = report.evicted.len(),
                freed = report.freed,
                remaining = self.ledger.lru.size,
                target,
                "pruned object cache"
            );
        }
        self.persist()?;
        Ok(report)
    }

    /// `(lru, pending)` sizes in bytes.
    pub fn size(&self) -> (u64, u64) {
        (self.ledger.lru.size, self.ledger.pending.size)
    }

    /// Objects in the evictable partition.
    pub fn committed_objects(&self) -> Vec<ContentHash> {
        self.ledger.lru.items.keys().cloned().collect()
    }

    /// Objects awaiting upload.
    pub fn pending_objects(&self) -> Vec<ContentHash> {
        self.ledger.pending.items.keys().cloned().collect()
    }

    fn delete_file(&self, hash: &ContentHash) -> StoreResult<()> {
        let path = self.object_path(hash);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(object = %hash, "cached object already missing");
                Ok(())
            }
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn persist(&self) -> StoreResult<()> {
        let data = serde_json::to_vec(&self.ledger)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        write_atomic(&self.ledger_file, &data).map_err(|e| StoreError::io(&self.ledger_file, e))
    }
}
