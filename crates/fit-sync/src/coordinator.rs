//! Moves objects between the local cache, the working tree and the remote.

use std::collections::BTreeSet;
use std::path::Path;

use fit_store::{ContentCache, StoreError};
use fit_types::{ContentHash, Manifest};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::progress::{ItemOutcome, TransferProgress};
use crate::remote::RemoteStore;
use crate::types::{GetPlan, PlannedItem, PutPlan, TransferReport};

/// Runs `get` and `put` for one repository.
///
/// Transfers are awaited one at a time. A failing item is recorded in the
/// report and the transfer carries on with the next one.
pub struct TransferCoordinator<'a> {
    cache: &'a mut ContentCache,
    store: Option<&'a dyn RemoteStore>,
    prune_factor: f64,
}

impl<'a> TransferCoordinator<'a> {
    /// After each transfer the cache is pruned to `prune_factor` times the
    /// total size of the manifest.
    pub fn new(
        cache: &'a mut ContentCache,
        store: Option<&'a dyn RemoteStore>,
        prune_factor: f64,
    ) -> Self {
        Self {
            cache,
            store,
            prune_factor,
        }
    }

    fn remote(&self) -> SyncResult<&'a dyn RemoteStore> {
        self.store.ok_or(SyncError::NoRemoteStore)
    }

    // ---------------------------------------------------------------
    // get
    // ---------------------------------------------------------------

    /// Which of `targets` are zero-byte stubs in the working tree, split by
    /// whether the cache can fill them.
    pub fn plan_get(
        &self,
        root: &Path,
        manifest: &Manifest,
        targets: &BTreeSet<String>,
    ) -> SyncResult<GetPlan> {
        let mut plan = GetPlan::default();
        for path in targets {
            let Some(entry) = manifest.get(path) else {
                continue;
            };
            let is_stub = match std::fs::metadata(root.join(path)) {
                Ok(meta) => meta.is_file() && meta.len() == 0,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => return Err(e.into()),
            };
            if !is_stub {
                continue;
            }
            let item = PlannedItem::new(path.clone(), entry.clone());
            if self.cache.contains(&entry.hash) {
                plan.from_cache.push(item);
            } else {
                plan.downloads.push(item);
            }
        }
        Ok(plan)
    }

    /// Fill zero-byte stubs among `targets` with their content.
    pub async fn get(
        &mut self,
        root: &Path,
        manifest: &Manifest,
        targets: &BTreeSet<String>,
        progress: &mut dyn TransferProgress,
    ) -> SyncResult<TransferReport> {
        let plan = self.plan_get(root, manifest, targets)?;
        let store = if plan.downloads.is_empty() {
            None
        } else {
            Some(self.remote()?)
        };

        let mut report = TransferReport::default();
        let cached = self.cache.find(plan.from_cache.iter().map(|i| &i.entry.hash), true)?;
        for item in &plan.from_cache {
            if let Some(object) = cached.get(&item.entry.hash) {
                place_in_worktree(object, &root.join(&item.path)).await?;
                report.from_cache.push(item.path.clone());
                report.written.insert(item.path.clone(), item.entry.hash.clone());
            }
        }

        if let Some(store) = store {
            progress.start(plan.download_bytes());
            for item in &plan.downloads {
                progress.new_item(&item.path, item.entry.size);
                let outcome = self.download(store, root, item, &mut report).await?;
                progress.advance(item.entry.size);
                progress.item_finished(outcome);
            }
            progress.done();
            close(store).await;
        }

        info!(
            from_cache = report.from_cache.len(),
            downloaded = report.transferred.len(),
            failed = report.failed.len(),
            "get finished"
        );
        report.pruned = self.prune(manifest)?;
        Ok(report)
    }

    async fn download(
        &mut self,
        store: &dyn RemoteStore,
        root: &Path,
        item: &PlannedItem,
        report: &mut TransferReport,
    ) -> SyncResult<ItemOutcome> {
        let hash = &item.entry.hash;
        let dest = root.join(&item.path);

        // Another path with the same content may have fetched it already.
        if self.cache.contains(hash) {
            place_in_worktree(&self.cache.object_path(hash), &dest).await?;
            report.from_cache.push(item.path.clone());
            report.written.insert(item.path.clone(), hash.clone());
            return Ok(ItemOutcome::AlreadyPresent);
        }

        let object = match store.check(&hash.object_key()).await {
            Ok(Some(object)) => object,
            Ok(None) => {
                warn!(path = %item.path, object = %hash, "object not found in remote store");
                report.fail(&item.path, "not found in remote store");
                return Ok(ItemOutcome::Failed);
            }
            Err(e) => {
                warn!(path = %item.path, error = %e, "remote lookup failed");
                report.fail(&item.path, e.to_string());
                return Ok(ItemOutcome::Failed);
            }
        };

        // The temp file is removed on drop unless the cache admits it.
        let tmp = self.cache.temp_file()?;
        match store.get(&object, tmp.path(), item.entry.size).await {
            Ok(true) => {}
            Ok(false) => {
                report.fail(&item.path, "remote store could not deliver the object");
                return Ok(ItemOutcome::Failed);
            }
            Err(e) => {
                warn!(path = %item.path, error = %e, "download failed");
                report.fail(&item.path, e.to_string());
                return Ok(ItemOutcome::Failed);
            }
        }

        let cached = match self.cache.admit(hash, item.entry.size, tmp) {
            Ok(path) => path,
            Err(StoreError::HashMismatch { actual, .. }) => {
                warn!(
                    path = %item.path,
                    expected = %hash,
                    %actual,
                    "downloaded content does not match"
                );
                report.fail(&item.path, format!("downloaded content hashes to {actual}"));
                return Ok(ItemOutcome::Failed);
            }
            Err(e) => return Err(e.into()),
        };
        place_in_worktree(&cached, &dest).await?;

        debug!(path = %item.path, size = item.entry.size, "downloaded");
        report.transferred.push(item.path.clone());
        report.written.insert(item.path.clone(), hash.clone());
        report.bytes += item.entry.size;
        Ok(ItemOutcome::Transferred)
    }

    // ---------------------------------------------------------------
    // put
    // ---------------------------------------------------------------

    /// Split the pending-upload set by whether the cache still holds each
    /// object. The same path may appear more than once when several
    /// commits changed it.
    pub fn plan_put(&self, pending: &[PlannedItem]) -> PutPlan {
        let mut plan = PutPlan::default();
        for item in pending {
            if self.cache.contains(&item.entry.hash) {
                plan.uploads.push(item.clone());
            } else {
                plan.missing.push(item.clone());
            }
        }
        plan
    }

    /// Upload every object in `pending` the remote does not have yet.
    /// Objects that end up remote move to the cache's evictable partition.
    /// A pending object missing from the cache fails only when the remote
    /// lacks it too.
    pub async fn put(
        &mut self,
        manifest: &Manifest,
        pending: &[PlannedItem],
        progress: &mut dyn TransferProgress,
    ) -> SyncResult<TransferReport> {
        let mut report = TransferReport::default();
        if pending.is_empty() {
            return Ok(report);
        }
        let store = self.remote()?;
        let plan = self.plan_put(pending);

        // An object gone from the cache is settled when the remote has it.
        let mut synced: BTreeSet<ContentHash> = BTreeSet::new();
        for item in &plan.missing {
            match store.check(&item.entry.hash.object_key()).await {
                Ok(Some(_)) => {
                    debug!(path = %item.path, "uncached pending object already remote");
                    report.already_present.push(item.path.clone());
                    synced.insert(item.entry.hash.clone());
                }
                Ok(None) => {
                    warn!(
                        path = %item.path,
                        object = %item.entry.hash,
                        "pending object missing from cache"
                    );
                    report.fail(&item.path, "object is missing from the local cache");
                }
                Err(e) => {
                    warn!(path = %item.path, error = %e, "remote lookup failed");
                    report.fail(&item.path, e.to_string());
                }
            }
        }

        progress.start(plan.upload_bytes());
        for item in &plan.uploads {
            progress.new_item(&item.path, item.entry.size);
            let outcome = if synced.contains(&item.entry.hash) {
                report.already_present.push(item.path.clone());
                ItemOutcome::AlreadyPresent
            } else {
                self.upload(store, item, &mut report).await
            };
            if outcome != ItemOutcome::Failed {
                synced.insert(item.entry.hash.clone());
            }
            progress.advance(item.entry.size);
            progress.item_finished(outcome);
        }
        progress.done();
        close(store).await;

        self.cache.mark_synced(&synced)?;
        report.synced = synced.into_iter().collect();
        info!(
            uploaded = report.transferred.len(),
            already_present = report.already_present.len(),
            failed = report.failed.len(),
            "put finished"
        );
        report.pruned = self.prune(manifest)?;
        Ok(report)
    }

    async fn upload(
        &self,
        store: &dyn RemoteStore,
        item: &PlannedItem,
        report: &mut TransferReport,
    ) -> ItemOutcome {
        let key = item.entry.hash.object_key();
        match store.check(&key).await {
            Ok(Some(_)) => {
                report.already_present.push(item.path.clone());
                return ItemOutcome::AlreadyPresent;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(path = %item.path, error = %e, "remote lookup failed");
                report.fail(&item.path, e.to_string());
                return ItemOutcome::Failed;
            }
        }

        let source = self.cache.object_path(&item.entry.hash);
        match store.put(&source, &key, item.entry.size).await {
            Ok(true) => {
                debug!(path = %item.path, size = item.entry.size, "uploaded");
                report.transferred.push(item.path.clone());
                report.bytes += item.entry.size;
                ItemOutcome::Transferred
            }
            Ok(false) => {
                report.fail(&item.path, "remote store refused the object");
                ItemOutcome::Failed
            }
            Err(e) => {
                warn!(path = %item.path, error = %e, "upload failed");
                report.fail(&item.path, e.to_string());
                ItemOutcome::Failed
            }
        }
    }

    fn prune(&mut self, manifest: &Manifest) -> SyncResult<fit_store::PruneReport> {
        let target = (self.prune_factor * manifest.total_size() as f64) as u64;
        Ok(self.cache.prune(target)?)
    }
}

async fn place_in_worktree(object: &Path, dest: &Path) -> SyncResult<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::copy(object, dest).await?;
    Ok(())
}

async fn close(store: &dyn RemoteStore) {
    if let Err(e) = store.close().await {
        warn!(error = %e, "closing remote store failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalDirStore;
    use crate::progress::QuietProgress;
    use crate::remote::ObjectRef;
    use async_trait::async_trait;
    use fit_store::{NewObject, Partition};
    use fit_types::ManifestEntry;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Serves fixed bytes per key, regardless of what was asked for.
    struct FixedStore {
        objects: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl RemoteStore for FixedStore {
        async fn check(&self, key: &str) -> SyncResult<Option<ObjectRef>> {
            Ok(self.objects.lock().unwrap().contains_key(key).then(|| ObjectRef::new(key)))
        }

        async fn get(&self, object: &ObjectRef, dest: &Path, _size: u64) -> SyncResult<bool> {
            let data = self.objects.lock().unwrap().get(&object.key).cloned();
            match data {
                Some(data) => {
                    std::fs::write(dest, data)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn put(&self, _src: &Path, _key: &str, _size: u64) -> SyncResult<bool> {
            Err(SyncError::Remote("read-only store".into()))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        remote: PathBuf,
        cache: ContentCache,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("work");
            let remote = dir.path().join("remote");
            std::fs::create_dir_all(&root).unwrap();
            let cache = ContentCache::open(&dir.path().join("fit")).unwrap();
            Self {
                root,
                remote,
                cache,
                _dir: dir,
            }
        }

        fn stub(&self, path: &str) {
            let file = self.root.join(path);
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, b"").unwrap();
        }

        /// Put `data` in the cache (pending when `provisional`) and return its entry.
        fn cached(&mut self, data: &[u8], provisional: bool) -> ManifestEntry {
            let hash = ContentHash::of_blob(data);
            let src = self.root.join(format!(".src-{}", hash.short()));
            std::fs::write(&src, data).unwrap();
            self.cache
                .insert(&[NewObject::new(hash.clone(), data.len() as u64, &src)], provisional)
                .unwrap();
            std::fs::remove_file(src).unwrap();
            ManifestEntry::new(hash, data.len() as u64)
        }

        fn remote_object(&self, data: &[u8]) -> ManifestEntry {
            let hash = ContentHash::of_blob(data);
            let file = self.remote.join(hash.object_key());
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, data).unwrap();
            ManifestEntry::new(hash, data.len() as u64)
        }
    }

    fn targets(manifest: &Manifest) -> BTreeSet<String> {
        manifest.paths().cloned().collect()
    }

    #[tokio::test]
    async fn get_fills_stubs_from_cache_without_remote() {
        let mut fx = Fixture::new();
        let entry = fx.cached(b"texture", false);
        let manifest: Manifest = [("art/a.png".to_string(), entry.clone())].into_iter().collect();
        fx.stub("art/a.png");

        let mut coordinator = TransferCoordinator::new(&mut fx.cache, None, 2.0);
        let report = coordinator
            .get(&fx.root, &manifest, &targets(&manifest), &mut QuietProgress)
            .await
            .unwrap();

        assert_eq!(report.from_cache, vec!["art/a.png".to_string()]);
        assert_eq!(report.written.get("art/a.png"), Some(&entry.hash));
        assert_eq!(std::fs::read(fx.root.join("art/a.png")).unwrap(), b"texture");
    }

    #[tokio::test]
    async fn get_without_remote_fails_before_transferring() {
        let mut fx = Fixture::new();
        let cached = fx.cached(b"local", false);
        let remote_only = ManifestEntry::new(ContentHash::of_blob(b"remote"), 6);
        let manifest: Manifest = [("a.bin".to_string(), cached), ("b.bin".to_string(), remote_only)]
            .into_iter()
            .collect();
        fx.stub("a.bin");
        fx.stub("b.bin");

        let mut coordinator = TransferCoordinator::new(&mut fx.cache, None, 2.0);
        let result = coordinator
            .get(&fx.root, &manifest, &targets(&manifest), &mut QuietProgress)
            .await;
        assert!(matches!(result, Err(SyncError::NoRemoteStore)));
        assert_eq!(std::fs::metadata(fx.root.join("a.bin")).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn get_downloads_admits_and_reports_missing() {
        let mut fx = Fixture::new();
        let present = fx.remote_object(b"mesh data");
        let absent = ManifestEntry::new(ContentHash::of_blob(b"gone"), 4);
        let manifest: Manifest = [
            ("models/m.obj".to_string(), present.clone()),
            ("models/copy.obj".to_string(), present.clone()),
            ("models/gone.obj".to_string(), absent),
        ]
        .into_iter()
        .collect();
        for path in manifest.paths() {
            fx.stub(path);
        }
        // Already materialized files are left alone.
        std::fs::write(fx.root.join("models/copy.obj"), b"mesh data").unwrap();

        let store = LocalDirStore::new(&fx.remote);
        let mut coordinator = TransferCoordinator::new(&mut fx.cache, Some(&store), 2.0);
        let plan = coordinator.plan_get(&fx.root, &manifest, &targets(&manifest)).unwrap();
        assert_eq!(plan.downloads.len(), 2);
        assert_eq!(plan.download_bytes(), 13);

        let report = coordinator
            .get(&fx.root, &manifest, &targets(&manifest), &mut QuietProgress)
            .await
            .unwrap();

        assert_eq!(report.transferred, vec!["models/m.obj".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "models/gone.obj");
        assert_eq!(report.bytes, 9);
        assert_eq!(std::fs::read(fx.root.join("models/m.obj")).unwrap(), b"mesh data");
        assert_eq!(std::fs::metadata(fx.root.join("models/gone.obj")).unwrap().len(), 0);
        assert_eq!(fx.cache.ledger().partition_of(&present.hash), Some(Partition::Lru));
    }

    #[tokio::test]
    async fn corrupt_download_is_rejected() {
        let mut fx = Fixture::new();
        let entry = ManifestEntry::new(ContentHash::of_blob(b"expected"), 8);
        let manifest: Manifest = [("a.bin".to_string(), entry.clone())].into_iter().collect();
        fx.stub("a.bin");

        let store = FixedStore {
            objects: Mutex::new(BTreeMap::from([(
                entry.hash.object_key(),
                b"tampered".to_vec(),
            )])),
        };
        let mut coordinator = TransferCoordinator::new(&mut fx.cache, Some(&store), 2.0);
        let report = coordinator
            .get(&fx.root, &manifest, &targets(&manifest), &mut QuietProgress)
            .await
            .unwrap();

        assert!(!report.is_success());
        assert!(!fx.cache.contains(&entry.hash));
        assert_eq!(std::fs::metadata(fx.root.join("a.bin")).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn put_uploads_skips_present_and_marks_synced() {
        let mut fx = Fixture::new();
        let fresh = fx.cached(b"fresh", true);
        let known = fx.cached(b"known", true);
        fx.remote_object(b"known");
        let lost = ManifestEntry::new(ContentHash::of_blob(b"lost"), 4);
        let pending = vec![
            PlannedItem::new("fresh.bin", fresh.clone()),
            PlannedItem::new("known.bin", known.clone()),
            PlannedItem::new("lost.bin", lost),
        ];
        let manifest: Manifest = pending
            .iter()
            .map(|i| (i.path.clone(), i.entry.clone()))
            .collect();

        let store = LocalDirStore::new(&fx.remote);
        let mut coordinator = TransferCoordinator::new(&mut fx.cache, Some(&store), 2.0);
        let plan = coordinator.plan_put(&pending);
        assert_eq!(plan.uploads.len(), 2);
        assert_eq!(plan.missing.len(), 1);

        let report = coordinator.put(&manifest, &pending, &mut QuietProgress).await.unwrap();
        assert_eq!(report.transferred, vec!["fresh.bin".to_string()]);
        assert_eq!(report.already_present, vec!["known.bin".to_string()]);
        assert_eq!(report.failed[0].0, "lost.bin");
        assert_eq!(report.synced.len(), 2);

        assert!(fx.remote.join(fresh.hash.object_key()).is_file());
        assert_eq!(fx.cache.ledger().partition_of(&fresh.hash), Some(Partition::Lru));
        assert_eq!(fx.cache.size().1, 0);
    }

    #[tokio::test]
    async fn uncached_object_already_remote_is_synced() {
        let mut fx = Fixture::new();
        let entry = fx.remote_object(b"pruned earlier");
        let pending = vec![PlannedItem::new("b.bin", entry.clone())];

        let store = LocalDirStore::new(&fx.remote);
        let mut coordinator = TransferCoordinator::new(&mut fx.cache, Some(&store), 2.0);
        assert_eq!(coordinator.plan_put(&pending).missing.len(), 1);

        let report = coordinator.put(&Manifest::new(), &pending, &mut QuietProgress).await.unwrap();
        assert!(report.is_success(), "{:?}", report.failed);
        assert_eq!(report.already_present, vec!["b.bin".to_string()]);
        assert_eq!(report.synced, vec![entry.hash]);
        assert!(report.transferred.is_empty());
    }

    #[tokio::test]
    async fn failed_upload_stays_pending() {
        let mut fx = Fixture::new();
        let entry = fx.cached(b"payload", true);
        let pending = vec![PlannedItem::new("p.bin", entry.clone())];

        let store = FixedStore {
            objects: Mutex::new(BTreeMap::new()),
        };
        let mut coordinator = TransferCoordinator::new(&mut fx.cache, Some(&store), 0.0);
        let report = coordinator.put(&Manifest::new(), &pending, &mut QuietProgress).await.unwrap();

        assert_eq!(report.failed.len(), 1);
        assert!(report.synced.is_empty());
        // Pending objects survive even a prune to zero.
        assert_eq!(fx.cache.ledger().partition_of(&entry.hash), Some(Partition::Pending));
    }

    #[tokio::test]
    async fn put_nothing_needs_no_remote() {
        let mut fx = Fixture::new();
        let mut coordinator = TransferCoordinator::new(&mut fx.cache, None, 2.0);
        let report = coordinator
            .put(&Manifest::new(), &[], &mut QuietProgress)
            .await
            .unwrap();
        assert!(report.is_success());
    }
}
