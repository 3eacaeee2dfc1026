use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fit_index::{ChangeDetector, Changes, StatCache};
use fit_merge::MergeSession;
use fit_store::{ContentCache, NewObject};
use fit_sync::{RemoteStore, StoreRegistry, TransferCoordinator};
use fit_types::{read_optional, ContentHash, Manifest, ManifestEntry};
use fit_vcs::{GitBackend, VersionControlBackend};
use tracing::{debug, info};

use crate::config::FitConfig;
use crate::error::{SdkError, SdkResult};
use crate::paths::{select_paths, PathSelection};
use crate::report::{RestoreAction, RestorePlan, RestoreReport, SaveReport, StatusReport};

pub const FIT_DIR: &str = "fit";
pub const SAVES_DIR: &str = "saves";
pub const COMMITS_DIR: &str = "commits";
const STAT_FILE: &str = "stat";
const ADDED_STAT_FILE: &str = "stat.added";

/// A git repository using fit.
///
/// Holds everything an operation needs: the backend, the private state
/// directory (`<git-dir>/fit`), the configuration and the remote store.
pub struct FitRepo {
    pub(crate) vcs: Box<dyn VersionControlBackend>,
    pub(crate) fit_dir: PathBuf,
    pub(crate) config: FitConfig,
    pub(crate) registry: StoreRegistry,
    pub(crate) remote: Option<Box<dyn RemoteStore>>,
}

impl FitRepo {
    /// Open the git repository containing `start`.
    pub fn discover(start: &Path) -> SdkResult<Self> {
        Self::open(Box::new(GitBackend::discover(start)?))
    }

    /// Open over an existing backend, reading `config.toml` from the fit
    /// directory.
    pub fn open(vcs: Box<dyn VersionControlBackend>) -> SdkResult<Self> {
        let fit_dir = vcs.git_dir().join(FIT_DIR);
        let config = FitConfig::load(&fit_dir)?;
        Ok(Self::with_config(vcs, config))
    }

    pub fn with_config(vcs: Box<dyn VersionControlBackend>, config: FitConfig) -> Self {
        let fit_dir = vcs.git_dir().join(FIT_DIR);
        Self {
            vcs,
            fit_dir,
            config,
            registry: StoreRegistry::new(),
            remote: None,
        }
    }

    /// Use `remote` instead of the store named in the configuration.
    pub fn with_remote(mut self, remote: Box<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_registry(mut self, registry: StoreRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn root(&self) -> &Path {
        self.vcs.root()
    }

    pub fn fit_dir(&self) -> &Path {
        &self.fit_dir
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn vcs(&self) -> &dyn VersionControlBackend {
        self.vcs.as_ref()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.config.manifest_path(self.root())
    }

    pub(crate) fn detector(&self) -> ChangeDetector<'_> {
        ChangeDetector::new(self.vcs.as_ref(), &self.config.attribute)
    }

    pub(crate) fn stat_cache(&self) -> StatCache {
        StatCache::open(self.fit_dir.join(STAT_FILE))
    }

    pub(crate) fn content_cache(&self) -> SdkResult<ContentCache> {
        Ok(ContentCache::open(&self.fit_dir)?)
    }

    pub(crate) fn session(&self) -> SdkResult<MergeSession> {
        Ok(MergeSession::open(&self.fit_dir, &self.manifest_path())?)
    }

    pub(crate) fn coordinator<'a>(
        &self,
        cache: &'a mut ContentCache,
        store: Option<&'a dyn RemoteStore>,
    ) -> TransferCoordinator<'a> {
        TransferCoordinator::new(cache, store, self.config.cache.prune_factor)
    }

    pub fn is_merge_in_progress(&self) -> SdkResult<bool> {
        Ok(self.session()?.is_in_progress())
    }

    /// The items fit tracks right now. While a merge is unresolved this is
    /// the merged manifest, since `.fit` holds the resolution form.
    pub fn manifest(&self) -> SdkResult<Manifest> {
        let session = self.session()?;
        if session.is_in_progress() {
            return Ok(session.manifests()?.0);
        }
        Ok(Manifest::load(&self.manifest_path())?)
    }

    /// Resolve path arguments given relative to `cwd`.
    pub fn select(&self, args: &[String], cwd: &Path) -> SdkResult<PathSelection> {
        let mut available: BTreeSet<String> = self.manifest()?.paths().cloned().collect();
        available.extend(self.detector().candidates()?);
        Ok(select_paths(args, &available, self.root(), cwd))
    }

    // ---------------------------------------------------------------
    // status
    // ---------------------------------------------------------------

    pub fn status(&self, filter: Option<&BTreeSet<String>>) -> SdkResult<StatusReport> {
        let manifest = self.manifest()?;
        let mut stat = self.stat_cache();
        let mut changes = self.detector().detect(&manifest, filter, &mut stat)?;
        stat.save()?;

        let offenders = self.vcs.staged_additions(&self.config.attribute)?;
        let offending: BTreeSet<String> =
            offenders.tracked.union(&offenders.binary).cloned().collect();
        changes.exclude(&offending);

        let mut session = self.session()?;
        let merge = if session.is_in_progress() {
            let form = fs::read_to_string(self.manifest_path())?;
            Some(session.resolve(&form)?)
        } else {
            None
        };

        let targets = filter
            .cloned()
            .unwrap_or_else(|| manifest.paths().cloned().collect());
        let mut cache = self.content_cache()?;
        let plan = self.coordinator(&mut cache, None).plan_get(self.root(), &manifest, &targets)?;

        Ok(StatusReport {
            changes,
            offenders,
            merge,
            manifest_dirty: self.manifest_dirty()?,
            cached_stubs: plan.from_cache.len(),
            downloads: plan.downloads.len(),
            pending_uploads: self.commit_records()?.iter().map(|(_, m)| m.len()).sum(),
        })
    }

    /// Whether the manifest file differs from its staged version.
    pub fn manifest_dirty(&self) -> SdkResult<bool> {
        let on_disk = read_optional(&self.manifest_path())?;
        let staged = self.vcs.staged_blob_hash(&self.config.manifest_file)?;
        Ok(match (on_disk, staged) {
            (None, None) => false,
            (Some(data), Some(hash)) => ContentHash::of_blob(&data) != hash,
            _ => true,
        })
    }

    // ---------------------------------------------------------------
    // save
    // ---------------------------------------------------------------

    /// Record working-tree changes in the manifest and stage it.
    ///
    /// New and modified content is copied into the cache before the
    /// manifest is written, so a recorded item always has its object.
    /// During a merge this applies the resolution form instead.
    pub fn save(&self, filter: Option<&BTreeSet<String>>) -> SdkResult<SaveReport> {
        if self.is_merge_in_progress()? {
            if filter.is_some() {
                return Err(SdkError::InvalidOperation(
                    "a merge is in progress: run save without paths to apply the resolution form"
                        .into(),
                ));
            }
            return self.save_resolution();
        }

        let manifest_path = self.manifest_path();
        let mut manifest = Manifest::load(&manifest_path)?;
        let mut stat = self.stat_cache();
        let changes = self.detector().detect(&manifest, filter, &mut stat)?;

        let mut saved = changes.modified.clone();
        saved.extend(self.hash_added(&changes, &mut stat)?);
        let removed: BTreeSet<String> =
            changes.removed.union(&changes.untracked).cloned().collect();

        self.cache_saved(&saved)?;
        for (path, entry) in &saved {
            manifest.insert(path.clone(), entry.clone());
        }
        for path in &removed {
            manifest.remove(path);
            stat.forget(path);
        }
        if !saved.is_empty() || !removed.is_empty() {
            manifest.save(&manifest_path)?;
            info!(saved = saved.len(), removed = removed.len(), "working-tree changes saved");
        }
        stat.save()?;

        let staged = self.stage_manifest(&manifest, &saved)?;
        Ok(SaveReport {
            saved,
            removed,
            staged,
            resolved_merge: false,
        })
    }

    /// Entries for newly added items. Zero-byte additions are refused.
    fn hash_added(
        &self,
        changes: &Changes,
        stat: &mut StatCache,
    ) -> SdkResult<BTreeMap<String, ManifestEntry>> {
        if changes.added.is_empty() {
            return Ok(BTreeMap::new());
        }
        let mut added_stat = StatCache::open(self.fit_dir.join(ADDED_STAT_FILE));
        let refresh = added_stat.refresh(self.vcs.as_ref(), &changes.added)?;
        added_stat.save()?;
        if !refresh.empty.is_empty() {
            return Err(SdkError::EmptyItems(refresh.empty.into_iter().collect()));
        }

        let known: BTreeMap<String, ContentHash> = refresh
            .entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.hash.clone()))
            .collect();
        stat.record(self.root(), &known)?;

        Ok(refresh
            .entries
            .into_iter()
            .map(|(path, entry)| (path, ManifestEntry::new(entry.hash, entry.stats.size)))
            .collect())
    }

    /// Copy new content into the cache as pending objects.
    pub(crate) fn cache_saved(&self, saved: &BTreeMap<String, ManifestEntry>) -> SdkResult<()> {
        if saved.is_empty() {
            return Ok(());
        }
        let objects: Vec<NewObject> = saved
            .iter()
            .map(|(path, entry)| {
                NewObject::new(entry.hash.clone(), entry.size, self.root().join(path))
            })
            .collect();
        self.content_cache()?.insert(&objects, true)?;
        Ok(())
    }

    /// Stage the manifest file if it differs from the staged version, and
    /// remember which objects the newly staged manifest introduced.
    pub(crate) fn stage_manifest(
        &self,
        manifest: &Manifest,
        saved: &BTreeMap<String, ManifestEntry>,
    ) -> SdkResult<bool> {
        let name = &self.config.manifest_file;
        let Some(data) = read_optional(&self.manifest_path())? else {
            return Ok(false);
        };
        let before = self.vcs.staged_blob_hash(name)?;
        if before.as_ref() == Some(&ContentHash::of_blob(&data)) {
            return Ok(false);
        }

        self.vcs.stage_path_for_commit(name)?;
        let after = self.vcs.staged_blob_hash(name)?;
        if before != after {
            if let Some(hash) = after {
                self.record_save(saved, manifest, &hash)?;
            }
        }
        debug!(file = %name, "staged manifest");
        Ok(true)
    }

    /// Replace every earlier save record with one keyed by the staged
    /// manifest's blob hash.
    ///
    /// Entries of earlier saves that are still current carry over. Objects
    /// of entries that were overwritten before being committed are dropped
    /// from the cache, unless the manifest still references them.
    fn record_save(
        &self,
        saved: &BTreeMap<String, ManifestEntry>,
        manifest: &Manifest,
        staged: &ContentHash,
    ) -> SdkResult<()> {
        let saves_dir = self.fit_dir.join(SAVES_DIR);
        fs::create_dir_all(&saves_dir)?;

        let mut record: Manifest = saved.iter().map(|(p, e)| (p.clone(), e.clone())).collect();
        let mut superseded: BTreeSet<ContentHash> = BTreeSet::new();
        for file in sorted_files(&saves_dir)? {
            let earlier = Manifest::load(&file)?;
            for (path, entry) in &earlier {
                if manifest.get(path) == Some(entry) {
                    if !record.contains(path) {
                        record.insert(path.clone(), entry.clone());
                    }
                } else {
                    superseded.insert(entry.hash.clone());
                }
            }
            fs::remove_file(&file)?;
        }

        if !record.is_empty() {
            record.save(&saves_dir.join(staged.as_str()))?;
        }

        let live: BTreeSet<&ContentHash> = manifest.iter().map(|(_, e)| &e.hash).collect();
        superseded.retain(|h| !live.contains(h));
        if !superseded.is_empty() {
            self.content_cache()?.discard_pending(&superseded)?;
        }
        Ok(())
    }

    /// Manifest fragments of landed commits whose objects may still need
    /// uploading, oldest file name first.
    pub(crate) fn commit_records(&self) -> SdkResult<Vec<(PathBuf, Manifest)>> {
        let dir = self.fit_dir.join(COMMITS_DIR);
        sorted_files(&dir)?
            .into_iter()
            .map(|file| {
                let manifest = Manifest::load(&file)?;
                Ok((file, manifest))
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // restore
    // ---------------------------------------------------------------

    /// Throw away working-tree changes: added files are deleted, modified
    /// and deleted ones get their recorded content back. Content missing
    /// from the cache is written as a zero-byte stub.
    pub fn restore(&self, filter: Option<&BTreeSet<String>>) -> SdkResult<RestoreReport> {
        let plan = self.restore_plan(filter)?;
        self.apply_restore(&plan)
    }

    /// Work out what [`restore`](Self::restore) would change without
    /// touching the working tree.
    pub fn restore_plan(&self, filter: Option<&BTreeSet<String>>) -> SdkResult<RestorePlan> {
        let manifest = self.manifest()?;
        let mut stat = self.stat_cache();
        let changes = self.detector().detect(&manifest, filter, &mut stat)?;
        stat.save()?;
        Ok(RestorePlan {
            overwrite: changes.modified.into_keys().collect(),
            recreate: changes.removed,
            remove: changes.added,
            manifest,
        })
    }

    pub fn apply_restore(&self, plan: &RestorePlan) -> SdkResult<RestoreReport> {
        let mut stat = self.stat_cache();
        let write: BTreeSet<String> = plan.overwrite.union(&plan.recreate).cloned().collect();
        self.apply_to_worktree(&plan.manifest, &write, &plan.remove, &mut stat)
    }

    /// Make the working tree match `manifest` for the given paths.
    pub(crate) fn apply_to_worktree(
        &self,
        manifest: &Manifest,
        write: &BTreeSet<String>,
        delete: &BTreeSet<String>,
        stat: &mut StatCache,
    ) -> SdkResult<RestoreReport> {
        let root = self.root();
        let mut report = RestoreReport::default();

        for path in delete {
            match fs::remove_file(root.join(path)) {
                Ok(()) => report.actions.push((path.clone(), RestoreAction::Removed)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            stat.forget(path);
        }

        let mut cache = self.content_cache()?;
        let wanted = write.iter().filter_map(|p| manifest.get(p)).map(|e| &e.hash);
        let found = cache.find(wanted, true)?;
        let mut known = BTreeMap::new();
        for path in write {
            let Some(entry) = manifest.get(path) else {
                continue;
            };
            let dest = root.join(path);
            let existed = dest.exists();
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            let action = match found.get(&entry.hash) {
                Some(object) => {
                    fs::copy(object, &dest)?;
                    known.insert(path.clone(), entry.hash.clone());
                    if existed {
                        RestoreAction::Restored
                    } else {
                        RestoreAction::Recreated
                    }
                }
                None => {
                    fs::write(&dest, b"")?;
                    stat.forget(path);
                    RestoreAction::Stubbed
                }
            };
            report.actions.push((path.clone(), action));
        }

        stat.record(root, &known)?;
        stat.save()?;
        report.actions.sort_by(|a, b| a.0.cmp(&b.0));
        if report.missing() > 0 {
            info!(missing = report.missing(), "some items were restored as empty stubs");
        }
        Ok(report)
    }
}

impl std::fmt::Debug for FitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitRepo")
            .field("root", &self.root())
            .field("fit_dir", &self.fit_dir)
            .field("config", &self.config)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

/// Regular files directly inside `dir`, sorted. A missing directory has none.
fn sorted_files(dir: &Path) -> SdkResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
