//! Shared setup for the SDK tests: a temporary working tree over the
//! in-memory backend.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fit_sync::LocalDirStore;
use fit_types::{ContentHash, Manifest, ManifestEntry};
use fit_vcs::{MemoryBackend, VersionControlBackend};
use tempfile::TempDir;

use crate::config::FitConfig;
use crate::repository::FitRepo;

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub vcs: Arc<MemoryBackend>,
    pub repo: FitRepo,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("work");
        fs::create_dir_all(&root).unwrap();
        let vcs = Arc::new(MemoryBackend::new(&root));
        let repo = FitRepo::with_config(Box::new(vcs.clone()), FitConfig::default());
        Self { dir, vcs, repo }
    }

    /// A fixture whose remote is a directory next to the working tree.
    pub fn with_store() -> Self {
        let f = Self::new();
        let store = LocalDirStore::new(f.store_dir());
        let repo = FitRepo::with_config(Box::new(f.vcs.clone()), FitConfig::default())
            .with_remote(Box::new(store));
        Self { repo, ..f }
    }

    pub fn root(&self) -> &Path {
        self.vcs.root()
    }

    pub fn store_dir(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    pub fn write(&self, path: &str, data: &[u8]) {
        let file = self.root().join(path);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, data).unwrap();
    }

    /// Write a file and give it the fit attribute.
    pub fn track(&self, path: &str, data: &[u8]) {
        self.write(path, data);
        self.vcs.set_attribute("fit", path);
    }

    pub fn read(&self, path: &str) -> Vec<u8> {
        fs::read(self.root().join(path)).unwrap()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.root().join(path).exists()
    }

    pub fn manifest_on_disk(&self) -> Manifest {
        Manifest::load(&self.repo.manifest_path()).unwrap()
    }

    /// Save every pending change and commit it as `rev`.
    pub fn save_and_commit(&self, rev: &str) {
        self.repo.save(None).unwrap();
        self.vcs.commit(rev);
        self.repo.post_commit().unwrap();
    }
}

pub(crate) fn entry(data: &[u8]) -> ManifestEntry {
    ManifestEntry::new(ContentHash::of_blob(data), data.len() as u64)
}

pub(crate) fn set(paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|p| p.to_string()).collect()
}
