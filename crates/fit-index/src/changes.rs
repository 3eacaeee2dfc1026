//! Classification of items against the manifest.

use std::collections::{BTreeMap, BTreeSet};

use fit_types::{Manifest, ManifestEntry};
use fit_vcs::VersionControlBackend;
use tracing::debug;

use crate::error::IndexResult;
use crate::stat_cache::StatCache;
use crate::status::{ChangeKind, StatusEntry};

/// Outcome of comparing the working tree against a manifest.
///
/// `modified`, `added`, `removed`, `untracked` and `unchanged` are pairwise
/// disjoint and together cover every manifest item and every current
/// candidate (within the filter, if one was given). `stubs` is a subset of
/// `unchanged`: zero-byte placeholders for content that is not present.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Changes {
    /// Items whose content changed, mapped to their new `(hash, size)`.
    pub modified: BTreeMap<String, ManifestEntry>,
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub untracked: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
    pub stubs: BTreeSet<String>,
}

impl Changes {
    /// Whether anything would be saved or restored.
    pub fn has_changes(&self) -> bool {
        !(self.modified.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.untracked.is_empty())
    }

    pub fn kind_of(&self, path: &str) -> Option<ChangeKind> {
        if self.modified.contains_key(path) {
            Some(ChangeKind::Modified)
        } else if self.added.contains(path) {
            Some(ChangeKind::Added)
        } else if self.removed.contains(path) {
            Some(ChangeKind::Removed)
        } else if self.untracked.contains(path) {
            Some(ChangeKind::Untracked)
        } else if self.unchanged.contains(path) {
            Some(ChangeKind::Unchanged)
        } else {
            None
        }
    }

    /// Every classified item, sorted by path.
    pub fn entries(&self) -> Vec<StatusEntry> {
        let tagged = [
            (&self.added, ChangeKind::Added),
            (&self.removed, ChangeKind::Removed),
            (&self.untracked, ChangeKind::Untracked),
            (&self.unchanged, ChangeKind::Unchanged),
        ];
        let mut out: Vec<StatusEntry> = self
            .modified
            .keys()
            .map(|p| StatusEntry::new(p.clone(), ChangeKind::Modified))
            .chain(tagged.iter().flat_map(|(set, kind)| {
                set.iter().map(move |p| StatusEntry::new(p.clone(), *kind))
            }))
            .collect();
        out.sort();
        out
    }

    /// Drop `paths` from every set.
    pub fn exclude(&mut self, paths: &BTreeSet<String>) {
        self.modified.retain(|p, _| !paths.contains(p));
        for set in [
            &mut self.added,
            &mut self.removed,
            &mut self.untracked,
            &mut self.unchanged,
            &mut self.stubs,
        ] {
            set.retain(|p| !paths.contains(p));
        }
    }
}

/// Detects how the working tree differs from a manifest.
pub struct ChangeDetector<'a> {
    vcs: &'a dyn VersionControlBackend,
    attribute: &'a str,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(vcs: &'a dyn VersionControlBackend, attribute: &'a str) -> Self {
        Self { vcs, attribute }
    }

    /// Paths that carry the fit attribute right now.
    pub fn candidates(&self) -> IndexResult<BTreeSet<String>> {
        Ok(self.vcs.list_candidate_paths(self.attribute)?)
    }

    /// List candidates and diff in one go.
    pub fn detect(
        &self,
        manifest: &Manifest,
        filter: Option<&BTreeSet<String>>,
        cache: &mut StatCache,
    ) -> IndexResult<Changes> {
        let tracked_now = self.candidates()?;
        self.diff(manifest, &tracked_now, filter, cache)
    }

    /// Classify every manifest item and every candidate in `tracked_now`.
    ///
    /// With a `filter`, both sides are first restricted to it. Only the
    /// items present on both sides are stat'ed, and only those whose stats
    /// moved are rehashed.
    pub fn diff(
        &self,
        manifest: &Manifest,
        tracked_now: &BTreeSet<String>,
        filter: Option<&BTreeSet<String>>,
        cache: &mut StatCache,
    ) -> IndexResult<Changes> {
        let within = |p: &String| filter.map_or(true, |f| f.contains(p));
        let expected: BTreeSet<String> = manifest.paths().filter(|p| within(p)).cloned().collect();
        let tracked: BTreeSet<String> = tracked_now.iter().filter(|p| within(p)).cloned().collect();

        let existing: BTreeSet<String> = expected.intersection(&tracked).cloned().collect();
        let added: BTreeSet<String> = tracked.difference(&expected).cloned().collect();
        let missing: BTreeSet<String> = expected.difference(&tracked).cloned().collect();

        let root = self.vcs.root();
        let (untracked, mut removed): (BTreeSet<String>, BTreeSet<String>) =
            missing.into_iter().partition(|p| root.join(p).exists());

        let refresh = cache.refresh(self.vcs, &existing)?;

        let mut changes = Changes {
            added,
            untracked,
            ..Changes::default()
        };

        for path in existing {
            let Some(recorded) = manifest.get(&path) else {
                continue;
            };
            if let Some(current) = refresh.entries.get(&path) {
                if current.hash != recorded.hash {
                    changes.modified.insert(
                        path,
                        ManifestEntry::new(current.hash.clone(), current.stats.size),
                    );
                } else {
                    changes.unchanged.insert(path);
                }
            } else if refresh.empty.contains(&path) {
                if recorded.size > 0 {
                    changes.stubs.insert(path.clone());
                }
                changes.unchanged.insert(path);
            } else {
                // Vanished between listing and stat.
                removed.insert(path);
            }
        }
        changes.removed = removed;

        debug!(
            modified = changes.modified.len(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            untracked = changes.untracked.len(),
            unchanged = changes.unchanged.len(),
            stubs = changes.stubs.len(),
            "classified working tree"
        );
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fit_types::ContentHash;
    use fit_vcs::MemoryBackend;
    use std::fs;

    struct Fixture {
        dir: tempfile::TempDir,
        vcs: MemoryBackend,
        cache: StatCache,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let vcs = MemoryBackend::new(dir.path());
            let cache = StatCache::new(dir.path().join(".git/fit/stat"));
            Self { dir, vcs, cache }
        }

        fn write(&self, path: &str, data: &[u8]) {
            let full = self.dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, data).unwrap();
        }

        fn track(&self, path: &str, data: &[u8]) {
            self.write(path, data);
            self.vcs.set_attribute("fit", path);
        }

        fn diff(&mut self, manifest: &Manifest, filter: Option<&BTreeSet<String>>) -> Changes {
            let detector = ChangeDetector::new(&self.vcs, "fit");
            detector.detect(manifest, filter, &mut self.cache).unwrap()
        }
    }

    fn entry(data: &[u8]) -> ManifestEntry {
        ManifestEntry::new(ContentHash::of_blob(data), data.len() as u64)
    }

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    /// Manifest with five items; working tree diverges in one way per item.
    fn scenario() -> (Fixture, Manifest) {
        let fx = Fixture::new();
        let mut m = Manifest::new();
        for name in ["same", "changed", "deleted", "dropped", "stub"] {
            m.insert(name, entry(name.as_bytes()));
        }

        fx.track("same", b"same");
        fx.track("changed", b"changed!");
        // "deleted": attribute set, no file.
        fx.vcs.set_attribute("fit", "deleted");
        // "dropped": file exists but attribute is gone.
        fx.write("dropped", b"dropped");
        fx.track("stub", b"");
        fx.track("assets/new.bin", b"new");
        (fx, m)
    }

    #[test]
    fn partitions_are_disjoint_and_complete() {
        let (mut fx, m) = scenario();
        let changes = fx.diff(&m, None);

        assert_eq!(changes.modified.keys().cloned().collect::<BTreeSet<_>>(), set(&["changed"]));
        assert_eq!(changes.modified["changed"], entry(b"changed!"));
        assert_eq!(changes.added, set(&["assets/new.bin"]));
        assert_eq!(changes.removed, set(&["deleted"]));
        assert_eq!(changes.untracked, set(&["dropped"]));
        assert_eq!(changes.unchanged, set(&["same", "stub"]));
        assert_eq!(changes.stubs, set(&["stub"]));

        let mut union = BTreeSet::new();
        let mut total = 0;
        for e in changes.entries() {
            union.insert(e.path);
            total += 1;
        }
        assert_eq!(total, union.len(), "sets overlap");
        let mut expected: BTreeSet<String> = m.paths().cloned().collect();
        expected.insert("assets/new.bin".into());
        assert_eq!(union, expected);
    }

    #[test]
    fn second_diff_is_idempotent_without_rehash_or_write() {
        let (mut fx, m) = scenario();
        let first = fx.diff(&m, None);
        fx.cache.save().unwrap();
        let hashed = fx.vcs.hashed_count();

        let second = fx.diff(&m, None);
        assert_eq!(first, second);
        assert_eq!(fx.vcs.hashed_count(), hashed);
        assert!(!fx.cache.is_dirty());
    }

    #[test]
    fn zero_byte_files_are_always_unchanged() {
        let mut fx = Fixture::new();
        let mut m = Manifest::new();
        m.insert("placeholder", entry(b"real content"));
        m.insert("truly-empty", ManifestEntry::new(ContentHash::empty_blob(), 0));
        fx.track("placeholder", b"");
        fx.track("truly-empty", b"");

        let changes = fx.diff(&m, None);
        assert!(changes.modified.is_empty());
        assert_eq!(changes.unchanged, set(&["placeholder", "truly-empty"]));
        assert_eq!(changes.stubs, set(&["placeholder"]));
        assert!(!changes.has_changes());
    }

    #[test]
    fn filter_restricts_both_sides() {
        let (mut fx, m) = scenario();
        let filter = set(&["changed", "assets/new.bin"]);
        let changes = fx.diff(&m, Some(&filter));

        assert_eq!(changes.modified.len(), 1);
        assert_eq!(changes.added, set(&["assets/new.bin"]));
        assert!(changes.removed.is_empty());
        assert!(changes.untracked.is_empty());
        assert!(changes.unchanged.is_empty());
    }

    #[test]
    fn exclude_removes_offenders_everywhere() {
        let (mut fx, m) = scenario();
        let mut changes = fx.diff(&m, None);
        changes.exclude(&set(&["changed", "stub"]));
        assert!(changes.modified.is_empty());
        assert!(changes.stubs.is_empty());
        assert_eq!(changes.kind_of("same"), Some(ChangeKind::Unchanged));
        assert_eq!(changes.kind_of("changed"), None);
    }
}
