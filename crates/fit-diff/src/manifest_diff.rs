//! Item-level diff of a manifest against its ancestor.

use std::collections::BTreeSet;

use fit_types::{Manifest, ManifestEntry};
use serde::{Deserialize, Serialize};

/// Paths that changed between an ancestor and one side.
///
/// The three sets are disjoint. An item counts as modified when its
/// `(hash, size)` differs, so a size-only difference is a change too.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDiff {
    pub modified: BTreeSet<String>,
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl ManifestDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    /// Number of changed paths.
    pub fn len(&self) -> usize {
        self.modified.len() + self.added.len() + self.removed.len()
    }

    /// Every changed path.
    pub fn touched(&self) -> BTreeSet<String> {
        self.modified
            .iter()
            .chain(&self.added)
            .chain(&self.removed)
            .cloned()
            .collect()
    }

    /// The changes with their entries, in path order.
    pub fn changes(&self, base: &Manifest, side: &Manifest) -> Vec<ManifestChange> {
        let mut out = Vec::with_capacity(self.len());
        for path in &self.modified {
            if let (Some(old), Some(new)) = (base.get(path), side.get(path)) {
                out.push(ManifestChange::Modified {
                    path: path.clone(),
                    old: old.clone(),
                    new: new.clone(),
                });
            }
        }
        for path in &self.added {
            if let Some(new) = side.get(path) {
                out.push(ManifestChange::Added {
                    path: path.clone(),
                    new: new.clone(),
                });
            }
        }
        for path in &self.removed {
            if let Some(old) = base.get(path) {
                out.push(ManifestChange::Removed {
                    path: path.clone(),
                    old: old.clone(),
                });
            }
        }
        out.sort_by(|a, b| a.path().cmp(b.path()));
        out
    }
}

/// A single item change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestChange {
    Added {
        path: String,
        new: ManifestEntry,
    },
    Removed {
        path: String,
        old: ManifestEntry,
    },
    Modified {
        path: String,
        old: ManifestEntry,
        new: ManifestEntry,
    },
}

impl ManifestChange {
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. } | Self::Removed { path, .. } | Self::Modified { path, .. } => {
                path
            }
        }
    }
}

/// Diff `side` against its ancestor `base`.
pub fn three_way_diff(base: &Manifest, side: &Manifest) -> ManifestDiff {
    let mut diff = ManifestDiff::new();
    for (path, entry) in side {
        match base.get(path) {
            Some(old) if old != entry => {
                diff.modified.insert(path.clone());
            }
            Some(_) => {}
            None => {
                diff.added.insert(path.clone());
            }
        }
    }
    for path in base.paths() {
        if !side.contains(path) {
            diff.removed.insert(path.clone());
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use fit_types::ContentHash;

    fn manifest(items: &[(&str, u8)]) -> Manifest {
        items
            .iter()
            .map(|(p, v)| {
                (
                    p.to_string(),
                    ManifestEntry::new(ContentHash::of_blob(&[*v]), 1),
                )
            })
            .collect()
    }

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn identical_manifests_have_no_diff() {
        let m = manifest(&[("a", 1), ("b/c", 2)]);
        let diff = three_way_diff(&m, &m);
        assert!(diff.is_empty());
        assert_eq!(diff.len(), 0);
    }

    #[test]
    fn classifies_each_kind() {
        let base = manifest(&[("keep", 1), ("edit", 2), ("drop", 3)]);
        let side = manifest(&[("keep", 1), ("edit", 9), ("new", 4)]);
        let diff = three_way_diff(&base, &side);

        assert_eq!(diff.modified, set(&["edit"]));
        assert_eq!(diff.added, set(&["new"]));
        assert_eq!(diff.removed, set(&["drop"]));
        assert_eq!(diff.touched(), set(&["drop", "edit", "new"]));
    }

    #[test]
    fn size_only_change_is_modification() {
        let base = manifest(&[("a", 1)]);
        let mut side = base.clone();
        let hash = side.get("a").unwrap().hash.clone();
        side.insert("a", ManifestEntry::new(hash, 2));
        assert_eq!(three_way_diff(&base, &side).modified, set(&["a"]));
    }

    #[test]
    fn changes_carry_entries_in_path_order() {
        let base = manifest(&[("b", 1), ("c", 2)]);
        let side = manifest(&[("a", 5), ("b", 6)]);
        let diff = three_way_diff(&base, &side);
        let changes = diff.changes(&base, &side);

        let paths: Vec<&str> = changes.iter().map(|c| c.path()).collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
        assert!(matches!(&changes[0], ManifestChange::Added { .. }));
        assert!(matches!(&changes[1], ManifestChange::Modified { old, new, .. } if old != new));
        assert!(matches!(&changes[2], ManifestChange::Removed { .. }));
    }
}
