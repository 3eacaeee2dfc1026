//! Three-way manifest merge.

use std::collections::BTreeSet;

use fit_diff::three_way_diff;
use fit_types::Manifest;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the two sides collided on one item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConflictKind {
    /// Both added the item with different content.
    AddAdd,
    /// Both modified the item differently.
    ModMod,
    /// Mine modified, theirs removed.
    ModRem,
    /// Mine removed, theirs modified.
    RemMod,
}

impl ConflictKind {
    /// Two-character form symbol: how mine changed, then how theirs changed.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::AddAdd => "++",
            Self::ModMod => "**",
            Self::ModRem => "*-",
            Self::RemMod => "-*",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "++" => Some(Self::AddAdd),
            "**" => Some(Self::ModMod),
            "*-" => Some(Self::ModRem),
            "-*" => Some(Self::RemMod),
            _ => None,
        }
    }

    /// Whether taking "theirs" means deleting the item.
    pub fn theirs_removes(self) -> bool {
        self == Self::ModRem
    }
}

/// One conflicted item.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Conflict {
    pub path: String,
    pub kind: ConflictKind,
}

/// Conflicts found by [`merge_manifests`], one set per kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSet {
    pub add: BTreeSet<String>,
    pub mod_mod: BTreeSet<String>,
    pub mod_rem: BTreeSet<String>,
    pub rem_mod: BTreeSet<String>,
}

impl ConflictSet {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.mod_mod.len() + self.mod_rem.len() + self.rem_mod.len()
    }

    pub fn insert(&mut self, path: impl Into<String>, kind: ConflictKind) {
        let set = match kind {
            ConflictKind::AddAdd => &mut self.add,
            ConflictKind::ModMod => &mut self.mod_mod,
            ConflictKind::ModRem => &mut self.mod_rem,
            ConflictKind::RemMod => &mut self.rem_mod,
        };
        set.insert(path.into());
    }

    pub fn kind_of(&self, path: &str) -> Option<ConflictKind> {
        if self.add.contains(path) {
            Some(ConflictKind::AddAdd)
        } else if self.mod_mod.contains(path) {
            Some(ConflictKind::ModMod)
        } else if self.mod_rem.contains(path) {
            Some(ConflictKind::ModRem)
        } else if self.rem_mod.contains(path) {
            Some(ConflictKind::RemMod)
        } else {
            None
        }
    }

    /// Every conflicted path.
    pub fn paths(&self) -> BTreeSet<String> {
        self.add
            .iter()
            .chain(&self.mod_mod)
            .chain(&self.mod_rem)
            .chain(&self.rem_mod)
            .cloned()
            .collect()
    }

    /// All conflicts, sorted by path.
    pub fn conflicts(&self) -> Vec<Conflict> {
        let tagged = [
            (&self.add, ConflictKind::AddAdd),
            (&self.mod_mod, ConflictKind::ModMod),
            (&self.mod_rem, ConflictKind::ModRem),
            (&self.rem_mod, ConflictKind::RemMod),
        ];
        let mut out: Vec<Conflict> = tagged
            .iter()
            .flat_map(|(set, kind)| {
                set.iter().map(move |path| Conflict {
                    path: path.clone(),
                    kind: *kind,
                })
            })
            .collect();
        out.sort();
        out
    }
}

/// Result of a three-way merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Mine with every non-conflicting incoming change applied. Conflicted
    /// items keep mine's state.
    pub merged: Manifest,
    /// Incoming modifications that changed mine.
    pub modified: BTreeSet<String>,
    /// Incoming additions that changed mine.
    pub added: BTreeSet<String>,
    /// Incoming removals that were applied.
    pub removed: BTreeSet<String>,
    pub conflicts: Option<ConflictSet>,
}

/// Merge `other` into `mine`, relative to their common ancestor.
pub fn merge_manifests(common: &Manifest, mine: &Manifest, other: &Manifest) -> MergeOutcome {
    let ours = three_way_diff(common, mine);
    let theirs = three_way_diff(common, other);

    let differs = |path: &String| mine.get(path) != other.get(path);
    let conflicts = ConflictSet {
        add: ours.added.intersection(&theirs.added).filter(|p| differs(p)).cloned().collect(),
        mod_mod: ours
            .modified
            .intersection(&theirs.modified)
            .filter(|p| differs(p))
            .cloned()
            .collect(),
        mod_rem: ours.modified.intersection(&theirs.removed).cloned().collect(),
        rem_mod: ours.removed.intersection(&theirs.modified).cloned().collect(),
    };
    let conflicted = conflicts.paths();

    // Incoming changes mine already made identically are not reported.
    let modified: BTreeSet<String> = theirs
        .modified
        .difference(&conflicted)
        .filter(|p| differs(p))
        .cloned()
        .collect();
    let added: BTreeSet<String> = theirs
        .added
        .difference(&conflicted)
        .filter(|p| differs(p))
        .cloned()
        .collect();
    let removed: BTreeSet<String> = theirs
        .removed
        .difference(&ours.removed)
        .filter(|p| !conflicted.contains(*p))
        .cloned()
        .collect();

    let mut merged = mine.clone();
    for path in modified.iter().chain(&added) {
        if let Some(entry) = other.get(path) {
            merged.insert(path.clone(), entry.clone());
        }
    }
    for path in &removed {
        merged.remove(path);
    }

    debug!(
        modified = modified.len(),
        added = added.len(),
        removed = removed.len(),
        conflicts = conflicts.len(),
        "merged manifests"
    );

    MergeOutcome {
        merged,
        modified,
        added,
        removed,
        conflicts: (!conflicts.is_empty()).then_some(conflicts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fit_types::{ContentHash, ManifestEntry};

    pub(crate) fn manifest(items: &[(&str, u8)]) -> Manifest {
        items
            .iter()
            .map(|(p, v)| {
                let entry = ManifestEntry::new(ContentHash::of_blob(&[*v]), *v as u64);
                (p.to_string(), entry)
            })
            .collect()
    }

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    /// Path, then its content byte in common, mine and other.
    const REFERENCE: &[(&str, Option<u8>, Option<u8>, Option<u8>)] = &[
        ("a", Some(1), Some(1), Some(1)),
        ("b", Some(2), Some(1), Some(1)),
        ("c", Some(3), None, None),
        ("d", Some(4), Some(3), Some(4)),
        ("e", Some(5), Some(5), Some(4)),
        ("f", Some(6), None, Some(6)),
        ("g", Some(7), Some(7), None),
        ("h", Some(8), Some(7), Some(9)),
        ("i", Some(9), Some(8), None),
        ("j", Some(10), None, Some(9)),
        ("k", None, Some(11), Some(11)),
        ("l", None, Some(12), None),
        ("m", None, None, Some(13)),
        ("n", None, Some(13), Some(15)),
    ];

    fn reference() -> (Manifest, Manifest, Manifest) {
        let side = |pick: fn(&(&str, Option<u8>, Option<u8>, Option<u8>)) -> Option<u8>| {
            let items: Vec<(&str, u8)> = REFERENCE
                .iter()
                .filter_map(|row| pick(row).map(|v| (row.0, v)))
                .collect();
            manifest(&items)
        };
        (side(|r| r.1), side(|r| r.2), side(|r| r.3))
    }

    #[test]
    fn reference_scenario_classification() {
        let (common, mine, other) = reference();
        let outcome = merge_manifests(&common, &mine, &other);

        assert_eq!(outcome.modified, set(&["e"]));
        assert_eq!(outcome.added, set(&["m"]));
        assert_eq!(outcome.removed, set(&["g"]));

        let conflicts = outcome.conflicts.expect("conflicts");
        assert_eq!(conflicts.add, set(&["n"]));
        assert_eq!(conflicts.mod_mod, set(&["h"]));
        assert_eq!(conflicts.mod_rem, set(&["i"]));
        assert_eq!(conflicts.rem_mod, set(&["j"]));
    }

    #[test]
    fn reference_scenario_merged_manifest() {
        let (common, mine, other) = reference();
        let merged = merge_manifests(&common, &mine, &other).merged;

        assert_eq!(merged.get("e"), other.get("e"));
        assert_eq!(merged.get("m"), other.get("m"));
        assert!(!merged.contains("g"));
        // Conflicted items keep mine's state.
        assert_eq!(merged.get("h"), mine.get("h"));
        assert_eq!(merged.get("n"), mine.get("n"));
        assert_eq!(merged.get("i"), mine.get("i"));
        assert!(!merged.contains("j"));
        // Identical changes on both sides are not conflicts.
        assert_eq!(merged.get("b"), mine.get("b"));
        assert_eq!(merged.get("k"), mine.get("k"));
        // Mine-only changes survive.
        assert_eq!(merged.get("d"), mine.get("d"));
        assert_eq!(merged.get("l"), mine.get("l"));
        // Removed by both stays removed.
        assert!(!merged.contains("c"));
    }

    #[test]
    fn fast_forward_has_no_conflicts() {
        let common = manifest(&[("a", 1)]);
        let other = manifest(&[("a", 2), ("b", 3)]);
        let outcome = merge_manifests(&common, &common, &other);
        assert!(outcome.conflicts.is_none());
        assert_eq!(outcome.merged, other);
    }

    #[test]
    fn conflicts_listed_in_path_order_with_symbols() {
        let (common, mine, other) = reference();
        let conflicts = merge_manifests(&common, &mine, &other).conflicts.unwrap();
        let rows: Vec<(String, &str)> = conflicts
            .conflicts()
            .into_iter()
            .map(|c| (c.path, c.kind.symbol()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("h".to_string(), "**"),
                ("i".to_string(), "*-"),
                ("j".to_string(), "-*"),
                ("n".to_string(), "++"),
            ]
        );
        assert_eq!(conflicts.kind_of("i"), Some(ConflictKind::ModRem));
        assert!(ConflictKind::ModRem.theirs_removes());
    }
}
