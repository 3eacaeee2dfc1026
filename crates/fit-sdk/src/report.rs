//! Results of the repository operations.

use std::collections::{BTreeMap, BTreeSet};

use fit_index::{ChangeKind, Changes};
use fit_merge::{ConflictSet, Resolution};
use fit_types::{Manifest, ManifestEntry};
use fit_vcs::StagedAdditions;

/// One line of `git-fit status`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusRow {
    pub path: String,
    pub kind: ChangeKind,
    /// `F` or `B` when the path blocks a commit.
    pub offender: Option<char>,
    /// `M`, `T`, `W` or `U` for conflicted items during a merge.
    pub merge: Option<char>,
}

impl StatusRow {
    /// The two-character status code, e.g. `*M`, `+ ` or `F `.
    pub fn code(&self) -> String {
        match self.offender {
            Some(c) => format!("{c} "),
            None => format!("{}{}", self.kind.symbol(), self.merge.unwrap_or(' ')),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StatusReport {
    /// Working-tree changes, without the staged offenders.
    pub changes: Changes,
    pub offenders: StagedAdditions,
    /// Choices made so far, when a merge is in progress.
    pub merge: Option<Resolution>,
    /// The manifest file differs from what is staged.
    pub manifest_dirty: bool,
    /// Zero-byte stubs whose content is in the local cache.
    pub cached_stubs: usize,
    /// Zero-byte stubs whose content has to be downloaded.
    pub downloads: usize,
    /// Committed items not yet uploaded.
    pub pending_uploads: usize,
}

impl StatusReport {
    pub fn has_changes(&self) -> bool {
        self.changes.has_changes() || !self.offenders.is_empty() || self.merge.is_some()
    }

    pub fn is_clean(&self) -> bool {
        !self.has_changes()
            && !self.manifest_dirty
            && self.cached_stubs == 0
            && self.downloads == 0
            && self.pending_uploads == 0
    }

    /// Rows sorted by path. Unchanged items are listed when `all` is set,
    /// or when they carry a merge choice.
    pub fn rows(&self, all: bool) -> Vec<StatusRow> {
        let merge_letter = |path: &str| self.merge.as_ref().and_then(|r| r.letter_for(path));
        let mut rows: Vec<StatusRow> = self
            .changes
            .entries()
            .into_iter()
            .filter_map(|entry| {
                let merge = merge_letter(&entry.path);
                if entry.kind == ChangeKind::Unchanged && !all && merge.is_none() {
                    return None;
                }
                Some(StatusRow {
                    merge,
                    path: entry.path,
                    kind: entry.kind,
                    offender: None,
                })
            })
            .collect();

        let offenders = self
            .offenders
            .tracked
            .iter()
            .map(|p| (p, 'F'))
            .chain(self.offenders.binary.iter().map(|p| (p, 'B')));
        for (path, code) in offenders {
            rows.push(StatusRow {
                path: path.clone(),
                kind: ChangeKind::Added,
                offender: Some(code),
                merge: None,
            });
        }
        rows.sort_by(|a, b| a.path.cmp(&b.path));
        rows
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Added and modified items with their new entries.
    pub saved: BTreeMap<String, ManifestEntry>,
    /// Items no longer tracked.
    pub removed: BTreeSet<String>,
    /// The manifest was staged for commit.
    pub staged: bool,
    /// This save settled a merge.
    pub resolved_merge: bool,
}

impl SaveReport {
    pub fn is_noop(&self) -> bool {
        self.saved.is_empty() && self.removed.is_empty() && !self.staged && !self.resolved_merge
    }
}

/// What happened to one working-tree file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RestoreAction {
    /// An added file was deleted.
    Removed,
    /// A modified file got its recorded content back.
    Restored,
    /// A deleted file was written again.
    Recreated,
    /// The content is not cached; a zero-byte stub was written.
    Stubbed,
}

impl RestoreAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Removed => "Removed",
            Self::Restored => "Restored",
            Self::Recreated => "Added",
            Self::Stubbed => "Stubbed",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub actions: Vec<(String, RestoreAction)>,
}

impl RestoreReport {
    /// Items left as stubs because their content is not cached.
    pub fn missing(&self) -> usize {
        self.actions
            .iter()
            .filter(|(_, a)| *a == RestoreAction::Stubbed)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// What `restore` will do, worked out before any file is touched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestorePlan {
    pub(crate) manifest: Manifest,
    /// Modified files whose working copy gets overwritten.
    pub overwrite: BTreeSet<String>,
    /// Deleted files written again.
    pub recreate: BTreeSet<String>,
    /// Added files deleted from the working tree.
    pub remove: BTreeSet<String>,
}

impl RestorePlan {
    pub fn is_empty(&self) -> bool {
        self.overwrite.is_empty() && self.recreate.is_empty() && self.remove.is_empty()
    }

    /// Paths whose working-tree content is lost, sorted, with the action
    /// that will hit them.
    pub fn destructive(&self) -> Vec<(&str, RestoreAction)> {
        let mut out: Vec<(&str, RestoreAction)> = self
            .overwrite
            .iter()
            .map(|p| (p.as_str(), RestoreAction::Restored))
            .chain(self.remove.iter().map(|p| (p.as_str(), RestoreAction::Removed)))
            .collect();
        out.sort();
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeDriverOutcome {
    /// The merged manifest was written in place of "mine".
    Merged,
    /// A resolution form was written instead.
    Conflicted(ConflictSet),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreCommitReport {
    /// Conflicts of an unfinished merge, with their form lines.
    pub unresolved: Vec<(String, usize)>,
    pub offenders: StagedAdditions,
}

impl PreCommitReport {
    pub fn is_blocking(&self) -> bool {
        !self.unresolved.is_empty() || !self.offenders.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostCommitReport {
    pub revision: String,
    /// Objects now referenced by a landed commit.
    pub committed: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostCheckoutReport {
    pub restore: RestoreReport,
    /// Items changed both locally and on the checked-out revision. The
    /// local version was kept.
    pub conflicts: Option<ConflictSet>,
}
