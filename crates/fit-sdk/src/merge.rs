//! The git merge driver for the manifest and the resolution of its
//! conflicts.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use fit_merge::{merge_manifests, MergeOutcome};
use fit_types::{Manifest, ManifestEntry};
use tracing::{info, warn};

use crate::error::{SdkError, SdkResult};
use crate::report::{MergeDriverOutcome, RestoreReport, SaveReport};
use crate::repository::FitRepo;

impl FitRepo {
    /// Merge the three manifest versions git hands to a merge driver.
    ///
    /// Without conflicts the merged manifest replaces `mine`. Otherwise the
    /// merge is recorded in the fit directory and `mine` receives the
    /// resolution form, which git then leaves in the working tree. Either
    /// way the incoming non-conflicting changes are applied to items the
    /// working tree has not changed locally.
    pub fn merge_driver(
        &self,
        common: &Path,
        mine: &Path,
        other: &Path,
    ) -> SdkResult<MergeDriverOutcome> {
        let base = Manifest::load(common)?;
        let ours = Manifest::load(mine)?;
        let theirs = Manifest::load(other)?;

        let outcome = merge_manifests(&base, &ours, &theirs);
        self.apply_incoming(&ours, &outcome)?;

        match outcome.conflicts {
            None => {
                outcome.merged.save(mine)?;
                info!(
                    modified = outcome.modified.len(),
                    added = outcome.added.len(),
                    removed = outcome.removed.len(),
                    "manifests merged"
                );
                Ok(MergeDriverOutcome::Merged)
            }
            Some(conflicts) => {
                let mut session = self.session()?;
                session.begin(&outcome.merged, &theirs, &conflicts, mine)?;
                Ok(MergeDriverOutcome::Conflicted(conflicts))
            }
        }
    }

    /// Write the incoming changes of `outcome` to the working tree, leaving
    /// alone any item that differs from `ours` on disk.
    fn apply_incoming(&self, ours: &Manifest, outcome: &MergeOutcome) -> SdkResult<RestoreReport> {
        let touched: BTreeSet<String> = outcome
            .modified
            .iter()
            .chain(&outcome.added)
            .chain(&outcome.removed)
            .cloned()
            .collect();
        if touched.is_empty() {
            return Ok(RestoreReport::default());
        }

        let mut stat = self.stat_cache();
        let local = self.detector().detect(ours, Some(&touched), &mut stat)?;
        let dirty: BTreeSet<&String> = local
            .modified
            .keys()
            .chain(&local.added)
            .chain(&local.removed)
            .collect();
        for path in &dirty {
            warn!(path = %path, "keeping local version of an item changed by the merge");
        }

        let keep = |p: &&String| !dirty.contains(p);
        let write: BTreeSet<String> = outcome
            .modified
            .iter()
            .chain(&outcome.added)
            .filter(keep)
            .cloned()
            .collect();
        let delete: BTreeSet<String> = outcome.removed.iter().filter(keep).cloned().collect();
        self.apply_to_worktree(&outcome.merged, &write, &delete, &mut stat)
    }

    /// Apply a completed resolution form: write the resolved manifest over
    /// the form, stage it and end the merge.
    ///
    /// Items resolved to the working tree take whatever is on disk now; an
    /// item whose file is gone is removed. Items resolved to "theirs" get
    /// the incoming content written to the working tree.
    pub(crate) fn save_resolution(&self) -> SdkResult<SaveReport> {
        let mut session = self.session()?;
        let manifest_path = self.manifest_path();
        let form = fs::read_to_string(&manifest_path)?;
        let resolution = session.resolve(&form)?;
        if !resolution.is_complete() {
            return Err(SdkError::Unresolved(resolution.unresolved));
        }

        let mut manifest = resolution.manifest.clone();
        let mut stat = self.stat_cache();
        let mut saved = BTreeMap::new();
        let mut removed = BTreeSet::new();
        if !resolution.working.is_empty() {
            let refresh = stat.refresh(self.vcs(), &resolution.working)?;
            for path in refresh.missing {
                if manifest.remove(&path).is_some() {
                    removed.insert(path);
                }
            }
            // A zero-byte file is a stub: the merged entry stands.
            for (path, current) in refresh.entries {
                let entry = ManifestEntry::new(current.hash, current.stats.size);
                if manifest.get(&path) != Some(&entry) {
                    saved.insert(path, entry);
                }
            }
        }

        self.cache_saved(&saved)?;
        manifest.extend(saved.iter().map(|(p, e)| (p.clone(), e.clone())));
        manifest.save(&manifest_path)?;
        stat.save()?;
        let staged = self.stage_manifest(&manifest, &saved)?;

        let (write, delete): (BTreeSet<String>, BTreeSet<String>) =
            resolution.theirs.iter().cloned().partition(|p| manifest.contains(p));
        self.apply_to_worktree(&manifest, &write, &delete, &mut stat)?;

        session.finish()?;
        info!(
            mine = resolution.mine.len(),
            theirs = resolution.theirs.len(),
            working = resolution.working.len(),
            "merge resolved"
        );
        Ok(SaveReport {
            saved,
            removed,
            staged,
            resolved_merge: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::testing::{entry, set, Fixture};

    fn manifest(items: &[(&str, &[u8])]) -> Manifest {
        items.iter().map(|(p, d)| (p.to_string(), entry(d))).collect()
    }

    fn write_manifest(f: &Fixture, name: &str, m: &Manifest) -> PathBuf {
        let path = f.dir.path().join(name);
        m.save(&path).unwrap();
        path
    }

    /// Both sides changed `a`; only theirs changed `b`.
    fn run_conflicted(f: &Fixture) -> MergeDriverOutcome {
        f.track("a", b"a-mine");
        f.track("b", b"b-base");
        let common = write_manifest(f, "common", &manifest(&[("a", b"a-base"), ("b", b"b-base")]));
        let theirs = manifest(&[("a", b"a-theirs"), ("b", b"b-theirs")]);
        let other = write_manifest(f, "other", &theirs);
        let mine = f.repo.manifest_path();
        manifest(&[("a", b"a-mine"), ("b", b"b-base")]).save(&mine).unwrap();
        f.repo.merge_driver(&common, &mine, &other).unwrap()
    }

    fn choose(f: &Fixture, letter: char) {
        let form = fs::read_to_string(f.repo.manifest_path()).unwrap();
        let edited = form.replace("[]  **  a", &format!("[{letter}]  **  a"));
        assert_ne!(form, edited);
        fs::write(f.repo.manifest_path(), edited).unwrap();
    }

    #[test]
    fn clean_merge_writes_merged_manifest() {
        let f = Fixture::new();
        f.track("a", b"a-base");
        let common = write_manifest(&f, "common", &manifest(&[("a", b"a-base")]));
        let other = write_manifest(&f, "other", &manifest(&[("a", b"a-base"), ("b", b"b-new")]));
        let mine = f.repo.manifest_path();
        manifest(&[("a", b"a-base")]).save(&mine).unwrap();

        let outcome = f.repo.merge_driver(&common, &mine, &other).unwrap();
        assert_eq!(outcome, MergeDriverOutcome::Merged);
        assert_eq!(f.manifest_on_disk(), manifest(&[("a", b"a-base"), ("b", b"b-new")]));
        assert!(!f.repo.is_merge_in_progress().unwrap());
        // The incoming item is not cached locally: it arrives as a stub.
        assert!(f.read("b").is_empty());
    }

    #[test]
    fn conflicted_merge_leaves_a_form() {
        let f = Fixture::new();
        let MergeDriverOutcome::Conflicted(conflicts) = run_conflicted(&f) else {
            panic!("expected conflicts");
        };
        assert_eq!(conflicts.mod_mod, set(&["a"]));
        assert_eq!(conflicts.len(), 1);
        assert!(f.repo.is_merge_in_progress().unwrap());

        // While merging, the merged manifest stands in for `.fit`.
        let merged = f.repo.manifest().unwrap();
        assert_eq!(merged.get("a"), Some(&entry(b"a-mine")));
        assert_eq!(merged.get("b"), Some(&entry(b"b-theirs")));
        assert!(f.read("b").is_empty());

        let status = f.repo.status(None).unwrap();
        let row = status.rows(false).into_iter().find(|r| r.path == "a").unwrap();
        assert_eq!(row.merge, Some('U'));
    }

    #[test]
    fn save_blocks_until_every_conflict_has_a_choice() {
        let f = Fixture::new();
        run_conflicted(&f);

        match f.repo.save(None) {
            Err(SdkError::Unresolved(rows)) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].0, "a");
            }
            other => panic!("expected Unresolved, got {other:?}"),
        }
        assert!(matches!(
            f.repo.save(Some(&set(&["a"]))),
            Err(SdkError::InvalidOperation(_))
        ));
        assert!(f.repo.is_merge_in_progress().unwrap());
    }

    #[test]
    fn theirs_resolution_takes_the_incoming_entry() {
        let f = Fixture::new();
        run_conflicted(&f);
        choose(&f, 'T');

        let report = f.repo.save(None).unwrap();
        assert!(report.resolved_merge);
        assert!(report.staged);
        assert!(!f.repo.is_merge_in_progress().unwrap());
        assert_eq!(
            f.manifest_on_disk(),
            manifest(&[("a", b"a-theirs"), ("b", b"b-theirs")])
        );
        // Their content is not cached locally.
        assert!(f.read("a").is_empty());
    }

    #[test]
    fn mine_resolution_keeps_the_local_entry() {
        let f = Fixture::new();
        run_conflicted(&f);
        choose(&f, 'm');

        f.repo.save(None).unwrap();
        assert_eq!(f.manifest_on_disk().get("a"), Some(&entry(b"a-mine")));
        assert_eq!(f.read("a"), b"a-mine");
    }

    #[test]
    fn working_resolution_uses_the_file_on_disk() {
        let f = Fixture::new();
        run_conflicted(&f);
        f.write("a", b"a-hand-merged");
        choose(&f, 'W');

        let report = f.repo.save(None).unwrap();
        assert_eq!(report.saved.get("a"), Some(&entry(b"a-hand-merged")));
        assert_eq!(f.manifest_on_disk().get("a"), Some(&entry(b"a-hand-merged")));
        assert!(f.repo.content_cache().unwrap().contains(&entry(b"a-hand-merged").hash));
    }

    #[test]
    fn working_resolution_of_a_deleted_file_removes_the_item() {
        let f = Fixture::new();
        run_conflicted(&f);
        fs::remove_file(f.root().join("a")).unwrap();
        choose(&f, 'W');

        let report = f.repo.save(None).unwrap();
        assert_eq!(report.removed, set(&["a"]));
        assert!(!f.manifest_on_disk().contains("a"));
    }

    #[test]
    fn malformed_form_changes_nothing() {
        let f = Fixture::new();
        run_conflicted(&f);
        let form = fs::read_to_string(f.repo.manifest_path()).unwrap();
        fs::write(f.repo.manifest_path(), form.replace("[]  **  a", "[X]  **  a")).unwrap();

        assert!(matches!(f.repo.save(None), Err(SdkError::Merge(_))));
        assert!(f.repo.is_merge_in_progress().unwrap());
    }

    #[test]
    fn deleted_form_row_keeps_the_commit_blocked() {
        let f = Fixture::new();
        run_conflicted(&f);
        let form = fs::read_to_string(f.repo.manifest_path()).unwrap();
        fs::write(f.repo.manifest_path(), form.replace("[]  **  a\n", "")).unwrap();

        let report = f.repo.pre_commit().unwrap();
        assert!(report.is_blocking());
        assert_eq!(report.unresolved, vec![("a".to_string(), 0)]);
        assert!(matches!(f.repo.save(None), Err(SdkError::Unresolved(_))));
        assert!(f.repo.is_merge_in_progress().unwrap());
    }
}
