//! The git hooks: pre-commit, post-commit and post-checkout.

use std::collections::BTreeSet;
use std::fs;

use fit_merge::merge_manifests;
use fit_types::{ContentHash, Manifest, ManifestEntry};
use tracing::{debug, info};

use crate::error::SdkResult;
use crate::report::{PostCheckoutReport, PostCommitReport, PreCommitReport};
use crate::repository::{FitRepo, COMMITS_DIR, SAVES_DIR};

impl FitRepo {
    /// What would make the commit about to happen wrong: conflicts without
    /// a choice, and staged files git should not be storing.
    pub fn pre_commit(&self) -> SdkResult<PreCommitReport> {
        let mut report = PreCommitReport {
            offenders: self.vcs.staged_additions(&self.config.attribute)?,
            ..PreCommitReport::default()
        };

        let mut session = self.session()?;
        if session.is_in_progress() {
            let form = fs::read_to_string(self.manifest_path())?;
            report.unresolved = session.resolve(&form)?.unresolved;
        }
        Ok(report)
    }

    /// Move the save record of the committed manifest under the new
    /// revision, marking its objects as referenced by history.
    pub fn post_commit(&self) -> SdkResult<PostCommitReport> {
        let Some(revision) = self.vcs.current_revision_id()? else {
            return Ok(PostCommitReport {
                revision: String::new(),
                committed: 0,
            });
        };

        let mut report = PostCommitReport {
            revision: revision.clone(),
            committed: 0,
        };
        let committed = self
            .vcs
            .read_file_at_revision(&self.config.manifest_file, &revision)?;
        let Some(data) = committed else {
            return Ok(report);
        };

        let saves_file = self.fit_dir.join(SAVES_DIR).join(ContentHash::of_blob(&data).as_str());
        if !saves_file.exists() {
            debug!(revision = %revision, "commit carries no saved fit changes");
            return Ok(report);
        }

        let record = Manifest::load(&saves_file)?;
        let commits_dir = self.fit_dir.join(COMMITS_DIR);
        fs::create_dir_all(&commits_dir)?;
        fs::rename(&saves_file, commits_dir.join(&revision))?;

        report.committed = self.content_cache()?.commit(record.iter().map(|(_, e)| &e.hash))?;
        info!(revision = %revision, items = record.len(), "fit changes committed");
        Ok(report)
    }

    /// Carry uncommitted working-tree changes across a branch switch.
    ///
    /// The working tree is treated as the old revision's manifest plus the
    /// local changes, and merged with the manifest just checked out. The
    /// incoming changes are written to the working tree; items changed on
    /// both sides keep their local version. `branch_checkout` is git's third
    /// hook argument: file checkouts are ignored.
    pub fn post_checkout(
        &self,
        old_rev: &str,
        new_rev: &str,
        branch_checkout: bool,
    ) -> SdkResult<PostCheckoutReport> {
        if !branch_checkout || old_rev == new_rev {
            return Ok(PostCheckoutReport::default());
        }

        let old = match self.vcs.read_file_at_revision(&self.config.manifest_file, old_rev)? {
            Some(data) => Manifest::from_slice(&data)?,
            None => Manifest::new(),
        };
        let new = self.manifest()?;
        let mut stat = self.stat_cache();
        let working = self.worktree_manifest(&old, &mut stat)?;

        let outcome = merge_manifests(&old, &working, &new);
        let write: BTreeSet<String> = outcome.modified.union(&outcome.added).cloned().collect();
        let restore = self.apply_to_worktree(&outcome.merged, &write, &outcome.removed, &mut stat)?;
        info!(
            old = old_rev,
            new = new_rev,
            written = write.len(),
            removed = outcome.removed.len(),
            "working tree updated for checkout"
        );
        Ok(PostCheckoutReport {
            restore,
            conflicts: outcome.conflicts,
        })
    }

    /// `base` with the working-tree changes applied. Nothing is cached or
    /// written; zero-byte additions are left out.
    fn worktree_manifest(
        &self,
        base: &Manifest,
        stat: &mut fit_index::StatCache,
    ) -> SdkResult<Manifest> {
        let changes = self.detector().detect(base, None, stat)?;
        let mut working = base.clone();
        working.extend(changes.modified);
        for path in changes.removed.iter().chain(&changes.untracked) {
            working.remove(path);
        }
        if !changes.added.is_empty() {
            let refresh = stat.refresh(self.vcs(), &changes.added)?;
            working.extend(
                refresh
                    .entries
                    .into_iter()
                    .map(|(path, e)| (path, ManifestEntry::new(e.hash, e.stats.size))),
            );
        }
        stat.save()?;
        Ok(working)
    }
}

#[cfg(test)]
mod tests {
    use fit_vcs::VersionControlBackend;
    use fit_store::NewObject;

    use super::*;
    use crate::report::RestoreAction;
    use crate::testing::{entry, set, Fixture};

    #[test]
    fn pre_commit_passes_a_clean_index() {
        let f = Fixture::new();
        f.track("art/hero.png", b"hero-v1");
        f.repo.save(None).unwrap();

        let report = f.repo.pre_commit().unwrap();
        assert!(!report.is_blocking(), "{report:?}");
    }

    #[test]
    fn pre_commit_blocks_on_staged_offenders() {
        let f = Fixture::new();
        f.track("art/hero.png", b"hero-v1");
        f.vcs.stage_bytes("art/hero.png", b"hero-v1".to_vec());
        f.write("lib/native.so", b"\x7fELF\0\0\0");
        f.vcs.stage_bytes("lib/native.so", b"\x7fELF\0\0\0".to_vec());
        f.write("notes.txt", b"plain text");
        f.vcs.stage_bytes("notes.txt", b"plain text".to_vec());

        let report = f.repo.pre_commit().unwrap();
        assert!(report.is_blocking());
        assert_eq!(report.offenders.tracked, set(&["art/hero.png"]));
        assert_eq!(report.offenders.binary, set(&["lib/native.so"]));
        assert!(report.unresolved.is_empty());
    }

    #[test]
    fn post_commit_moves_the_save_record() {
        let f = Fixture::new();
        f.track("art/hero.png", b"hero-v1");
        f.repo.save(None).unwrap();
        let staged = f.vcs.staged_blob_hash(".fit").unwrap().unwrap();

        f.vcs.commit("c1");
        let report = f.repo.post_commit().unwrap();
        assert_eq!(report.revision, "c1");
        assert_eq!(report.committed, 1);

        let fit_dir = f.repo.fit_dir();
        assert!(!fit_dir.join(SAVES_DIR).join(staged.as_str()).exists());
        let record = Manifest::load(&fit_dir.join(COMMITS_DIR).join("c1")).unwrap();
        assert_eq!(record.get("art/hero.png"), Some(&entry(b"hero-v1")));
        assert_eq!(f.repo.status(None).unwrap().pending_uploads, 1);
    }

    #[test]
    fn post_commit_without_fit_changes_does_nothing() {
        let f = Fixture::new();
        f.vcs.commit("c1");
        let report = f.repo.post_commit().unwrap();
        assert_eq!(report.committed, 0);
        assert!(!f.repo.fit_dir().join(COMMITS_DIR).join("c1").exists());
    }

    /// Commit `a` and `b` as "old", then put a "new" manifest in place as a
    /// checkout would, with `a` changed and `b` gone. The new content of
    /// `a` is already cached.
    fn checkout_fixture() -> Fixture {
        let f = Fixture::new();
        f.track("a", b"a-old");
        f.track("b", b"b-old");
        f.save_and_commit("old");

        let scratch = f.dir.path().join("scratch");
        fs::write(&scratch, b"a-new, longer").unwrap();
        let new_a = entry(b"a-new, longer");
        f.repo
            .content_cache()
            .unwrap()
            .insert(&[NewObject::new(new_a.hash.clone(), new_a.size, &scratch)], false)
            .unwrap();

        let new: Manifest = [("a".to_string(), new_a)].into_iter().collect();
        new.save(&f.repo.manifest_path()).unwrap();
        f
    }

    #[test]
    fn post_checkout_applies_incoming_changes() {
        let f = checkout_fixture();
        let report = f.repo.post_checkout("old", "new", true).unwrap();

        assert!(report.conflicts.is_none());
        assert_eq!(
            report.restore.actions,
            vec![
                ("a".to_string(), RestoreAction::Restored),
                ("b".to_string(), RestoreAction::Removed),
            ]
        );
        assert_eq!(f.read("a"), b"a-new, longer");
        assert!(!f.exists("b"));
        assert!(!f.repo.status(None).unwrap().changes.has_changes());
    }

    #[test]
    fn post_checkout_keeps_local_edits() {
        let f = checkout_fixture();
        f.write("a", b"a-local edit!!");

        let report = f.repo.post_checkout("old", "new", true).unwrap();
        let conflicts = report.conflicts.unwrap();
        assert_eq!(conflicts.mod_mod, set(&["a"]));
        assert_eq!(f.read("a"), b"a-local edit!!");
        assert!(!f.exists("b"));
    }

    #[test]
    fn post_checkout_ignores_file_checkouts() {
        let f = checkout_fixture();
        let report = f.repo.post_checkout("old", "new", false).unwrap();
        assert_eq!(report, PostCheckoutReport::default());
        assert_eq!(f.read("a"), b"a-old");
        assert!(f.exists("b"));
    }
}
