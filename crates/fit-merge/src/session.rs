//! Merge-in-progress bookkeeping.
//!
//! A conflicted merge leaves three files in the fit state directory:
//! `merge-mine` (the merged manifest with conflicted items still at mine's
//! state), `merge-other` (the incoming manifest) and `merge-conflicts` (the
//! conflict set the form was rendered from). Together with a resolution
//! form in `.fit` they make up an unresolved merge.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fit_types::{read_optional, write_atomic, Manifest};
use tracing::{debug, info};

use crate::engine::ConflictSet;
use crate::error::{MergeError, MergeResult};
use crate::form::{is_form, parse_form, render_form, resolve, Resolution};

pub const MERGE_MINE_FILE: &str = "merge-mine";
pub const MERGE_OTHER_FILE: &str = "merge-other";
pub const MERGE_CONFLICTS_FILE: &str = "merge-conflicts";

/// Where a merge stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeState {
    /// No merge in progress.
    Clean,
    /// A form is waiting for choices.
    Conflicted,
    /// Every conflict has a choice; the caller is applying the resolution.
    Resolving,
}

/// A handle on the merge artifacts of one repository.
#[derive(Debug)]
pub struct MergeSession {
    mine_file: PathBuf,
    other_file: PathBuf,
    conflicts_file: PathBuf,
    state: MergeState,
}

impl MergeSession {
    /// Inspect the artifacts under `fit_dir` and the manifest file.
    ///
    /// Artifacts left behind without a form in the manifest file belong to
    /// a merge that was finished or aborted by other means; they are
    /// removed and the session is clean.
    pub fn open(fit_dir: &Path, manifest_file: &Path) -> MergeResult<Self> {
        let mut session = Self {
            mine_file: fit_dir.join(MERGE_MINE_FILE),
            other_file: fit_dir.join(MERGE_OTHER_FILE),
            conflicts_file: fit_dir.join(MERGE_CONFLICTS_FILE),
            state: MergeState::Clean,
        };

        let has_artifacts = [&session.mine_file, &session.other_file, &session.conflicts_file]
            .iter()
            .all(|file| file.exists());
        let has_form = read_optional(manifest_file)?.map_or(false, |data| is_form(&data));
        if has_artifacts && has_form {
            session.state = MergeState::Conflicted;
        } else {
            session.cleanup()?;
        }
        Ok(session)
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    pub fn is_in_progress(&self) -> bool {
        self.state != MergeState::Clean
    }

    /// Record a conflicted merge and write its form to `form_target`.
    pub fn begin(
        &mut self,
        merged: &Manifest,
        other: &Manifest,
        conflicts: &ConflictSet,
        form_target: &Path,
    ) -> MergeResult<()> {
        merged.save(&self.mine_file)?;
        other.save(&self.other_file)?;
        write_atomic(&self.conflicts_file, &serde_json::to_vec_pretty(conflicts)?)?;
        write_atomic(form_target, render_form(conflicts).as_bytes())?;
        self.state = MergeState::Conflicted;
        info!(conflicts = conflicts.len(), "merge stopped on conflicts");
        Ok(())
    }

    /// The merged and incoming manifests recorded by [`begin`](Self::begin).
    pub fn manifests(&self) -> MergeResult<(Manifest, Manifest)> {
        if self.state == MergeState::Clean {
            return Err(MergeError::NotMerging);
        }
        Ok((Manifest::load(&self.mine_file)?, Manifest::load(&self.other_file)?))
    }

    /// The conflicts recorded by [`begin`](Self::begin).
    pub fn conflicts(&self) -> MergeResult<ConflictSet> {
        if self.state == MergeState::Clean {
            return Err(MergeError::NotMerging);
        }
        Ok(serde_json::from_slice(&fs::read(&self.conflicts_file)?)?)
    }

    /// Apply the form text. Moves to [`MergeState::Resolving`] when every
    /// conflict has a choice; otherwise stays conflicted and the returned
    /// resolution lists what is left.
    pub fn resolve(&mut self, form_text: &str) -> MergeResult<Resolution> {
        let (merged, other) = self.manifests()?;
        let conflicts = self.conflicts()?;
        let rows = parse_form(form_text)?;
        let resolution = resolve(&rows, &conflicts, &merged, &other)?;
        self.state = if resolution.is_complete() {
            MergeState::Resolving
        } else {
            MergeState::Conflicted
        };
        debug!(
            rows = rows.len(),
            unresolved = resolution.unresolved.len(),
            "applied resolution form"
        );
        Ok(resolution)
    }

    /// Finish a resolved merge and drop its artifacts.
    pub fn finish(&mut self) -> MergeResult<()> {
        if self.state != MergeState::Resolving {
            return Err(MergeError::NotMerging);
        }
        self.cleanup()
    }

    fn cleanup(&mut self) -> MergeResult<()> {
        for file in [&self.mine_file, &self.other_file, &self.conflicts_file] {
            match fs::remove_file(file) {
                Ok(()) => debug!(file = %file.display(), "removed merge artifact"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.state = MergeState::Clean;
        Ok(())
    }
}
