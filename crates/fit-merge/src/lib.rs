//! Merge engine for git-fit.
//!
//! Merges three manifest snapshots (common ancestor, mine, theirs). Changes
//! that do not overlap are applied automatically; overlapping changes become
//! conflicts, which the user settles by editing a Conflict Resolution Form
//! that temporarily replaces the `.fit` file.
//!
//! # Key Types
//!
//! - [`merge_manifests`] / [`MergeOutcome`] -- The three-way merge
//! - [`ConflictSet`] / [`ConflictKind`] -- The four kinds of conflict
//! - [`FormRow`] / [`Mark`] / [`Choice`] -- Parsed resolution form rows
//! - [`Resolution`] -- Outcome of applying a form
//! - [`MergeSession`] / [`MergeState`] -- Merge-in-progress bookkeeping

pub mod engine;
pub mod error;
pub mod form;
pub mod session;

pub use engine::{merge_manifests, Conflict, ConflictKind, ConflictSet, MergeOutcome};
pub use error::{MergeError, MergeResult};
pub use form::{
    is_form, parse_form, render_form, resolve, Choice, FormRow, Mark, Resolution, FORM_SENTINEL,
    MERGE_HELP,
};
pub use session::{
    MergeSession, MergeState, MERGE_CONFLICTS_FILE, MERGE_MINE_FILE, MERGE_OTHER_FILE,
};
