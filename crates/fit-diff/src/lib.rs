//! Manifest diff for git-fit.
//!
//! Compares a manifest against an ancestor by item path. A merge runs two of
//! these (ancestor vs. mine, ancestor vs. theirs) and reasons about how the
//! two sides overlap.
//!
//! # Key Types
//!
//! - [`ManifestDiff`] -- Modified/added/removed item paths
//! - [`ManifestChange`] -- A single change with the entries involved

pub mod manifest_diff;

pub use manifest_diff::{three_way_diff, ManifestChange, ManifestDiff};
