//! Foundation types for git-fit.
//!
//! Every other fit crate depends on `fit-types`. It defines what a tracked
//! item *is* (a path mapped to a content hash and a size), how the set of
//! tracked items is encoded on disk, and how state files are replaced
//! atomically.
//!
//! # Key Types
//!
//! - [`ContentHash`] -- 40-hex git blob checksum identifying file content
//! - [`Manifest`] -- the committed `path -> (hash, size)` table (`.fit`)
//! - [`ManifestEntry`] -- a single `(hash, size)` pair

pub mod error;
pub mod hash;
pub mod manifest;
pub mod persist;

pub use error::{TypeError, TypeResult};
pub use hash::{ContentHash, EMPTY_BLOB_HEX};
pub use manifest::{Manifest, ManifestEntry};
pub use persist::{read_optional, write_atomic};
