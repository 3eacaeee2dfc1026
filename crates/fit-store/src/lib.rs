//! Local object cache for git-fit.
//!
//! Large-file content lives here, outside the VCS, addressed by its blob
//! checksum at `objects/<hash[0..2]>/<hash[2..]>`. Objects are kept in one
//! of two partitions:
//!
//! - **LRU**: content known to exist elsewhere (remotely, or committed and
//!   uploaded). Evicted oldest-first when the cache grows too large.
//! - **Pending**: content saved locally and not yet uploaded. Never evicted.
//!
//! # Key Types
//!
//! - [`ContentCache`] -- The object cache
//! - [`Ledger`] -- Persisted partition bookkeeping
//! - [`NewObject`] -- A file to be copied into the cache
//! - [`InsertOutcome`] / [`PruneReport`] -- Operation summaries

pub mod cache;
pub mod error;
pub mod ledger;

pub use cache::{ContentCache, InsertOutcome, NewObject, PruneReport};
pub use error::{StoreError, StoreResult};
pub use ledger::{Ledger, LruItem, Partition, PendingItem};
