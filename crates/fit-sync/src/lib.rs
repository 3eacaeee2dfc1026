//! Object transfer for git-fit.
//!
//! Moves fit objects between the local cache and a remote store: `get`
//! fills zero-byte working-tree stubs, `put` uploads objects referenced by
//! landed commits. Remote stores are chosen by kind through a registry.
//!
//! # Key Types
//!
//! - [`TransferCoordinator`] -- Runs get/put against the cache and a store
//! - [`RemoteStore`] -- Async object transport (`check`, `get`, `put`)
//! - [`StoreRegistry`] / [`StoreConfig`] -- Store kinds and their settings
//! - [`LocalDirStore`] -- Directory-backed store
//! - [`TransferProgress`] -- Progress events for a running transfer

pub mod coordinator;
pub mod error;
pub mod local;
pub mod progress;
pub mod registry;
pub mod remote;
pub mod types;

pub use coordinator::TransferCoordinator;
pub use error::{SyncError, SyncResult};
pub use local::LocalDirStore;
pub use progress::{ItemOutcome, QuietProgress, TransferProgress};
pub use registry::{StoreConfig, StoreFactory, StoreRegistry};
pub use remote::{ObjectRef, RemoteStore};
pub use types::{GetPlan, PlannedItem, PutPlan, TransferReport};
