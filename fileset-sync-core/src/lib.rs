#![doc = "fileset-sync-core: publish a local fileset to an object store as one immutable unit."]

//! This crate holds the whole synchronization engine: discovery and hashing
//! of local files, the fileset's aggregate digest, upload orchestration with
//! post-write confirmation, the resource identity, and the lifecycle
//! reconciler the host drives.
//!
//! Remote storage is reached only through [`contract::ObjectStore`]; concrete
//! clients live in the embedding crate.
//!
//! # Usage
//! Build a [`reconcile::Reconciler`] around a store and feed it
//! [`reconcile::Operation`]s.

pub mod config;
pub mod context;
pub mod contract;
pub mod diagnostics;
pub mod discover;
pub mod error;
pub mod fileset;
pub mod identity;
pub mod publish;
pub mod reconcile;
pub mod state;

pub use config::{Attr, FileOptions, FilesetConfiguration};
pub use context::{CancelHandle, OperationContext};
pub use contract::ObjectStore;
pub use error::{StoreError, SyncError};
pub use identity::FilesetIdentity;
pub use reconcile::{Operation, Outcome, Reconciler, StateChange};
pub use state::PersistedState;
