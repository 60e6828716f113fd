//! # soupsync Engine
//!
//! Sync state machine and orchestration engine for soupsync.
//!
//! This crate provides:
//! - [`SyncManager`]: runs sync-down and sync-up against a local store
//! - [`SyncManagerRegistry`]: one manager per authenticated identity
//! - The narrow contracts the engine consumes: [`RestClient`] and
//!   [`LocalStore`], with in-memory doubles for both
//! - The sync-up push seam ([`SyncUpTarget`]) and the custom sync-down
//!   target registry
//!
//! ## Architecture
//!
//! A sync is a persisted [`soupsync_model::SyncState`] run by a manager:
//! the manager asks the target's fetch path for pages of work, applies
//! each page to the local store under a transaction, and updates
//! status/progress on the state, persisting after every change and
//! invoking the caller's callback synchronously.
//!
//! ## Key invariants
//!
//! - A sync's id never changes; re-running reuses it
//! - Progress is non-decreasing within a run and exactly 100 on Done
//! - Dirty flags are cleared only after the server accepted the record
//! - Run failures are recorded on the state, never raised to the caller

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod custom;
mod error;
mod fetch;
mod manager;
mod registry;
mod rest;
mod store;
mod up_target;

pub use config::SyncManagerConfig;
pub use custom::{CustomSyncDownTarget, CustomTargetFactory, CustomTargetRegistry};
pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use fetch::FetchPage;
pub use manager::{SyncCallback, SyncManager};
pub use registry::{global, Identity, SyncManagerRegistry};
pub use rest::{MockRestClient, RestClient, RestMethod, RestRequest, RestResponse};
pub use store::{
    path_value, IndexSpec, IndexType, LocalStore, MemoryLocalStore, QueryFilter, QuerySpec,
};
pub use up_target::{project_fields, PushOutcome, RestSyncUpTarget, SyncUpTarget};
