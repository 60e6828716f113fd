//! # soupsync Model
//!
//! Serializable data model for the soupsync engine.
//!
//! This crate provides:
//! - `SyncDownTarget` descriptors (MRU, SOQL, SOSL, custom)
//! - `SyncState` for durable per-sync bookkeeping
//! - `SyncOptions` and `MergeMode`
//! - The local record envelope (dirty flags, placeholder ids, timestamps)
//! - `SoqlBuilder` / `SoslBuilder` query builders
//!
//! This is a pure data crate with no I/O operations. Every durable type
//! round-trips through JSON so it can be persisted in a soup and
//! reconstructed later.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod options;
mod query;
pub mod record;
mod state;
mod target;

pub use error::{ModelError, ModelResult};
pub use options::{MergeMode, SyncOptions};
pub use query::{SoqlBuilder, SoslBuilder, SoslReturning};
pub use state::{SyncState, SyncStatus, SyncType};
pub use target::{QueryType, SyncDownTarget};
