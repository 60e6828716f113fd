//! Runtime-registered sync-down targets.
//!
//! A custom target is referenced from its serialized descriptor by a
//! string tag. Tags map to factory functions registered at startup;
//! resolving an unregistered tag is a typed error raised before any
//! network activity.

use crate::error::{SyncError, SyncResult};
use crate::fetch::FetchPage;
use crate::rest::RestClient;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A sync-down fetch path supplied at runtime.
///
/// Implementations own their continuation state; the engine calls
/// `start_fetch` once and then `continue_fetch` until it returns `None`.
pub trait CustomSyncDownTarget: Send {
    /// Fetches the first page. `max_time_stamp` is the persisted
    /// high-water mark (-1 when unset) for incremental fetches.
    fn start_fetch(&mut self, rest: &dyn RestClient, max_time_stamp: i64)
        -> SyncResult<FetchPage>;

    /// Fetches the next page, or `None` when pagination is exhausted.
    fn continue_fetch(&mut self, rest: &dyn RestClient) -> SyncResult<Option<FetchPage>>;
}

impl std::fmt::Debug for dyn CustomSyncDownTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn CustomSyncDownTarget")
    }
}

/// Constructor for a custom target, fed the descriptor's `params` value.
pub type CustomTargetFactory =
    Arc<dyn Fn(&Value) -> SyncResult<Box<dyn CustomSyncDownTarget>> + Send + Sync>;

/// Tag-to-factory map for custom targets.
#[derive(Default)]
pub struct CustomTargetRegistry {
    factories: RwLock<HashMap<String, CustomTargetFactory>>,
}

impl CustomTargetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a tag, replacing any previous one.
    pub fn register<F>(&self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> SyncResult<Box<dyn CustomSyncDownTarget>> + Send + Sync + 'static,
    {
        self.factories.write().insert(tag.into(), Arc::new(factory));
    }

    /// Returns true if a factory is registered under the tag.
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.read().contains_key(tag)
    }

    /// Builds a target from its tag and params.
    pub fn resolve(&self, tag: &str, params: &Value) -> SyncResult<Box<dyn CustomSyncDownTarget>> {
        let factory = self
            .factories
            .read()
            .get(tag)
            .cloned()
            .ok_or_else(|| SyncError::UnknownCustomTarget(tag.to_string()))?;
        factory(params)
    }
}
