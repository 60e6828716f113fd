//! One sync manager per identity.
//!
//! The registry owns the "one manager per (identity, community) pair"
//! invariant. It is an explicit object meant to live at the application's
//! composition root; [`global`] offers a process-wide convenience
//! instance, but nothing in the engine depends on it.

use crate::manager::SyncManager;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// The (user, community) pair a manager is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Authenticated user id.
    pub user_id: String,
    /// Community scope, when the user acts inside one.
    pub community_id: Option<String>,
}

impl Identity {
    /// Creates an identity with no community scope.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            community_id: None,
        }
    }

    /// Creates a community-scoped identity.
    pub fn with_community(user_id: impl Into<String>, community_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            community_id: Some(community_id.into()),
        }
    }
}

/// Lazily-populated map from identity to manager.
///
/// The lock is held only for the lookup-or-create step; manager
/// construction performs no I/O, so no network or storage call ever runs
/// under it.
#[derive(Default)]
pub struct SyncManagerRegistry {
    managers: Mutex<HashMap<Identity, Arc<SyncManager>>>,
}

impl SyncManagerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the manager for the identity, constructing it with `init`
    /// on first use.
    pub fn get_instance<F>(&self, identity: &Identity, init: F) -> Arc<SyncManager>
    where
        F: FnOnce() -> SyncManager,
    {
        let mut managers = self.managers.lock();
        managers
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(init()))
            .clone()
    }

    /// Returns the manager for the identity, if one was created.
    pub fn get(&self, identity: &Identity) -> Option<Arc<SyncManager>> {
        self.managers.lock().get(identity).cloned()
    }

    /// Drops the cached manager for the identity. Returns true if one
    /// was cached.
    pub fn reset(&self, identity: &Identity) -> bool {
        self.managers.lock().remove(identity).is_some()
    }

    /// Drops every cached manager.
    pub fn reset_all(&self) {
        self.managers.lock().clear();
    }

    /// Returns how many managers are cached.
    pub fn len(&self) -> usize {
        self.managers.lock().len()
    }

    /// Returns true if no manager is cached.
    pub fn is_empty(&self) -> bool {
        self.managers.lock().is_empty()
    }
}

/// The process-wide convenience registry.
pub fn global() -> &'static SyncManagerRegistry {
    static GLOBAL: OnceLock<SyncManagerRegistry> = OnceLock::new();
    GLOBAL.get_or_init(SyncManagerRegistry::new)
}
