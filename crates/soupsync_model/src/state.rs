//! Durable sync bookkeeping.
//!
//! A [`SyncState`] is one persisted record per configured sync. It lives
//! in the engine's `syncs` soup and is re-read by id to re-run the same
//! sync later.

use crate::error::{ModelError, ModelResult};
use crate::options::SyncOptions;
use crate::target::SyncDownTarget;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entry id of a state that has not been persisted yet.
pub const UNASSIGNED_ID: i64 = -1;

/// Direction of a sync. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncType {
    /// Pull remote records into the local store.
    #[serde(rename = "syncDown")]
    Down,
    /// Push locally-dirty records to the server.
    #[serde(rename = "syncUp")]
    Up,
}

/// Lifecycle status of a sync.
///
/// Transitions are forward-only within a run; a re-run rotates Done or
/// Failed back to Running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    /// Created but never run.
    New,
    /// A run is in flight.
    Running,
    /// The last run completed.
    Done,
    /// The last run failed.
    Failed,
}

impl SyncStatus {
    /// Returns true if a new run may start from this status.
    pub fn can_start_run(&self) -> bool {
        !matches!(self, SyncStatus::Running)
    }

    /// Returns true if the sync reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Done | SyncStatus::Failed)
    }
}

/// One durable record per configured sync.
///
/// The engine is the only mutator of `status` and `progress`, and it
/// persists the state after every change so a crash leaves a consistent
/// last-known state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(rename = "_soupEntryId", default = "unassigned")]
    id: i64,
    #[serde(rename = "type")]
    sync_type: SyncType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<SyncDownTarget>,
    options: SyncOptions,
    #[serde(rename = "soupName")]
    soup_name: String,
    status: SyncStatus,
    progress: i64,
    #[serde(rename = "totalSize")]
    total_size: i64,
    #[serde(rename = "maxTimeStamp")]
    max_time_stamp: i64,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

fn unassigned() -> i64 {
    UNASSIGNED_ID
}

impl SyncState {
    /// Creates a new sync-down state.
    pub fn sync_down(
        target: SyncDownTarget,
        soup_name: impl Into<String>,
        options: SyncOptions,
    ) -> Self {
        Self {
            id: UNASSIGNED_ID,
            sync_type: SyncType::Down,
            target: Some(target),
            options,
            soup_name: soup_name.into(),
            status: SyncStatus::New,
            progress: 0,
            total_size: -1,
            max_time_stamp: -1,
            last_error: None,
        }
    }

    /// Creates a new sync-up state.
    pub fn sync_up(soup_name: impl Into<String>, options: SyncOptions) -> Self {
        Self {
            id: UNASSIGNED_ID,
            sync_type: SyncType::Up,
            target: None,
            options,
            soup_name: soup_name.into(),
            status: SyncStatus::New,
            progress: 0,
            total_size: -1,
            max_time_stamp: -1,
            last_error: None,
        }
    }

    /// The locally-unique id, stable for the life of the sync.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Returns true if the state has not been persisted yet.
    pub fn has_unassigned_id(&self) -> bool {
        self.id == UNASSIGNED_ID
    }

    /// Assigns the store-issued entry id. Only the first assignment takes
    /// effect; the id never changes afterwards.
    pub fn assign_entry_id(&mut self, id: i64) {
        if self.id == UNASSIGNED_ID {
            self.id = id;
        }
    }

    /// The sync direction.
    pub fn sync_type(&self) -> SyncType {
        self.sync_type
    }

    /// The sync-down target, when this is a down sync.
    pub fn target(&self) -> Option<&SyncDownTarget> {
        self.target.as_ref()
    }

    /// The options attached at creation.
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// The soup this sync reads from / writes to.
    pub fn soup_name(&self) -> &str {
        &self.soup_name
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Progress percentage, 0 to 100.
    pub fn progress(&self) -> i64 {
        self.progress
    }

    /// Record count discovered for the current run, -1 until known.
    pub fn total_size(&self) -> i64 {
        self.total_size
    }

    /// High-water mark of last-modified values, epoch ms, -1 when unset.
    pub fn max_time_stamp(&self) -> i64 {
        self.max_time_stamp
    }

    /// Error recorded by the last failed run.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Rotates the state into a fresh run.
    pub fn start_run(&mut self) {
        self.status = SyncStatus::Running;
        self.progress = 0;
        self.last_error = None;
    }

    /// Raises progress. Decreases are ignored so the reported sequence is
    /// non-decreasing within one run; values above 100 are clamped.
    pub fn update_progress(&mut self, progress: i64) {
        let clamped = progress.min(100);
        if clamped > self.progress {
            self.progress = clamped;
        }
    }

    /// Records the discovered record count for this run.
    pub fn set_total_size(&mut self, total_size: i64) {
        self.total_size = total_size;
    }

    /// Records the high-water mark observed by this run.
    pub fn set_max_time_stamp(&mut self, max_time_stamp: i64) {
        self.max_time_stamp = max_time_stamp;
    }

    /// Marks the run complete. Progress becomes exactly 100.
    pub fn mark_done(&mut self) {
        self.status = SyncStatus::Done;
        self.progress = 100;
    }

    /// Marks the run failed, preserving progress and total size.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = SyncStatus::Failed;
        self.last_error = Some(error.into());
    }

    /// Serializes to the persisted JSON layout.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Reconstructs a state from its persisted JSON layout.
    pub fn from_json(value: &Value) -> ModelResult<Self> {
        serde_json::from_value(value.clone()).map_err(ModelError::state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_sync_down_state() {
        let state = SyncState::sync_down(
            SyncDownTarget::soql("SELECT Id FROM Account"),
            "accounts",
            SyncOptions::overwrite(),
        );

        assert!(state.has_unassigned_id());
        assert_eq!(state.sync_type(), SyncType::Down);
        assert_eq!(state.status(), SyncStatus::New);
        assert_eq!(state.progress(), 0);
        assert_eq!(state.total_size(), -1);
        assert_eq!(state.max_time_stamp(), -1);
        assert!(state.target().is_some());
    }

    #[test]
    fn entry_id_is_set_once() {
        let mut state = SyncState::sync_up("accounts", SyncOptions::fields(["Name"]));
        state.assign_entry_id(7);
        state.assign_entry_id(9);
        assert_eq!(state.id(), 7);
    }

    #[test]
    fn progress_is_monotonic() {
        let mut state = SyncState::sync_up("accounts", SyncOptions::default());
        state.start_run();
        state.update_progress(40);
        state.update_progress(20);
        assert_eq!(state.progress(), 40);
        state.update_progress(250);
        assert_eq!(state.progress(), 100);
    }

    #[test]
    fn failed_keeps_progress_and_size() {
        let mut state = SyncState::sync_down(
            SyncDownTarget::soql("SELECT Id FROM Account"),
            "accounts",
            SyncOptions::overwrite(),
        );
        state.start_run();
        state.set_total_size(10);
        state.update_progress(30);
        state.mark_failed("transport error: 500");

        assert_eq!(state.status(), SyncStatus::Failed);
        assert_eq!(state.progress(), 30);
        assert_eq!(state.total_size(), 10);
        assert_eq!(state.last_error(), Some("transport error: 500"));

        state.start_run();
        assert_eq!(state.status(), SyncStatus::Running);
        assert_eq!(state.progress(), 0);
        assert!(state.last_error().is_none());
    }

    #[test]
    fn persisted_layout_field_names() {
        let mut state = SyncState::sync_down(
            SyncDownTarget::soql("SELECT Id FROM Account"),
            "accounts",
            SyncOptions::leave_if_changed(),
        );
        state.assign_entry_id(3);
        state.start_run();

        let json = state.to_json();
        assert_eq!(json["_soupEntryId"], 3);
        assert_eq!(json["type"], "syncDown");
        assert_eq!(json["soupName"], "accounts");
        assert_eq!(json["status"], "running");
        assert_eq!(json["totalSize"], -1);
        assert_eq!(json["maxTimeStamp"], -1);
        assert_eq!(json["target"]["queryType"], "soql");
        assert_eq!(json["options"]["mergeMode"], "leaveIfChanged");
        assert!(json.get("error").is_none());

        let back = SyncState::from_json(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn malformed_state_is_an_error() {
        let err = SyncState::from_json(&json!({"type": "syncDown"})).unwrap_err();
        assert!(matches!(err, ModelError::MalformedState(_)));
    }

    #[test]
    fn status_predicates() {
        assert!(SyncStatus::New.can_start_run());
        assert!(SyncStatus::Done.can_start_run());
        assert!(SyncStatus::Failed.can_start_run());
        assert!(!SyncStatus::Running.can_start_run());

        assert!(SyncStatus::Done.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
        assert!(!SyncStatus::New.is_terminal());
    }
}
