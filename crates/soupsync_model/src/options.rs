//! Sync options and merge policy.

use serde::{Deserialize, Serialize};

/// Policy governing whether an incoming sync-down record may overwrite a
/// locally-modified record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeMode {
    /// Incoming data always replaces local content.
    #[default]
    Overwrite,
    /// Incoming data is skipped when the local counterpart is dirty.
    LeaveIfChanged,
    /// No merge check at all (behaves like [`MergeMode::Overwrite`]).
    None,
}

impl MergeMode {
    /// Returns true if a dirty local record may be replaced.
    pub fn overwrites_dirty(&self) -> bool {
        !matches!(self, MergeMode::LeaveIfChanged)
    }
}

/// Options attached to a sync: the fields eligible for push (sync-up only)
/// and the merge policy. Immutable once attached to a sync state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    /// Field names eligible for push during sync-up.
    #[serde(default)]
    pub field_list: Vec<String>,
    /// Merge policy for sync-down.
    #[serde(default)]
    pub merge_mode: MergeMode,
}

impl SyncOptions {
    /// Creates options with a field list and merge mode.
    pub fn new(field_list: Vec<String>, merge_mode: MergeMode) -> Self {
        Self {
            field_list,
            merge_mode,
        }
    }

    /// Creates sync-down options with the given merge mode and no field
    /// list.
    pub fn merge(merge_mode: MergeMode) -> Self {
        Self {
            field_list: Vec::new(),
            merge_mode,
        }
    }

    /// Creates overwrite options, the default for sync-down.
    pub fn overwrite() -> Self {
        Self::merge(MergeMode::Overwrite)
    }

    /// Creates leave-if-changed options.
    pub fn leave_if_changed() -> Self {
        Self::merge(MergeMode::LeaveIfChanged)
    }

    /// Creates sync-up options pushing the given fields.
    pub fn fields(field_list: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            field_list: field_list.into_iter().map(Into::into).collect(),
            merge_mode: MergeMode::Overwrite,
        }
    }
}
