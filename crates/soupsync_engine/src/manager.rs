//! The sync manager.
//!
//! One manager per authenticated identity orchestrates every sync against
//! that identity's local store: it creates and persists sync states, runs
//! the sync-down and sync-up algorithms, applies results under store
//! transactions, and reports progress through a caller-supplied callback.
//!
//! Failures inside a run are data, not control flow: the run ends with
//! the state marked Failed and the callback fired; [`SyncManager::run_sync`]
//! returns an error only for configuration bugs (unknown sync id, a syncs
//! soup that cannot be written).

use crate::config::SyncManagerConfig;
use crate::custom::{CustomSyncDownTarget, CustomTargetRegistry};
use crate::error::{SyncError, SyncResult};
use crate::fetch::TargetFetcher;
use crate::rest::RestClient;
use crate::store::{IndexSpec, LocalStore, QuerySpec};
use crate::up_target::{project_fields, PushOutcome, RestSyncUpTarget, SyncUpTarget};
use soupsync_model::record;
use soupsync_model::{MergeMode, SyncDownTarget, SyncOptions, SyncState, SyncStatus, SyncType};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress observer invoked synchronously on every status or progress
/// change. Must be cheap; it runs inside the sync loop.
pub type SyncCallback<'a> = &'a dyn Fn(&SyncState);

/// Orchestrates syncs for one identity.
pub struct SyncManager {
    store: Arc<dyn LocalStore>,
    rest: Arc<dyn RestClient>,
    config: SyncManagerConfig,
    custom_targets: CustomTargetRegistry,
    up_target: Box<dyn SyncUpTarget>,
}

impl SyncManager {
    /// Creates a manager with the default configuration and push path.
    ///
    /// Construction performs no I/O; the syncs soup is set up lazily when
    /// a sync is first created or run.
    pub fn new(store: Arc<dyn LocalStore>, rest: Arc<dyn RestClient>) -> Self {
        Self::with_config(store, rest, SyncManagerConfig::default())
    }

    /// Creates a manager with an explicit configuration.
    pub fn with_config(
        store: Arc<dyn LocalStore>,
        rest: Arc<dyn RestClient>,
        config: SyncManagerConfig,
    ) -> Self {
        let up_target = Box::new(RestSyncUpTarget::new(config.api_version.clone()));
        Self {
            store,
            rest,
            config,
            custom_targets: CustomTargetRegistry::new(),
            up_target,
        }
    }

    /// Replaces the push path.
    pub fn with_up_target(mut self, up_target: Box<dyn SyncUpTarget>) -> Self {
        self.up_target = up_target;
        self
    }

    /// Registers a factory for custom sync-down targets.
    pub fn register_custom_target<F>(&self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> SyncResult<Box<dyn CustomSyncDownTarget>> + Send + Sync + 'static,
    {
        self.custom_targets.register(tag, factory);
    }

    /// The store this manager syncs against.
    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    /// Creates and persists a sync-down state without running it.
    ///
    /// Custom targets are resolved here: an unregistered tag is a hard
    /// error at creation time, before any network activity.
    pub fn create_sync_down(
        &self,
        target: SyncDownTarget,
        soup_name: impl Into<String>,
        options: SyncOptions,
    ) -> SyncResult<SyncState> {
        self.setup_syncs_soup_if_needed()?;
        if let SyncDownTarget::Custom { tag, .. } = &target {
            if !self.custom_targets.contains(tag) {
                return Err(SyncError::UnknownCustomTarget(tag.clone()));
            }
        }
        let mut state = SyncState::sync_down(target, soup_name, options);
        self.save_sync_state(&mut state)?;
        info!(sync_id = state.id(), soup = state.soup_name(), "created sync-down");
        Ok(state)
    }

    /// Creates and persists a sync-up state without running it.
    pub fn create_sync_up(
        &self,
        options: SyncOptions,
        soup_name: impl Into<String>,
    ) -> SyncResult<SyncState> {
        self.setup_syncs_soup_if_needed()?;
        let mut state = SyncState::sync_up(soup_name, options);
        self.save_sync_state(&mut state)?;
        info!(sync_id = state.id(), soup = state.soup_name(), "created sync-up");
        Ok(state)
    }

    /// Creates and runs a sync-down with the default overwrite merge mode.
    pub fn sync_down(
        &self,
        target: SyncDownTarget,
        soup_name: impl Into<String>,
        callback: SyncCallback<'_>,
    ) -> SyncResult<SyncState> {
        self.sync_down_with_options(target, soup_name, SyncOptions::overwrite(), callback)
    }

    /// Creates and runs a sync-down with explicit options.
    pub fn sync_down_with_options(
        &self,
        target: SyncDownTarget,
        soup_name: impl Into<String>,
        options: SyncOptions,
        callback: SyncCallback<'_>,
    ) -> SyncResult<SyncState> {
        let state = self.create_sync_down(target, soup_name, options)?;
        self.run(state, callback)
    }

    /// Creates and runs a sync-up.
    pub fn sync_up(
        &self,
        options: SyncOptions,
        soup_name: impl Into<String>,
        callback: SyncCallback<'_>,
    ) -> SyncResult<SyncState> {
        let state = self.create_sync_up(options, soup_name)?;
        self.run(state, callback)
    }

    /// Re-runs an existing sync under its original id, target, and
    /// options. Down syncs pass the persisted high-water mark to the
    /// fetch so MRU-style targets only pull newer data.
    pub fn re_sync(&self, sync_id: i64, callback: SyncCallback<'_>) -> SyncResult<SyncState> {
        let state = self
            .load_sync_state(sync_id)?
            .ok_or(SyncError::UnknownSync(sync_id))?;
        if !state.status().can_start_run() {
            return Err(SyncError::AlreadyRunning(sync_id));
        }
        self.run(state, callback)
    }

    /// Runs a persisted sync by id.
    pub fn run_sync(&self, sync_id: i64, callback: SyncCallback<'_>) -> SyncResult<SyncState> {
        let state = self
            .load_sync_state(sync_id)?
            .ok_or(SyncError::UnknownSync(sync_id))?;
        self.run(state, callback)
    }

    /// Returns the persisted state of a sync, if it exists.
    pub fn get_sync_status(&self, sync_id: i64) -> SyncResult<Option<SyncState>> {
        self.load_sync_state(sync_id)
    }

    /// Removes a persisted sync state. Callers own the lifecycle; the
    /// engine never deletes one implicitly.
    pub fn delete_sync(&self, sync_id: i64) -> SyncResult<()> {
        self.setup_syncs_soup_if_needed()?;
        self.store.delete(&self.config.syncs_soup, &[sync_id])?;
        Ok(())
    }

    fn setup_syncs_soup_if_needed(&self) -> SyncResult<()> {
        if !self.store.has_soup(&self.config.syncs_soup) {
            self.store
                .register_soup(&self.config.syncs_soup, &[IndexSpec::string("type")])?;
        }
        Ok(())
    }

    fn save_sync_state(&self, state: &mut SyncState) -> SyncResult<()> {
        let mut json = state.to_json();
        if state.has_unassigned_id() {
            if let Some(map) = json.as_object_mut() {
                map.remove(record::SOUP_ENTRY_ID);
            }
        }
        let stored = self
            .store
            .upsert(&self.config.syncs_soup, json, record::SOUP_ENTRY_ID)?;
        if state.has_unassigned_id() {
            if let Some(id) = record::soup_entry_id(&stored) {
                state.assign_entry_id(id);
            }
        }
        Ok(())
    }

    fn load_sync_state(&self, sync_id: i64) -> SyncResult<Option<SyncState>> {
        self.setup_syncs_soup_if_needed()?;
        let spec = QuerySpec::exact(
            &self.config.syncs_soup,
            record::SOUP_ENTRY_ID,
            json!(sync_id),
            1,
        );
        match self.store.query(&spec, 0)?.into_iter().next() {
            Some(json) => Ok(Some(SyncState::from_json(&json)?)),
            None => Ok(None),
        }
    }

    /// Runs the state machine around one sync.
    fn run(&self, mut state: SyncState, callback: SyncCallback<'_>) -> SyncResult<SyncState> {
        state.start_run();
        self.save_sync_state(&mut state)?;
        callback(&state);
        info!(sync_id = state.id(), soup = state.soup_name(), "sync running");

        let outcome = match state.sync_type() {
            SyncType::Down => self.run_sync_down(&mut state, callback),
            SyncType::Up => self.run_sync_up(&mut state, callback),
        };

        match outcome {
            Ok(()) => {
                state.mark_done();
                info!(sync_id = state.id(), total = state.total_size(), "sync done");
            }
            Err(err) => {
                warn!(sync_id = state.id(), error = %err, "sync failed");
                state.mark_failed(err.to_string());
            }
        }
        self.save_sync_state(&mut state)?;
        callback(&state);
        debug_assert!(state.status() == SyncStatus::Done || state.status() == SyncStatus::Failed);
        Ok(state)
    }

    fn run_sync_down(&self, state: &mut SyncState, callback: SyncCallback<'_>) -> SyncResult<()> {
        let target = state
            .target()
            .cloned()
            .ok_or_else(|| SyncError::InvalidTarget("sync-down state has no target".into()))?;
        let soup = state.soup_name().to_string();
        let merge_mode = state.options().merge_mode;

        let (mut fetcher, first) = TargetFetcher::start(
            &target,
            &self.custom_targets,
            self.rest.as_ref(),
            &self.config.api_version,
            state.max_time_stamp(),
        )?;

        let total = first.total_size;
        state.set_total_size(total);
        self.save_sync_state(state)?;
        callback(state);

        let mut processed: i64 = 0;
        let mut max_time_stamp = state.max_time_stamp();
        let mut page = Some(first);
        while let Some(current) = page {
            self.apply_page(&soup, &current.records, merge_mode)?;
            processed += current.records.len() as i64;
            max_time_stamp = record::max_time_stamp(&current.records, max_time_stamp);
            debug!(soup = soup.as_str(), processed, total, "applied sync-down page");

            if total > 0 {
                // The page that reaches 100 is reported by the Done
                // transition instead.
                let progress = processed * 100 / total;
                if progress < 100 && progress > state.progress() {
                    state.update_progress(progress);
                    self.save_sync_state(state)?;
                    callback(state);
                }
            }
            page = fetcher.continue_fetch()?;
        }

        state.set_max_time_stamp(max_time_stamp);
        Ok(())
    }

    /// Applies one page of server records under a single transaction.
    fn apply_page(&self, soup: &str, records: &[Value], merge_mode: MergeMode) -> SyncResult<()> {
        self.store.begin_transaction();
        let result = (|| {
            for incoming in records {
                let mut record_to_store = incoming.clone();
                record::stamp_clean(&mut record_to_store);

                if !merge_mode.overwrites_dirty() {
                    if let Some(id) = record::server_id(&record_to_store) {
                        let existing = self
                            .store
                            .query(&QuerySpec::exact(soup, record::ID, json!(id), 1), 0)?;
                        if existing.first().map(record::is_dirty).unwrap_or(false) {
                            debug!(id, "leaving locally-changed record untouched");
                            continue;
                        }
                    }
                }
                self.store.upsert(soup, record_to_store, record::ID)?;
            }
            Ok(())
        })();
        self.store.commit_transaction();
        result
    }

    fn run_sync_up(&self, state: &mut SyncState, callback: SyncCallback<'_>) -> SyncResult<()> {
        let soup = state.soup_name().to_string();
        let field_list = state.options().field_list.clone();

        let entry_ids = self.up_target.ids_of_records_to_sync_up(
            self.store.as_ref(),
            &soup,
            self.config.sync_up_page_size,
        )?;
        let total = entry_ids.len() as i64;
        state.set_total_size(total);
        self.save_sync_state(state)?;
        callback(state);

        // One transaction spans the whole batch and commits even when
        // individual records fail to push.
        self.store.begin_transaction();
        let mut batch_result = Ok(());
        for (index, &entry_id) in entry_ids.iter().enumerate() {
            match self.push_entry(&soup, entry_id, &field_list) {
                Ok(()) => {}
                Err(err @ SyncError::Store(_)) => {
                    batch_result = Err(err);
                    break;
                }
                Err(err) => {
                    // Record-scoped failure: flags stay set, the record
                    // is a candidate for the next sync-up.
                    warn!(entry_id, error = %err, "record push failed");
                }
            }

            let progress = (index as i64 + 1) * 100 / total;
            if progress < 100 {
                state.update_progress(progress);
                if let Err(err) = self.save_sync_state(state) {
                    batch_result = Err(err);
                    break;
                }
                callback(state);
            }
        }
        self.store.commit_transaction();
        batch_result
    }

    fn push_entry(&self, soup: &str, entry_id: i64, field_list: &[String]) -> SyncResult<()> {
        let spec = QuerySpec::exact(soup, record::SOUP_ENTRY_ID, json!(entry_id), 1);
        let Some(dirty_record) = self.store.query(&spec, 0)?.into_iter().next() else {
            // Row vanished between discovery and push.
            return Ok(());
        };

        if record::is_locally_deleted(&dirty_record) {
            self.push_delete(soup, entry_id, &dirty_record)
        } else if record::is_locally_created(&dirty_record) {
            self.push_create(soup, entry_id, dirty_record, field_list)
        } else if record::is_locally_updated(&dirty_record) {
            self.push_update(soup, entry_id, dirty_record, field_list)
        } else {
            debug!(entry_id, "record not actually dirty, skipping");
            Ok(())
        }
    }

    fn push_create(
        &self,
        soup: &str,
        entry_id: i64,
        mut dirty_record: Value,
        field_list: &[String],
    ) -> SyncResult<()> {
        let object_type = record::object_type(&dirty_record)
            .ok_or_else(|| SyncError::UnpushableRecord("missing attributes.type".into()))?
            .to_string();
        let fields = project_fields(&dirty_record, field_list);

        match self
            .up_target
            .create_on_server(self.rest.as_ref(), &object_type, &fields)?
        {
            PushOutcome::Created(new_id) => {
                if let Some(map) = dirty_record.as_object_mut() {
                    map.insert(record::ID.into(), json!(new_id));
                }
                record::stamp_clean(&mut dirty_record);
                self.store.update(soup, dirty_record, entry_id)?;
                Ok(())
            }
            PushOutcome::Failed { status, message } => Err(SyncError::transport(status, message)),
            PushOutcome::Done | PushOutcome::NotFound => {
                Err(SyncError::malformed("create returned no id"))
            }
        }
    }

    fn push_update(
        &self,
        soup: &str,
        entry_id: i64,
        mut dirty_record: Value,
        field_list: &[String],
    ) -> SyncResult<()> {
        let object_type = record::object_type(&dirty_record)
            .ok_or_else(|| SyncError::UnpushableRecord("missing attributes.type".into()))?
            .to_string();
        let id = record::server_id(&dirty_record)
            .ok_or_else(|| SyncError::UnpushableRecord("missing record id".into()))?
            .to_string();
        let fields = project_fields(&dirty_record, field_list);

        match self
            .up_target
            .update_on_server(self.rest.as_ref(), &object_type, &id, &fields)?
        {
            PushOutcome::Done => {
                record::stamp_clean(&mut dirty_record);
                self.store.update(soup, dirty_record, entry_id)?;
                Ok(())
            }
            PushOutcome::NotFound => {
                // The record is gone remotely; reconcile by dropping the
                // local row rather than failing.
                self.store.delete(soup, &[entry_id])?;
                Ok(())
            }
            PushOutcome::Failed { status, message } => Err(SyncError::transport(status, message)),
            PushOutcome::Created(_) => Err(SyncError::malformed("unexpected create outcome")),
        }
    }

    fn push_delete(&self, soup: &str, entry_id: i64, dirty_record: &Value) -> SyncResult<()> {
        let Some(id) = record::server_id(dirty_record).map(str::to_string) else {
            // Never reached the server; the local row is all there is.
            self.store.delete(soup, &[entry_id])?;
            return Ok(());
        };
        let object_type = record::object_type(dirty_record)
            .ok_or_else(|| SyncError::UnpushableRecord("missing attributes.type".into()))?
            .to_string();

        match self
            .up_target
            .delete_on_server(self.rest.as_ref(), &object_type, &id)?
        {
            PushOutcome::Done | PushOutcome::NotFound => {
                self.store.delete(soup, &[entry_id])?;
                Ok(())
            }
            PushOutcome::Failed { status, message } => Err(SyncError::transport(status, message)),
            PushOutcome::Created(_) => Err(SyncError::malformed("unexpected create outcome")),
        }
    }
}
