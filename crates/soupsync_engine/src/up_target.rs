//! Sync-up push protocol.
//!
//! A [`SyncUpTarget`] knows how to push one local record to the server
//! (create, update, delete) and how to discover which local records are
//! dirty. [`RestSyncUpTarget`] is the default; the trait is the extension
//! seam for servers with different write surfaces.

use crate::error::{SyncError, SyncResult};
use crate::rest::{RestClient, RestRequest};
use crate::store::{LocalStore, QuerySpec};
use soupsync_model::record;
use serde_json::{json, Map, Value};

/// Result of pushing one record.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// The server accepted the operation.
    Done,
    /// The server accepted a create and returned the record's real id.
    Created(String),
    /// The server no longer knows the record (404 on update/delete).
    NotFound,
    /// The server rejected the operation; the record stays dirty.
    Failed {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },
}

/// How dirty records reach the server.
pub trait SyncUpTarget: Send + Sync {
    /// Creates a record on the server, returning its assigned id.
    fn create_on_server(
        &self,
        rest: &dyn RestClient,
        object_type: &str,
        fields: &Map<String, Value>,
    ) -> SyncResult<PushOutcome>;

    /// Updates a record on the server.
    fn update_on_server(
        &self,
        rest: &dyn RestClient,
        object_type: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> SyncResult<PushOutcome>;

    /// Deletes a record on the server.
    fn delete_on_server(
        &self,
        rest: &dyn RestClient,
        object_type: &str,
        id: &str,
    ) -> SyncResult<PushOutcome>;

    /// Returns the soup entry ids of records with unsynced local edits,
    /// bounded by `page_size`, in store order.
    fn ids_of_records_to_sync_up(
        &self,
        store: &dyn LocalStore,
        soup_name: &str,
        page_size: u32,
    ) -> SyncResult<Vec<i64>>;
}

/// The default push path: one REST call per record.
#[derive(Debug, Clone)]
pub struct RestSyncUpTarget {
    api_version: String,
}

impl RestSyncUpTarget {
    /// Creates a target for the given API version.
    pub fn new(api_version: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
        }
    }
}

impl SyncUpTarget for RestSyncUpTarget {
    fn create_on_server(
        &self,
        rest: &dyn RestClient,
        object_type: &str,
        fields: &Map<String, Value>,
    ) -> SyncResult<PushOutcome> {
        let request = RestRequest::create(&self.api_version, object_type, fields.clone());
        let response = rest.send(&request)?;
        if !response.is_success() {
            return Ok(PushOutcome::Failed {
                status: response.status,
                message: response.body.to_string(),
            });
        }
        let id = response
            .body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::malformed("create response without id"))?;
        Ok(PushOutcome::Created(id.to_string()))
    }

    fn update_on_server(
        &self,
        rest: &dyn RestClient,
        object_type: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> SyncResult<PushOutcome> {
        let request = RestRequest::update(&self.api_version, object_type, id, fields.clone());
        let response = rest.send(&request)?;
        if response.is_success() {
            Ok(PushOutcome::Done)
        } else if response.is_not_found() {
            Ok(PushOutcome::NotFound)
        } else {
            Ok(PushOutcome::Failed {
                status: response.status,
                message: response.body.to_string(),
            })
        }
    }

    fn delete_on_server(
        &self,
        rest: &dyn RestClient,
        object_type: &str,
        id: &str,
    ) -> SyncResult<PushOutcome> {
        let request = RestRequest::delete(&self.api_version, object_type, id);
        let response = rest.send(&request)?;
        if response.is_success() {
            Ok(PushOutcome::Done)
        } else if response.is_not_found() {
            Ok(PushOutcome::NotFound)
        } else {
            Ok(PushOutcome::Failed {
                status: response.status,
                message: response.body.to_string(),
            })
        }
    }

    fn ids_of_records_to_sync_up(
        &self,
        store: &dyn LocalStore,
        soup_name: &str,
        page_size: u32,
    ) -> SyncResult<Vec<i64>> {
        let spec = QuerySpec::exact(soup_name, record::LOCAL, json!(true), page_size);
        let records = store.query(&spec, 0)?;
        Ok(records
            .iter()
            .filter_map(record::soup_entry_id)
            .collect())
    }
}

/// Projects the fields eligible for push out of a record.
///
/// Only fields named in `field_list` and present on the record are sent;
/// the primary id is always excluded because requests address it in the
/// path.
pub fn project_fields(record: &Value, field_list: &[String]) -> Map<String, Value> {
    let mut fields = Map::new();
    for name in field_list {
        if name == record::ID {
            continue;
        }
        if let Some(value) = record.get(name) {
            fields.insert(name.clone(), value.clone());
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::{MockRestClient, RestResponse};
    use crate::store::{IndexSpec, MemoryLocalStore};

    #[test]
    fn create_returns_assigned_id() {
        let rest = MockRestClient::new();
        rest.enqueue(RestResponse::with_status(
            201,
            json!({"id": "001X", "success": true}),
        ));

        let target = RestSyncUpTarget::new("v60.0");
        let outcome = target
            .create_on_server(&rest, "Account", &Map::new())
            .unwrap();
        assert_eq!(outcome, PushOutcome::Created("001X".into()));
    }

    #[test]
    fn update_discriminates_404() {
        let rest = MockRestClient::new();
        rest.enqueue(RestResponse::with_status(204, Value::Null));
        rest.enqueue(RestResponse::not_found());
        rest.enqueue(RestResponse::with_status(500, json!({"message": "boom"})));

        let target = RestSyncUpTarget::new("v60.0");
        let fields = Map::new();
        assert_eq!(
            target
                .update_on_server(&rest, "Account", "001", &fields)
                .unwrap(),
            PushOutcome::Done
        );
        assert_eq!(
            target
                .update_on_server(&rest, "Account", "001", &fields)
                .unwrap(),
            PushOutcome::NotFound
        );
        assert!(matches!(
            target
                .update_on_server(&rest, "Account", "001", &fields)
                .unwrap(),
            PushOutcome::Failed { status: 500, .. }
        ));
    }

    #[test]
    fn dirty_discovery_uses_local_flag() {
        let store = MemoryLocalStore::new();
        store
            .register_soup("accounts", &[IndexSpec::string("Id")])
            .unwrap();
        store
            .upsert("accounts", json!({"Id": "001", "__local__": true}), "Id")
            .unwrap();
        store
            .upsert("accounts", json!({"Id": "002", "__local__": false}), "Id")
            .unwrap();
        store
            .upsert("accounts", json!({"Id": "003", "__local__": true}), "Id")
            .unwrap();

        let target = RestSyncUpTarget::new("v60.0");
        let ids = target
            .ids_of_records_to_sync_up(&store, "accounts", 2000)
            .unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn projection_excludes_id_and_unknown_fields() {
        let record = json!({
            "Id": "001",
            "Name": "Acme",
            "Phone": "555",
            "__local__": true,
        });
        let fields = project_fields(
            &record,
            &["Id".into(), "Name".into(), "Website".into()],
        );

        assert_eq!(fields.len(), 1);
        assert_eq!(fields["Name"], "Acme");
    }
}
