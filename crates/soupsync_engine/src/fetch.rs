//! Sync-down fetch driver.
//!
//! Turns a [`SyncDownTarget`] descriptor into a sequence of record pages:
//! `start` fetches the first page, `continue_fetch` follows server
//! pagination until the target is exhausted. MRU and SOSL targets are
//! single bounded round-trips; SOQL targets follow the server's
//! continuation URL.

use crate::custom::{CustomSyncDownTarget, CustomTargetRegistry};
use crate::error::{SyncError, SyncResult};
use crate::rest::{RestClient, RestRequest};
use soupsync_model::record;
use soupsync_model::{SoqlBuilder, SyncDownTarget};
use serde_json::Value;
use tracing::debug;

/// One page of raw server records.
#[derive(Debug, Clone)]
pub struct FetchPage {
    /// Records in server order.
    pub records: Vec<Value>,
    /// Server-reported total for the whole fetch. Only the first page's
    /// value is meaningful.
    pub total_size: i64,
}

impl FetchPage {
    /// Creates a page.
    pub fn new(records: Vec<Value>, total_size: i64) -> Self {
        Self {
            records,
            total_size,
        }
    }
}

enum FetchState {
    /// SOQL pagination; holds the continuation URL while the server
    /// reports more rows.
    Soql { next_records_url: Option<String> },
    /// MRU and SOSL: everything arrived in the first page.
    Single,
    /// Runtime-registered target owning its continuation state.
    Custom(Box<dyn CustomSyncDownTarget>),
}

impl std::fmt::Debug for FetchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchState::Soql { next_records_url } => f
                .debug_struct("Soql")
                .field("next_records_url", next_records_url)
                .finish(),
            FetchState::Single => f.write_str("Single"),
            FetchState::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Drives one sync-down's fetches against the REST client.
pub(crate) struct TargetFetcher<'a> {
    rest: &'a dyn RestClient,
    state: FetchState,
}

impl std::fmt::Debug for TargetFetcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetFetcher")
            .field("state", &self.state)
            .finish()
    }
}

impl<'a> TargetFetcher<'a> {
    /// Resolves the target and fetches the first page.
    pub fn start(
        target: &SyncDownTarget,
        custom_targets: &CustomTargetRegistry,
        rest: &'a dyn RestClient,
        api_version: &str,
        max_time_stamp: i64,
    ) -> SyncResult<(Self, FetchPage)> {
        match target {
            SyncDownTarget::Soql { query } => {
                let body = send_ok(rest, &RestRequest::query(api_version, query))?;
                let page = soql_page(&body)?;
                let next_records_url = next_records_url(&body);
                debug!(
                    total = page.total_size,
                    has_more = next_records_url.is_some(),
                    "started soql fetch"
                );
                Ok((
                    Self {
                        rest,
                        state: FetchState::Soql { next_records_url },
                    },
                    page,
                ))
            }
            SyncDownTarget::Sosl { query } => {
                let body = send_ok(rest, &RestRequest::search(api_version, query))?;
                let records = search_records(&body)?;
                let total_size = records.len() as i64;
                let page = FetchPage::new(records, total_size);
                Ok((
                    Self {
                        rest,
                        state: FetchState::Single,
                    },
                    page,
                ))
            }
            SyncDownTarget::Mru {
                object_type,
                field_list,
            } => {
                let page = mru_page(rest, api_version, object_type, field_list, max_time_stamp)?;
                Ok((
                    Self {
                        rest,
                        state: FetchState::Single,
                    },
                    page,
                ))
            }
            SyncDownTarget::Custom { tag, params } => {
                let mut custom = custom_targets.resolve(tag, params)?;
                let page = custom.start_fetch(rest, max_time_stamp)?;
                Ok((
                    Self {
                        rest,
                        state: FetchState::Custom(custom),
                    },
                    page,
                ))
            }
        }
    }

    /// Fetches the next page, or `None` when the target is exhausted.
    pub fn continue_fetch(&mut self) -> SyncResult<Option<FetchPage>> {
        match &mut self.state {
            FetchState::Single => Ok(None),
            FetchState::Custom(custom) => custom.continue_fetch(self.rest),
            FetchState::Soql { next_records_url } => {
                let Some(url) = next_records_url.take() else {
                    return Ok(None);
                };
                let body = send_ok(self.rest, &RestRequest::get(url))?;
                let page = soql_page(&body)?;
                *next_records_url = crate::fetch::next_records_url(&body);
                debug!(
                    records = page.records.len(),
                    has_more = next_records_url.is_some(),
                    "continued soql fetch"
                );
                Ok(Some(page))
            }
        }
    }
}

fn send_ok(rest: &dyn RestClient, request: &RestRequest) -> SyncResult<Value> {
    let response = rest.send(request)?;
    if !response.is_success() {
        return Err(response.into_error());
    }
    Ok(response.body)
}

fn soql_page(body: &Value) -> SyncResult<FetchPage> {
    let records = body
        .get("records")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| SyncError::malformed("query response without records"))?;
    let total_size = body
        .get("totalSize")
        .and_then(Value::as_i64)
        .unwrap_or(records.len() as i64);
    Ok(FetchPage::new(records, total_size))
}

fn next_records_url(body: &Value) -> Option<String> {
    body.get("nextRecordsUrl")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn search_records(body: &Value) -> SyncResult<Vec<Value>> {
    // Search responses are either a bare array or wrapped in
    // searchRecords, depending on API version.
    if let Some(records) = body.as_array() {
        return Ok(records.clone());
    }
    body.get("searchRecords")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| SyncError::malformed("search response without records"))
}

fn mru_page(
    rest: &dyn RestClient,
    api_version: &str,
    object_type: &str,
    field_list: &[String],
    max_time_stamp: i64,
) -> SyncResult<FetchPage> {
    let metadata = send_ok(rest, &RestRequest::object_metadata(api_version, object_type))?;
    let ids: Vec<String> = metadata
        .get("recentItems")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(record::ID))
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if ids.is_empty() {
        debug!(object_type, "no recently-used records");
        return Ok(FetchPage::new(vec![], 0));
    }

    let quoted: Vec<String> = ids.iter().map(|id| format!("'{id}'")).collect();
    let mut predicate = format!("{} IN ({})", record::ID, quoted.join(", "));
    if max_time_stamp > 0 {
        predicate.push_str(&format!(
            " AND {} > {}",
            record::LAST_MODIFIED_DATE,
            record::format_server_timestamp(max_time_stamp)
        ));
    }

    let query = SoqlBuilder::select(field_list.iter().cloned())
        .from(object_type)
        .r#where(predicate)
        .build();
    let body = send_ok(rest, &RestRequest::query(api_version, &query))?;
    let page = soql_page(&body)?;
    // Everything arrives in one bounded round-trip, so the page length is
    // the total.
    let total_size = page.records.len() as i64;
    Ok(FetchPage::new(page.records, total_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::{MockRestClient, RestResponse};
    use serde_json::json;

    fn start<'r>(
        target: &SyncDownTarget,
        rest: &'r MockRestClient,
        max_time_stamp: i64,
    ) -> SyncResult<(TargetFetcher<'r>, FetchPage)> {
        TargetFetcher::start(
            target,
            &CustomTargetRegistry::new(),
            rest,
            "v60.0",
            max_time_stamp,
        )
    }

    #[test]
    fn soql_follows_continuation() {
        let rest = MockRestClient::new();
        rest.enqueue(RestResponse::ok(json!({
            "totalSize": 3,
            "done": false,
            "nextRecordsUrl": "/services/data/v60.0/query/01g-2000",
            "records": [{"Id": "001"}, {"Id": "002"}],
        })));
        rest.enqueue(RestResponse::ok(json!({
            "totalSize": 3,
            "done": true,
            "records": [{"Id": "003"}],
        })));

        let target = SyncDownTarget::soql("SELECT Id FROM Account");
        let (mut fetcher, first) = start(&target, &rest, -1).unwrap();
        assert_eq!(first.total_size, 3);
        assert_eq!(first.records.len(), 2);

        let second = fetcher.continue_fetch().unwrap().unwrap();
        assert_eq!(second.records.len(), 1);
        assert!(fetcher.continue_fetch().unwrap().is_none());

        let sent = rest.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].path, "/services/data/v60.0/query/01g-2000");
    }

    #[test]
    fn sosl_is_single_page() {
        let rest = MockRestClient::new();
        rest.enqueue(RestResponse::ok(json!([{"Id": "001"}, {"Id": "002"}])));

        let target = SyncDownTarget::sosl("FIND {Acme}");
        let (mut fetcher, first) = start(&target, &rest, -1).unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.total_size, 2);
        assert!(fetcher.continue_fetch().unwrap().is_none());
    }

    #[test]
    fn sosl_wrapped_records() {
        let rest = MockRestClient::new();
        rest.enqueue(RestResponse::ok(json!({"searchRecords": [{"Id": "001"}]})));

        let target = SyncDownTarget::sosl("FIND {Acme}");
        let (_fetcher, first) = start(&target, &rest, -1).unwrap();
        assert_eq!(first.records.len(), 1);
    }

    #[test]
    fn mru_builds_id_restricted_query() {
        let rest = MockRestClient::new();
        rest.enqueue(RestResponse::ok(json!({
            "recentItems": [{"Id": "001"}, {"Id": "002"}],
        })));
        rest.enqueue(RestResponse::ok(json!({
            "totalSize": 2,
            "done": true,
            "records": [{"Id": "001"}, {"Id": "002"}],
        })));

        let target = SyncDownTarget::mru("Account", ["Id", "Name"]);
        let (_fetcher, first) = start(&target, &rest, -1).unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.total_size, 2);

        let sent = rest.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].path.contains("/sobjects/Account"));
        let query_path = urlencoding::decode(&sent[1].path).unwrap().into_owned();
        assert!(query_path.contains("Id IN ('001', '002')"));
        assert!(!query_path.contains("LastModifiedDate"));
    }

    #[test]
    fn mru_bounds_incremental_fetch_by_high_water_mark() {
        let rest = MockRestClient::new();
        rest.enqueue(RestResponse::ok(json!({
            "recentItems": [{"Id": "001"}],
        })));
        rest.enqueue(RestResponse::ok(json!({
            "totalSize": 0,
            "done": true,
            "records": [],
        })));

        let millis = record::parse_server_timestamp("2024-03-01T10:00:00.000Z").unwrap();
        let target = SyncDownTarget::mru("Account", ["Id"]);
        start(&target, &rest, millis).unwrap();

        let query_path = urlencoding::decode(&rest.sent()[1].path).unwrap().into_owned();
        assert!(query_path.contains("AND LastModifiedDate > 2024-03-01T10:00:00.000Z"));
    }

    #[test]
    fn mru_with_no_recent_items_skips_the_query() {
        let rest = MockRestClient::new();
        rest.enqueue(RestResponse::ok(json!({"recentItems": []})));

        let target = SyncDownTarget::mru("Account", ["Id"]);
        let (_fetcher, first) = start(&target, &rest, -1).unwrap();
        assert!(first.records.is_empty());
        assert_eq!(rest.sent_count(), 1);
    }

    #[test]
    fn non_success_fails_the_fetch() {
        let rest = MockRestClient::new();
        rest.enqueue(RestResponse::with_status(500, json!({"message": "boom"})));

        let target = SyncDownTarget::soql("SELECT Id FROM Account");
        let err = start(&target, &rest, -1).unwrap_err();
        assert!(matches!(err, SyncError::Transport { status: 500, .. }));
    }

    #[test]
    fn malformed_query_body_is_typed() {
        let rest = MockRestClient::new();
        rest.enqueue(RestResponse::ok(json!({"unexpected": true})));

        let target = SyncDownTarget::soql("SELECT Id FROM Account");
        let err = start(&target, &rest, -1).unwrap_err();
        assert!(matches!(err, SyncError::MalformedResponse(_)));
    }
}
