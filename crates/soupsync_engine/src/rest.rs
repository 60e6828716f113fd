//! REST transport contract.
//!
//! The engine builds plain method + path + JSON-body requests and hands
//! them to a [`RestClient`]. Authentication and token refresh live behind
//! the client implementation and are invisible here.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;

/// HTTP method of a [`RestRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestMethod {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PATCH.
    Patch,
    /// DELETE.
    Delete,
}

/// A request the engine asks the transport to send.
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    /// HTTP method.
    pub method: RestMethod,
    /// Request path, including any query string.
    pub path: String,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl RestRequest {
    /// A structured-query request.
    pub fn query(api_version: &str, soql: &str) -> Self {
        Self {
            method: RestMethod::Get,
            path: format!(
                "/services/data/{}/query?q={}",
                api_version,
                urlencoding::encode(soql)
            ),
            body: None,
        }
    }

    /// A full-text-search request.
    pub fn search(api_version: &str, sosl: &str) -> Self {
        Self {
            method: RestMethod::Get,
            path: format!(
                "/services/data/{}/search?q={}",
                api_version,
                urlencoding::encode(sosl)
            ),
            body: None,
        }
    }

    /// An object-metadata request (carries the recently-used record list).
    pub fn object_metadata(api_version: &str, object_type: &str) -> Self {
        Self {
            method: RestMethod::Get,
            path: format!("/services/data/{api_version}/sobjects/{object_type}"),
            body: None,
        }
    }

    /// A create-record request.
    pub fn create(api_version: &str, object_type: &str, fields: Map<String, Value>) -> Self {
        Self {
            method: RestMethod::Post,
            path: format!("/services/data/{api_version}/sobjects/{object_type}"),
            body: Some(Value::Object(fields)),
        }
    }

    /// An update-record request. The id is path-addressed, never part of
    /// the body.
    pub fn update(
        api_version: &str,
        object_type: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            method: RestMethod::Patch,
            path: format!("/services/data/{api_version}/sobjects/{object_type}/{id}"),
            body: Some(Value::Object(fields)),
        }
    }

    /// A delete-record request.
    pub fn delete(api_version: &str, object_type: &str, id: &str) -> Self {
        Self {
            method: RestMethod::Delete,
            path: format!("/services/data/{api_version}/sobjects/{object_type}/{id}"),
            body: None,
        }
    }

    /// A raw GET against a server-supplied path (pagination continuation).
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: RestMethod::Get,
            path: path.into(),
            body: None,
        }
    }
}

/// A response from the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body; `Value::Null` when the server sent none.
    pub body: Value,
}

impl RestResponse {
    /// Creates a 200 response.
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// Creates a response with an arbitrary status.
    pub fn with_status(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Creates a bodyless 404.
    pub fn not_found() -> Self {
        Self {
            status: 404,
            body: Value::Null,
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Converts a non-success response into a typed transport error.
    pub fn into_error(self) -> SyncError {
        SyncError::transport(self.status, self.body.to_string())
    }
}

/// The transport the engine drives.
///
/// Implementations own connection handling, authentication, and
/// retry-on-401; a failed call surfaces as an `Err` and fails the current
/// fetch or push step.
pub trait RestClient: Send + Sync {
    /// Sends one request and returns the server's response.
    fn send(&self, request: &RestRequest) -> SyncResult<RestResponse>;
}

/// A scripted client for tests.
///
/// Responses are consumed in FIFO order, one per [`RestClient::send`];
/// every sent request is recorded for assertions.
#[derive(Debug, Default)]
pub struct MockRestClient {
    responses: Mutex<VecDeque<RestResponse>>,
    sent: Mutex<Vec<RestRequest>>,
}

impl MockRestClient {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next response.
    pub fn enqueue(&self, response: RestResponse) {
        self.responses.lock().push_back(response);
    }

    /// Returns every request sent so far.
    pub fn sent(&self) -> Vec<RestRequest> {
        self.sent.lock().clone()
    }

    /// Returns how many requests were sent.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl RestClient for MockRestClient {
    fn send(&self, request: &RestRequest) -> SyncResult<RestResponse> {
        self.sent.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| SyncError::Network("no mock response queued".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_request_is_url_encoded() {
        let request = RestRequest::query("v60.0", "SELECT Id FROM Account");
        assert_eq!(request.method, RestMethod::Get);
        assert_eq!(
            request.path,
            "/services/data/v60.0/query?q=SELECT%20Id%20FROM%20Account"
        );
        assert!(request.body.is_none());
    }

    #[test]
    fn update_request_is_path_addressed() {
        let mut fields = Map::new();
        fields.insert("Name".into(), json!("Acme"));
        let request = RestRequest::update("v60.0", "Account", "001", fields);

        assert_eq!(request.method, RestMethod::Patch);
        assert_eq!(request.path, "/services/data/v60.0/sobjects/Account/001");
        assert_eq!(request.body, Some(json!({"Name": "Acme"})));
    }

    #[test]
    fn response_predicates() {
        assert!(RestResponse::ok(Value::Null).is_success());
        assert!(RestResponse::with_status(204, Value::Null).is_success());
        assert!(RestResponse::not_found().is_not_found());
        assert!(!RestResponse::not_found().is_success());
    }

    #[test]
    fn mock_replays_in_order_and_records() {
        let mock = MockRestClient::new();
        mock.enqueue(RestResponse::ok(json!({"n": 1})));
        mock.enqueue(RestResponse::ok(json!({"n": 2})));

        let first = mock.send(&RestRequest::get("/a")).unwrap();
        let second = mock.send(&RestRequest::get("/b")).unwrap();
        assert_eq!(first.body["n"], 1);
        assert_eq!(second.body["n"], 2);

        let sent = mock.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].path, "/a");

        let err = mock.send(&RestRequest::get("/c")).unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
    }
}
