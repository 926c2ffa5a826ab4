//! REST record store.
//!
//! This module maps the [`RecordStore`] contract onto JSON REST calls. The
//! actual HTTP client is abstracted via a trait so any HTTP library (or an
//! in-process fake) can carry the requests.

use crate::config::RestConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use recflow_core::{RecordStore, StoreError, StoreResult};
use recflow_protocol::{
    AppId, Created, DeleteTarget, HttpMethod, Record, RecordId, RecordKey, RecordPage,
    RecordQuery, Revision, WriteRequest, RECORDS_API, RECORD_API,
};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// API path of the bulk endpoint.
pub const BULK_API: &str = "/bulkRequest";

/// Revision value telling the server to skip the revision check.
const ANY_REVISION: &str = "-1";

/// One HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// JSON body. Clients may send it as query parameters for `GET`.
    pub body: Value,
    /// Timeout the client should apply.
    pub timeout: Duration,
}

/// One HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// JSON body.
    pub body: Value,
}

impl HttpResponse {
    /// A `200` response.
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// An error response with the server's `{code, message}` body.
    pub fn error(status: u16, code: &str, message: &str) -> Self {
        Self {
            status,
            body: json!({"code": code, "message": message}),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. An `Err` means
/// no response was received at all (connection reset, timeout, ...).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// A record store reached over HTTP.
pub struct RestStore<C: HttpClient> {
    config: RestConfig,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> RestStore<C> {
    /// Creates a REST store.
    pub fn new(config: RestConfig, client: C) -> Self {
        Self {
            config,
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the message of the last failed call.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    async fn call(
        &self,
        method: HttpMethod,
        api: &str,
        body: Value,
        target: Target<'_>,
    ) -> StoreResult<Value> {
        let request = HttpRequest {
            method,
            url: self.config.url(api),
            body,
            timeout: self.config.timeout,
        };
        debug!("{} {}", request.method, request.url);

        let response = self.client.send(request).await.map_err(|e| {
            self.set_error(&e);
            StoreError::transport_retryable(e)
        })?;

        if response.is_success() {
            self.clear_error();
            return Ok(response.body);
        }

        let err = self.failure(response.status, &response.body, target);
        self.set_error(&err.to_string());
        warn!("{} {} failed: {}", method, api, err);
        Err(err)
    }

    fn failure(&self, status: u16, body: &Value, target: Target<'_>) -> StoreError {
        let (code, message) = error_body(body).unwrap_or_else(|| {
            (status.to_string(), format!("HTTP status {status}"))
        });

        if code == self.config.not_found_code {
            StoreError::NotFound {
                app: target.app.to_string(),
                id: target.id.to_string(),
            }
        } else if code == self.config.conflict_code {
            StoreError::conflict(message)
        } else {
            StoreError::rejected(code, message)
        }
    }
}

/// What a call was about, for error reporting.
#[derive(Clone, Copy)]
struct Target<'a> {
    app: &'a str,
    id: &'a str,
}

impl<'a> Target<'a> {
    fn new(app: &'a AppId, id: &'a str) -> Self {
        Self {
            app: app.as_str(),
            id,
        }
    }
}

/// Extracts `{code, message}` from an error body.
///
/// Bulk failures report per-request results; the first one with a code is
/// taken.
fn error_body(body: &Value) -> Option<(String, String)> {
    let read = |v: &Value| -> Option<(String, String)> {
        let code = v.get("code")?.as_str()?.to_string();
        let message = v
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some((code, message))
    };
    read(body).or_else(|| {
        body.get("results")?
            .as_array()?
            .iter()
            .find_map(|r| read(r))
    })
}

fn string_field(body: &Value, name: &str) -> StoreResult<String> {
    match body.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(StoreError::Codec(format!("response has no `{name}`"))),
    }
}

fn decode_record(value: &Value) -> StoreResult<Record> {
    serde_json::from_value(value.clone()).map_err(|e| StoreError::Codec(e.to_string()))
}

fn fields_json(record: &Record) -> StoreResult<Value> {
    serde_json::to_value(&record.fields).map_err(|e| StoreError::Codec(e.to_string()))
}

#[async_trait]
impl<C: HttpClient> RecordStore for RestStore<C> {
    async fn get_record_opt(&self, app: &AppId, id: &RecordId) -> StoreResult<Option<Record>> {
        let body = json!({"app": app, "id": id});
        match self
            .call(HttpMethod::Get, RECORD_API, body, Target::new(app, id.as_str()))
            .await
        {
            Ok(response) => {
                let record = response
                    .get("record")
                    .ok_or_else(|| StoreError::Codec("response has no `record`".into()))?;
                decode_record(record).map(Some)
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_records(&self, query: &RecordQuery) -> StoreResult<RecordPage> {
        let mut body = Map::new();
        body.insert("app".into(), json!(query.app));
        if let Some(fields) = &query.fields {
            body.insert("fields".into(), json!(fields));
        }
        if let Some(q) = &query.query {
            body.insert("query".into(), json!(q));
        }
        body.insert("totalCount".into(), json!(query.total_count));

        let response = self
            .call(HttpMethod::Get, RECORDS_API, Value::Object(body), Target::new(&query.app, ""))
            .await?;

        let records = response
            .get("records")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::Codec("response has no `records`".into()))?
            .iter()
            .map(decode_record)
            .collect::<StoreResult<Vec<_>>>()?;

        let mut page = RecordPage::new(records);
        match response.get("totalCount") {
            None | Some(Value::Null) => {}
            Some(Value::Number(n)) => page.total_count = n.as_u64(),
            Some(Value::String(s)) => {
                let total = s
                    .parse()
                    .map_err(|_| StoreError::Codec(format!("invalid totalCount `{s}`")))?;
                page.total_count = Some(total);
            }
            Some(other) => {
                return Err(StoreError::Codec(format!("invalid totalCount {other}")));
            }
        }
        Ok(page)
    }

    async fn add_record(&self, app: &AppId, record: &Record) -> StoreResult<Created> {
        let body = json!({"app": app, "record": fields_json(record)?});
        let response = self
            .call(HttpMethod::Post, RECORD_API, body, Target::new(app, ""))
            .await?;
        Ok(Created {
            id: RecordId::from(string_field(&response, "id")?),
            revision: Revision::from(string_field(&response, "revision")?),
        })
    }

    async fn update_record(
        &self,
        app: &AppId,
        record: &Record,
        key: &RecordKey,
        revision: Option<&Revision>,
    ) -> StoreResult<Revision> {
        let mut body = Map::new();
        body.insert("app".into(), json!(app));
        let target = match key {
            RecordKey::Id(id) => {
                body.insert("record".into(), fields_json(record)?);
                body.insert("id".into(), json!(id));
                id.to_string()
            }
            RecordKey::UpdateKey(k) => {
                body.insert("record".into(), fields_json(&record.without_field(&k.field))?);
                body.insert("updateKey".into(), json!({"field": k.field, "value": k.value}));
                format!("{}={}", k.field, k.value)
            }
        };
        if let Some(revision) = revision {
            body.insert("revision".into(), json!(revision));
        }

        let response = self
            .call(HttpMethod::Put, RECORD_API, Value::Object(body), Target::new(app, &target))
            .await?;
        Ok(Revision::from(string_field(&response, "revision")?))
    }

    async fn delete_records(&self, app: &AppId, targets: &[DeleteTarget]) -> StoreResult<()> {
        let ids: Vec<&RecordId> = targets.iter().map(|t| &t.id).collect();
        let mut body = Map::new();
        body.insert("app".into(), json!(app));
        body.insert("ids".into(), json!(ids));
        if targets.iter().any(|t| t.revision.is_some()) {
            let revisions: Vec<&str> = targets
                .iter()
                .map(|t| t.revision.as_ref().map_or(ANY_REVISION, Revision::as_str))
                .collect();
            body.insert("revisions".into(), json!(revisions));
        }

        let joined = ids
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.call(HttpMethod::Delete, RECORDS_API, Value::Object(body), Target::new(app, &joined))
            .await?;
        Ok(())
    }

    async fn bulk_request(&self, requests: &[WriteRequest]) -> StoreResult<()> {
        let encoded = requests
            .iter()
            .map(|r| r.encode_with_affixes(&self.config.api_prefix, &self.config.api_suffix))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Codec(e.to_string()))?;

        let app = requests.first().map(|r| r.app().as_str()).unwrap_or_default();
        let target = Target { app, id: "" };
        self.call(HttpMethod::Post, BULK_API, json!({"requests": encoded}), target)
            .await?;
        debug!("bulk request with {} writes accepted", requests.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use recflow_protocol::UpdateKey;
    use std::collections::VecDeque;

    /// Replays scripted responses and records every request.
    #[derive(Default)]
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedClient {
        fn respond(self, response: Result<HttpResponse, String>) -> Self {
            self.responses.lock().push_back(response);
            self
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::ok(json!({}))))
        }
    }

    fn store(client: ScriptedClient) -> RestStore<ScriptedClient> {
        RestStore::new(RestConfig::new("https://example.invalid"), client)
    }

    fn app() -> AppId {
        AppId::from("1")
    }

    #[tokio::test]
    async fn point_read_decodes_markers() {
        let client = ScriptedClient::default().respond(Ok(HttpResponse::ok(json!({
            "record": {"$id": "3", "$revision": "5", "title": "t"}
        }))));
        let store = store(client);

        let record = store
            .get_record_opt(&app(), &RecordId::from("3"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.id, Some(RecordId::from("3")));
        assert_eq!(record.revision, Some(Revision::from("5")));

        let sent = &store.client().requests()[0];
        assert_eq!(sent.method, HttpMethod::Get);
        assert_eq!(sent.url, "https://example.invalid/k/v1/record.json");
        assert_eq!(sent.body, json!({"app": "1", "id": "3"}));
    }

    #[tokio::test]
    async fn not_found_code_reads_as_none() {
        let client = ScriptedClient::default().respond(Ok(HttpResponse::error(
            404,
            "GAIA_RE01",
            "record not found",
        )));
        let store = store(client);

        let record = store
            .get_record_opt(&app(), &RecordId::from("9"))
            .await
            .unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn not_found_elsewhere_is_an_error() {
        let client = ScriptedClient::default().respond(Ok(HttpResponse::error(
            404,
            "GAIA_RE01",
            "record not found",
        )));
        let store = store(client);

        let err = store
            .update_record(&app(), &Record::new(), &RecordKey::Id(RecordId::from("9")), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::NotFound {
                app: "1".into(),
                id: "9".into()
            }
        );
    }

    #[tokio::test]
    async fn update_by_key_strips_key_field() {
        let client =
            ScriptedClient::default().respond(Ok(HttpResponse::ok(json!({"revision": 4}))));
        let store = store(client);

        let revision = store
            .update_record(
                &app(),
                &Record::new().with_field("code", "A").with_field("qty", 2),
                &RecordKey::UpdateKey(UpdateKey::new("code", "A")),
                Some(&Revision::from("3")),
            )
            .await
            .unwrap();
        assert_eq!(revision, Revision::from("4"));

        let sent = &store.client().requests()[0];
        assert_eq!(sent.method, HttpMethod::Put);
        assert_eq!(
            sent.body,
            json!({
                "app": "1",
                "record": {"qty": 2},
                "updateKey": {"field": "code", "value": "A"},
                "revision": "3",
            })
        );
    }

    #[tokio::test]
    async fn create_accepts_numeric_ids() {
        let client = ScriptedClient::default()
            .respond(Ok(HttpResponse::ok(json!({"id": 12, "revision": "1"}))));
        let store = store(client);

        let created = store
            .add_record(&app(), &Record::persisted("x", "y").with_field("a", 1))
            .await
            .unwrap();
        assert_eq!(created.id, RecordId::from("12"));

        // Markers never go on the wire.
        assert_eq!(
            store.client().requests()[0].body,
            json!({"app": "1", "record": {"a": 1}})
        );
    }

    #[tokio::test]
    async fn query_total_count_from_string() {
        let client = ScriptedClient::default().respond(Ok(HttpResponse::ok(json!({
            "records": [{"$id": "1", "$revision": "1", "a": "x"}],
            "totalCount": "17",
        }))));
        let store = store(client);

        let page = store
            .get_records(
                &RecordQuery::new("1")
                    .with_fields(["a"])
                    .with_query(r#"a = "x""#)
                    .with_total_count(),
            )
            .await
            .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.total_count, Some(17));

        let sent = &store.client().requests()[0];
        assert_eq!(sent.url, "https://example.invalid/k/v1/records.json");
        assert_eq!(sent.body["fields"], json!(["a"]));
        assert_eq!(sent.body["totalCount"], json!(true));
    }

    #[tokio::test]
    async fn delete_fills_missing_revisions() {
        let store = store(ScriptedClient::default());
        store
            .delete_records(
                &app(),
                &[
                    DeleteTarget::new("1").with_revision("4"),
                    DeleteTarget::new("2"),
                ],
            )
            .await
            .unwrap();

        let sent = &store.client().requests()[0];
        assert_eq!(sent.method, HttpMethod::Delete);
        assert_eq!(
            sent.body,
            json!({"app": "1", "ids": ["1", "2"], "revisions": ["4", "-1"]})
        );
    }

    #[tokio::test]
    async fn bulk_body_carries_prefixed_requests() {
        let store = store(ScriptedClient::default());
        let requests = vec![
            WriteRequest::create(app(), Record::new().with_field("a", 1)),
            WriteRequest::delete(app(), vec![(RecordId::from("2"), Revision::from("3"))]),
        ];
        store.bulk_request(&requests).await.unwrap();

        let sent = &store.client().requests()[0];
        assert_eq!(sent.method, HttpMethod::Post);
        assert_eq!(sent.url, "https://example.invalid/k/v1/bulkRequest.json");
        assert_eq!(
            sent.body,
            json!({"requests": [
                {
                    "method": "POST",
                    "api": "/k/v1/record.json",
                    "payload": {"app": "1", "record": {"a": 1}},
                },
                {
                    "method": "DELETE",
                    "api": "/k/v1/records.json",
                    "payload": {"app": "1", "ids": ["2"], "revisions": ["3"]},
                },
            ]})
        );
    }

    #[tokio::test]
    async fn bulk_conflict_from_per_request_results() {
        let client = ScriptedClient::default().respond(Ok(HttpResponse {
            status: 409,
            body: json!({"results": [{}, {"code": "GAIA_CO02", "message": "revision mismatch"}]}),
        }));
        let store = store(client);

        let err = store
            .bulk_request(&[WriteRequest::create(app(), Record::new())])
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(store.last_error().is_some());
    }

    #[tokio::test]
    async fn other_codes_are_rejections() {
        let client = ScriptedClient::default().respond(Ok(HttpResponse::error(
            400,
            "CB_VA01",
            "missing field",
        )));
        let store = store(client);

        let err = store
            .add_record(&app(), &Record::new())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::rejected("CB_VA01", "missing field"));
    }

    #[tokio::test]
    async fn client_failure_is_retryable_transport_error() {
        let client = ScriptedClient::default().respond(Err("connection reset".into()));
        let store = store(client);

        let err = store
            .get_records(&RecordQuery::new("1"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.last_error().as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn body_without_code_uses_status() {
        let client = ScriptedClient::default().respond(Ok(HttpResponse {
            status: 502,
            body: Value::Null,
        }));
        let store = store(client);

        let err = store
            .add_record(&app(), &Record::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { ref code, .. } if code == "502"));
    }
}
