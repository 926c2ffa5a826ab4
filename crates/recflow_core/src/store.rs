//! Backing-store abstraction.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use recflow_protocol::{
    AppId, Created, DeleteTarget, Record, RecordId, RecordKey, RecordPage, RecordQuery, Revision,
    WriteRequest,
};
use std::collections::VecDeque;

/// A backing store holding records with revisions.
///
/// This trait abstracts the store client, allowing different implementations
/// (REST, in-memory, mock for testing, etc.). Interpreters only talk to the
/// store through it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Reads one record. An unknown id yields `Ok(None)`.
    async fn get_record_opt(&self, app: &AppId, id: &RecordId) -> StoreResult<Option<Record>>;

    /// Reads the records matching a query.
    async fn get_records(&self, query: &RecordQuery) -> StoreResult<RecordPage>;

    /// Adds a record, returning its assigned id and revision.
    async fn add_record(&self, app: &AppId, record: &Record) -> StoreResult<Created>;

    /// Updates a record, returning its new revision.
    ///
    /// When `revision` is given the store rejects the update if the record's
    /// current revision differs.
    async fn update_record(
        &self,
        app: &AppId,
        record: &Record,
        key: &RecordKey,
        revision: Option<&Revision>,
    ) -> StoreResult<Revision>;

    /// Deletes records; each target's revision, if given, must match.
    async fn delete_records(&self, app: &AppId, targets: &[DeleteTarget]) -> StoreResult<()>;

    /// Applies all requests atomically, or none of them.
    async fn bulk_request(&self, requests: &[WriteRequest]) -> StoreResult<()>;
}

/// Point read with the store's not-found translated to `None`.
pub(crate) async fn fetch_record<S: RecordStore + ?Sized>(
    store: &S,
    app: &AppId,
    id: &RecordId,
) -> StoreResult<Option<Record>> {
    match store.get_record_opt(app, id).await {
        Err(e) if e.is_not_found() => Ok(None),
        other => other,
    }
}

/// A call observed by [`MockStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    /// Point read.
    GetRecord {
        /// App.
        app: AppId,
        /// Record id.
        id: RecordId,
    },
    /// Query read.
    GetRecords(RecordQuery),
    /// Create.
    AddRecord {
        /// App.
        app: AppId,
        /// Record.
        record: Record,
    },
    /// Update.
    UpdateRecord {
        /// App.
        app: AppId,
        /// Record.
        record: Record,
        /// Target.
        key: RecordKey,
        /// Precondition.
        revision: Option<Revision>,
    },
    /// Delete.
    DeleteRecords {
        /// App.
        app: AppId,
        /// Targets.
        targets: Vec<DeleteTarget>,
    },
    /// Bulk write.
    Bulk(Vec<WriteRequest>),
}

impl StoreCall {
    /// Returns true for calls that write to the store.
    pub fn is_write(&self) -> bool {
        !matches!(self, StoreCall::GetRecord { .. } | StoreCall::GetRecords(_))
    }
}

/// A scripted store for testing.
///
/// Responses are queued per call kind and consumed in order. Every call is
/// recorded so tests can inspect what an interpreter sent.
#[derive(Debug, Default)]
pub struct MockStore {
    records: Mutex<VecDeque<StoreResult<Option<Record>>>>,
    pages: Mutex<VecDeque<StoreResult<RecordPage>>>,
    created: Mutex<VecDeque<StoreResult<Created>>>,
    revisions: Mutex<VecDeque<StoreResult<Revision>>>,
    deletes: Mutex<VecDeque<StoreResult<()>>>,
    bulks: Mutex<VecDeque<StoreResult<()>>>,
    calls: Mutex<Vec<StoreCall>>,
}

impl MockStore {
    /// Creates a mock store with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a point-read response.
    pub fn push_record(&self, response: StoreResult<Option<Record>>) -> &Self {
        self.records.lock().push_back(response);
        self
    }

    /// Queues a query response.
    pub fn push_page(&self, response: StoreResult<RecordPage>) -> &Self {
        self.pages.lock().push_back(response);
        self
    }

    /// Queues a create response.
    pub fn push_created(&self, response: StoreResult<Created>) -> &Self {
        self.created.lock().push_back(response);
        self
    }

    /// Queues an update response.
    pub fn push_revision(&self, response: StoreResult<Revision>) -> &Self {
        self.revisions.lock().push_back(response);
        self
    }

    /// Queues a delete response. Unscripted deletes succeed.
    pub fn push_delete(&self, response: StoreResult<()>) -> &Self {
        self.deletes.lock().push_back(response);
        self
    }

    /// Queues a bulk response. Unscripted bulk calls succeed.
    pub fn push_bulk(&self, response: StoreResult<()>) -> &Self {
        self.bulks.lock().push_back(response);
        self
    }

    /// Returns every call seen so far.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Returns the requests of every bulk call seen so far.
    pub fn bulk_calls(&self) -> Vec<Vec<WriteRequest>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                StoreCall::Bulk(requests) => Some(requests.clone()),
                _ => None,
            })
            .collect()
    }

    fn record_call(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }
}

fn unscripted<T>(what: &str) -> StoreResult<T> {
    Err(StoreError::rejected(
        "MOCK",
        format!("no mock {what} response set"),
    ))
}

#[async_trait]
impl RecordStore for MockStore {
    async fn get_record_opt(&self, app: &AppId, id: &RecordId) -> StoreResult<Option<Record>> {
        self.record_call(StoreCall::GetRecord {
            app: app.clone(),
            id: id.clone(),
        });
        self.records
            .lock()
            .pop_front()
            .unwrap_or_else(|| unscripted("record"))
    }

    async fn get_records(&self, query: &RecordQuery) -> StoreResult<RecordPage> {
        self.record_call(StoreCall::GetRecords(query.clone()));
        self.pages
            .lock()
            .pop_front()
            .unwrap_or_else(|| unscripted("page"))
    }

    async fn add_record(&self, app: &AppId, record: &Record) -> StoreResult<Created> {
        self.record_call(StoreCall::AddRecord {
            app: app.clone(),
            record: record.clone(),
        });
        self.created
            .lock()
            .pop_front()
            .unwrap_or_else(|| unscripted("create"))
    }

    async fn update_record(
        &self,
        app: &AppId,
        record: &Record,
        key: &RecordKey,
        revision: Option<&Revision>,
    ) -> StoreResult<Revision> {
        self.record_call(StoreCall::UpdateRecord {
            app: app.clone(),
            record: record.clone(),
            key: key.clone(),
            revision: revision.cloned(),
        });
        self.revisions
            .lock()
            .pop_front()
            .unwrap_or_else(|| unscripted("update"))
    }

    async fn delete_records(&self, app: &AppId, targets: &[DeleteTarget]) -> StoreResult<()> {
        self.record_call(StoreCall::DeleteRecords {
            app: app.clone(),
            targets: targets.to_vec(),
        });
        self.deletes.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn bulk_request(&self, requests: &[WriteRequest]) -> StoreResult<()> {
        self.record_call(StoreCall::Bulk(requests.to_vec()));
        self.bulks.lock().pop_front().unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_store_replays_in_order() {
        let store = MockStore::new();
        store
            .push_record(Ok(Some(Record::persisted("1", "1"))))
            .push_record(Ok(None));

        let app = AppId::from("1");
        let first = store.get_record_opt(&app, &RecordId::from("1")).await.unwrap();
        let second = store.get_record_opt(&app, &RecordId::from("2")).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(store.calls().len(), 2);
    }

    #[tokio::test]
    async fn unscripted_response_is_an_error() {
        let store = MockStore::new();
        let result = store.add_record(&AppId::from("1"), &Record::new()).await;
        assert!(matches!(result, Err(StoreError::Rejected { .. })));
    }

    #[tokio::test]
    async fn not_found_translates_to_none() {
        let store = MockStore::new();
        let app = AppId::from("1");
        let id = RecordId::from("9");
        store.push_record(Err(StoreError::not_found(&app, &id)));

        let result = fetch_record(&store, &app, &id).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn other_read_failures_propagate() {
        let store = MockStore::new();
        store.push_record(Err(StoreError::transport_retryable("reset")));

        let result = fetch_record(&store, &AppId::from("1"), &RecordId::from("1")).await;
        assert!(matches!(result, Err(StoreError::Transport { .. })));
    }

    #[tokio::test]
    async fn bulk_calls_are_captured() {
        let store = MockStore::new();
        let request = WriteRequest::create(AppId::from("1"), Record::new());
        store.bulk_request(std::slice::from_ref(&request)).await.unwrap();

        assert_eq!(store.bulk_calls(), vec![vec![request]]);
        assert!(store.calls()[0].is_write());
    }
}
