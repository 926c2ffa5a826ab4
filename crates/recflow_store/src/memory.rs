//! In-process record store.
//!
//! `MemoryStore` behaves like a real backing store as far as the
//! interpreters can tell: ids and revisions are assigned by the store,
//! revision preconditions are enforced, and bulk requests are all-or-nothing.

use crate::query::Filter;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use recflow_core::{RecordStore, StoreError, StoreResult};
use recflow_protocol::{
    AppId, Created, DeleteTarget, Record, RecordId, RecordKey, RecordPage, RecordQuery, Revision,
    WriteRequest,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

/// Error code for query strings the store cannot parse.
pub const QUERY_ERROR_CODE: &str = "QUERY";

/// Error code for an update key that matches more than one record.
pub const AMBIGUOUS_KEY_CODE: &str = "AMBIGUOUS_KEY";

/// Counters describing the traffic a [`MemoryStore`] has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// Point and query reads.
    pub reads: u64,
    /// Direct (non-bulk) writes that succeeded.
    pub writes: u64,
    /// Bulk requests that were applied.
    pub bulk_applied: u64,
    /// Bulk requests that were rejected.
    pub bulk_rejected: u64,
}

#[derive(Debug, Clone, Default)]
struct Table {
    records: BTreeMap<u64, Record>,
    last_id: u64,
}

/// Tables of all apps. Cloned wholesale to stage a bulk request.
#[derive(Debug, Clone, Default)]
struct Tables {
    apps: HashMap<AppId, Table>,
}

impl Tables {
    fn table(&self, app: &AppId) -> Option<&Table> {
        self.apps.get(app)
    }

    fn get(&self, app: &AppId, id: &RecordId) -> Option<&Record> {
        let n = id.as_u64()?;
        self.table(app)?.records.get(&n)
    }

    fn query(&self, query: &RecordQuery) -> StoreResult<RecordPage> {
        let filter = Filter::parse(query.query.as_deref().unwrap_or_default())
            .map_err(|e| StoreError::rejected(QUERY_ERROR_CODE, e.to_string()))?;

        let Some(table) = self.table(&query.app) else {
            return Ok(page(Vec::new(), query.total_count.then_some(0)));
        };

        let matched = filter.apply(table.records.values());
        let records = matched
            .into_iter()
            .map(|r| match &query.fields {
                Some(fields) if !fields.is_empty() => r.project(fields),
                _ => r.clone(),
            })
            .collect();
        let total = query
            .total_count
            .then(|| filter.count(table.records.values()) as u64);
        Ok(page(records, total))
    }

    fn add(&mut self, app: &AppId, record: &Record) -> Created {
        let table = self.apps.entry(app.clone()).or_default();
        table.last_id += 1;
        let created = Created {
            id: RecordId::from(table.last_id),
            revision: Revision::from(1u64),
        };
        let stored = Record {
            id: None,
            revision: None,
            fields: record.fields.clone(),
        }
        .with_markers(created.id.clone(), created.revision.clone());
        table.records.insert(table.last_id, stored);
        created
    }

    fn resolve(&self, app: &AppId, key: &RecordKey) -> StoreResult<u64> {
        match key {
            RecordKey::Id(id) => id
                .as_u64()
                .filter(|n| self.table(app).is_some_and(|t| t.records.contains_key(n)))
                .ok_or_else(|| StoreError::not_found(app, id)),
            RecordKey::UpdateKey(k) => {
                let mut matches = self
                    .table(app)
                    .into_iter()
                    .flat_map(|t| t.records.iter())
                    .filter(|(_, r)| r.field_equals(&k.field, &k.value))
                    .map(|(n, _)| *n);
                match (matches.next(), matches.next()) {
                    (Some(n), None) => Ok(n),
                    (None, _) => Err(StoreError::not_found(
                        app,
                        &RecordId::new(format!("{}={}", k.field, k.value)),
                    )),
                    (Some(_), Some(_)) => Err(StoreError::rejected(
                        AMBIGUOUS_KEY_CODE,
                        format!("update key {} matches more than one record", k.field),
                    )),
                }
            }
        }
    }

    fn update(
        &mut self,
        app: &AppId,
        record: &Record,
        key: &RecordKey,
        expected: Option<&Revision>,
    ) -> StoreResult<Revision> {
        let n = self.resolve(app, key)?;
        let stored = self
            .apps
            .get_mut(app)
            .and_then(|t| t.records.get_mut(&n))
            .ok_or_else(|| StoreError::not_found(app, &RecordId::from(n)))?;

        let current = stored.revision.clone().unwrap_or_else(|| Revision::from(1u64));
        check_revision(n, &current, expected)?;

        let next = current
            .next()
            .ok_or_else(|| StoreError::Codec(format!("revision {current} is not numeric")))?;
        stored.merge_fields(record);
        stored.revision = Some(next.clone());
        Ok(next)
    }

    fn delete(&mut self, app: &AppId, targets: &[(RecordId, Option<Revision>)]) -> StoreResult<()> {
        let mut numbers = Vec::with_capacity(targets.len());
        for (id, expected) in targets {
            let stored = self
                .get(app, id)
                .ok_or_else(|| StoreError::not_found(app, id))?;
            if let Some(current) = &stored.revision {
                let n = id.as_u64().unwrap_or_default();
                check_revision(n, current, expected.as_ref())?;
            }
            numbers.push(id.as_u64().unwrap_or_default());
        }

        if let Some(table) = self.apps.get_mut(app) {
            for n in numbers {
                table.records.remove(&n);
            }
        }
        Ok(())
    }

    fn apply(&mut self, request: &WriteRequest) -> StoreResult<()> {
        match request {
            WriteRequest::Create { app, record } => {
                self.add(app, record);
                Ok(())
            }
            WriteRequest::Update {
                app,
                record,
                key,
                revision,
            } => self.update(app, record, key, Some(revision)).map(|_| ()),
            WriteRequest::Delete {
                app,
                ids,
                revisions,
            } => {
                let targets: Vec<_> = ids
                    .iter()
                    .cloned()
                    .zip(revisions.iter().cloned().map(Some))
                    .collect();
                self.delete(app, &targets)
            }
        }
    }
}

fn page(records: Vec<Record>, total: Option<u64>) -> RecordPage {
    let page = RecordPage::new(records);
    match total {
        Some(total) => page.with_total_count(total),
        None => page,
    }
}

fn check_revision(n: u64, current: &Revision, expected: Option<&Revision>) -> StoreResult<()> {
    match expected {
        Some(expected) if expected != current => Err(StoreError::conflict(format!(
            "record {n} is at revision {current}, expected {expected}"
        ))),
        _ => Ok(()),
    }
}

/// A record store held in memory.
///
/// Ids and revisions are numeric and start at `1`. Safe to share between
/// concurrent executions; every call sees a consistent state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    stats: Mutex<MemoryStoreStats>,
    latency: Option<Duration>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call, for exercising interleavings in tests.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Inserts a record directly, bypassing revision checks.
    pub fn seed(&self, app: impl Into<AppId>, record: Record) -> Created {
        self.tables.write().add(&app.into(), &record)
    }

    /// Returns a record without counting it as a read.
    pub fn peek(&self, app: &AppId, id: &RecordId) -> Option<Record> {
        self.tables.read().get(app, id).cloned()
    }

    /// Returns every record of an app in id order.
    pub fn records(&self, app: &AppId) -> Vec<Record> {
        self.tables
            .read()
            .table(app)
            .map(|t| t.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of records in an app.
    pub fn len(&self, app: &AppId) -> usize {
        self.tables.read().table(app).map_or(0, |t| t.records.len())
    }

    /// Returns true if the app has no records.
    pub fn is_empty(&self, app: &AppId) -> bool {
        self.len(app) == 0
    }

    /// Returns a copy of the counters.
    pub fn stats(&self) -> MemoryStoreStats {
        self.stats.lock().clone()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn count_read(&self) {
        self.stats.lock().reads += 1;
    }

    fn count_write<T>(&self, result: &StoreResult<T>) {
        if result.is_ok() {
            self.stats.lock().writes += 1;
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_record_opt(&self, app: &AppId, id: &RecordId) -> StoreResult<Option<Record>> {
        self.pause().await;
        self.count_read();
        Ok(self.tables.read().get(app, id).cloned())
    }

    async fn get_records(&self, query: &RecordQuery) -> StoreResult<RecordPage> {
        self.pause().await;
        self.count_read();
        self.tables.read().query(query)
    }

    async fn add_record(&self, app: &AppId, record: &Record) -> StoreResult<Created> {
        self.pause().await;
        let created = self.tables.write().add(app, record);
        self.stats.lock().writes += 1;
        debug!("memory store created record {} in app {}", created.id, app);
        Ok(created)
    }

    async fn update_record(
        &self,
        app: &AppId,
        record: &Record,
        key: &RecordKey,
        revision: Option<&Revision>,
    ) -> StoreResult<Revision> {
        self.pause().await;
        let result = self.tables.write().update(app, record, key, revision);
        self.count_write(&result);
        result
    }

    async fn delete_records(&self, app: &AppId, targets: &[DeleteTarget]) -> StoreResult<()> {
        self.pause().await;
        let targets: Vec<_> = targets
            .iter()
            .map(|t| (t.id.clone(), t.revision.clone()))
            .collect();
        let result = self.tables.write().delete(app, &targets);
        self.count_write(&result);
        result
    }

    async fn bulk_request(&self, requests: &[WriteRequest]) -> StoreResult<()> {
        self.pause().await;

        // Apply what the wire form carries, as a REST backend would see it.
        let requests = requests
            .iter()
            .map(|r| r.encode().and_then(|wire| WriteRequest::decode(&wire)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                warn!("memory store rejected malformed bulk request: {}", e);
                self.stats.lock().bulk_rejected += 1;
                StoreError::Codec(e.to_string())
            })?;

        let mut tables = self.tables.write();
        let mut scratch = tables.clone();

        for (index, request) in requests.iter().enumerate() {
            if let Err(e) = scratch.apply(request) {
                warn!("memory store rejected bulk request at index {}: {}", index, e);
                self.stats.lock().bulk_rejected += 1;
                return Err(e);
            }
        }

        *tables = scratch;
        self.stats.lock().bulk_applied += 1;
        debug!("memory store applied bulk request with {} writes", requests.len());
        Ok(())
    }
}
