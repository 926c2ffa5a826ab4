//! Unit of work for transactional execution.
//!
//! A unit of work remembers every record read during one execution (the
//! snapshot) and the writes staged so far (pending). Each staged update or
//! delete carries the revision observed in the snapshot, so the final bulk
//! request fails as a whole if any of those records changed in between.

use crate::error::{FlowError, FlowResult};
use recflow_protocol::{
    AppId, DeleteTarget, Record, RecordId, RecordKey, RecordPage, RecordQuery, Revision,
    UpdateTarget, WriteRequest,
};
use std::collections::{HashMap, HashSet};

/// Snapshot of one app's records, in first-seen order.
///
/// `written` holds the ids that already have an update or delete staged.
#[derive(Debug, Clone, Default, PartialEq)]
struct AppSnapshot {
    records: Vec<Record>,
    written: HashSet<RecordId>,
}

impl AppSnapshot {
    fn position(&self, id: &RecordId) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.id.as_ref() == Some(id))
    }

    fn get(&self, id: &RecordId) -> Option<&Record> {
        self.position(id).map(|i| &self.records[i])
    }

    fn upsert(&mut self, record: Record) {
        let existing = record.id.as_ref().and_then(|id| self.position(id));
        match existing {
            Some(i) => self.records[i] = record,
            None => self.records.push(record),
        }
    }

    fn find(&self, key: &RecordKey) -> Option<usize> {
        match key {
            RecordKey::Id(id) => self.position(id),
            RecordKey::UpdateKey(k) => self
                .records
                .iter()
                .position(|r| r.field_equals(&k.field, &k.value)),
        }
    }

    fn is_written(&self, id: &RecordId) -> bool {
        self.written.contains(id)
    }

    fn remove(&mut self, id: &RecordId) {
        self.records.retain(|r| r.id.as_ref() != Some(id));
    }
}

/// Read snapshot plus staged writes of one transactional execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOfWork {
    snapshot: HashMap<AppId, AppSnapshot>,
    pending: Vec<WriteRequest>,
}

impl UnitOfWork {
    /// Creates an empty unit of work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a point read into the snapshot.
    ///
    /// A record read later replaces an earlier read of the same id.
    pub fn record_read(&mut self, app: &AppId, record: Record) -> FlowResult<()> {
        if record.id.is_none() {
            return Err(FlowError::MissingRecordId { app: app.clone() });
        }
        self.snapshot.entry(app.clone()).or_default().upsert(record);
        Ok(())
    }

    /// Records the result of a query read into the snapshot.
    ///
    /// With a projection the store may legitimately omit the id marker, and
    /// such records are skipped. Without one every record must carry an id.
    pub fn record_page(&mut self, query: &RecordQuery, page: &RecordPage) -> FlowResult<()> {
        let projected = query.is_projected();
        if !projected && page.records.iter().any(|r| r.id.is_none()) {
            return Err(FlowError::MissingRecordId {
                app: query.app.clone(),
            });
        }

        let snapshot = self.snapshot.entry(query.app.clone()).or_default();
        for record in page.records.iter().filter(|r| r.id.is_some()) {
            snapshot.upsert(record.clone());
        }
        Ok(())
    }

    /// Stages a create. Never fails.
    pub fn stage_create(&mut self, app: AppId, record: Record) {
        self.pending.push(WriteRequest::create(app, record));
    }

    /// Stages an update conditioned on the snapshot's revision.
    ///
    /// The target is looked up by id, or else by update key among the
    /// snapshot records of `app` in first-seen order. On a match the
    /// snapshot's fields are refreshed with the new values. The snapshot's
    /// revision is used, or the explicit `revision` if the snapshot has
    /// none (a projected read may omit it); with neither the update fails
    /// with [`FlowError::MissingRevision`].
    ///
    /// Without a match, an update by id that carries an explicit `revision`
    /// is staged with it; anything else fails with
    /// [`FlowError::ReadBeforeWrite`].
    ///
    /// A record takes at most one staged update or delete per execution. A
    /// second one fails with [`FlowError::AlreadyWritten`].
    pub fn stage_update(
        &mut self,
        app: AppId,
        record: Record,
        target: &UpdateTarget,
        revision: Option<Revision>,
    ) -> FlowResult<()> {
        let key = target
            .resolve()
            .ok_or_else(|| FlowError::MissingUpdateTarget { app: app.clone() })?;

        let snapshot = self.snapshot.get(&app);
        let found = snapshot.and_then(|s| s.find(&key));
        let id = match (found, &key) {
            (Some(i), _) => snapshot.and_then(|s| s.records[i].id.clone()),
            (None, RecordKey::Id(id)) => Some(id.clone()),
            (None, RecordKey::UpdateKey(_)) => None,
        };
        if let Some(id) = &id {
            if snapshot.is_some_and(|s| s.is_written(id)) {
                return Err(FlowError::AlreadyWritten {
                    app,
                    id: id.clone(),
                });
            }
        }

        let revision = match (found, id) {
            (Some(i), Some(id)) => {
                let snapshot = self.snapshot.entry(app.clone()).or_default();
                let current = &mut snapshot.records[i];
                let observed = current.revision.clone().or(revision).ok_or_else(|| {
                    FlowError::MissingRevision {
                        app: app.clone(),
                        id: id.clone(),
                    }
                })?;
                current.merge_fields(&record);
                snapshot.written.insert(id);
                observed
            }
            (None, Some(id)) if matches!(key, RecordKey::Id(_)) => match revision {
                Some(explicit) => {
                    self.snapshot
                        .entry(app.clone())
                        .or_default()
                        .written
                        .insert(id);
                    explicit
                }
                None => return Err(read_before_write(app, &key)),
            },
            _ => return Err(read_before_write(app, &key)),
        };

        self.pending
            .push(WriteRequest::update(app, record, key, revision));
        Ok(())
    }

    /// Stages a delete conditioned on the snapshot's revisions.
    ///
    /// Each target resolves to the snapshot's revision, or else to its own
    /// explicit revision. If any target resolves to neither, nothing is
    /// staged and [`FlowError::UnresolvedDelete`] lists the offending ids.
    /// Deleted records leave the snapshot. An empty target list is a no-op.
    /// A target that already has a staged update or delete fails with
    /// [`FlowError::AlreadyWritten`].
    pub fn stage_delete(&mut self, app: AppId, targets: &[DeleteTarget]) -> FlowResult<()> {
        if targets.is_empty() {
            return Ok(());
        }

        let snapshot = self.snapshot.get(&app);
        if let Some(target) = targets
            .iter()
            .find(|t| snapshot.is_some_and(|s| s.is_written(&t.id)))
        {
            return Err(FlowError::AlreadyWritten {
                app,
                id: target.id.clone(),
            });
        }

        let mut pairs = Vec::with_capacity(targets.len());
        let mut unresolved = Vec::new();
        for target in targets {
            let observed = snapshot
                .and_then(|s| s.get(&target.id))
                .and_then(|r| r.revision.clone());
            match observed.or_else(|| target.revision.clone()) {
                Some(revision) => pairs.push((target.id.clone(), revision)),
                None => unresolved.push(target.id.clone()),
            }
        }

        if !unresolved.is_empty() {
            return Err(FlowError::UnresolvedDelete {
                app,
                ids: unresolved,
            });
        }

        let snapshot = self.snapshot.entry(app.clone()).or_default();
        for (id, _) in &pairs {
            snapshot.remove(id);
            snapshot.written.insert(id.clone());
        }
        self.pending.push(WriteRequest::delete(app, pairs));
        Ok(())
    }

    /// Returns true if the record already has a staged update or delete.
    #[must_use]
    pub fn is_written(&self, app: &AppId, id: &RecordId) -> bool {
        self.snapshot.get(app).is_some_and(|s| s.is_written(id))
    }

    /// Returns the snapshot of a record, if it was read.
    #[must_use]
    pub fn snapshot(&self, app: &AppId, id: &RecordId) -> Option<&Record> {
        self.snapshot.get(app).and_then(|s| s.get(id))
    }

    /// Returns the number of records snapshotted for an app.
    #[must_use]
    pub fn snapshot_len(&self, app: &AppId) -> usize {
        self.snapshot.get(app).map_or(0, |s| s.records.len())
    }

    /// Returns the staged writes in staging order.
    #[must_use]
    pub fn pending(&self) -> &[WriteRequest] {
        &self.pending
    }

    /// Consumes the unit of work, returning its staged writes.
    #[must_use]
    pub fn into_pending(self) -> Vec<WriteRequest> {
        self.pending
    }

    /// Returns true if no write has been staged.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.pending.is_empty()
    }
}

fn read_before_write(app: AppId, key: &RecordKey) -> FlowError {
    FlowError::ReadBeforeWrite {
        app,
        key: describe_key(key),
    }
}

fn describe_key(key: &RecordKey) -> String {
    match key {
        RecordKey::Id(id) => id.to_string(),
        RecordKey::UpdateKey(k) => format!("{}={}", k.field, k.value),
    }
}
