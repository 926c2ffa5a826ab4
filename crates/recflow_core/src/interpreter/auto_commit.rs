//! Auto-commit execution.

use super::Interpreter;
use crate::error::{FlowError, FlowResult};
use crate::operation::Operation;
use crate::program::Program;
use crate::store::{fetch_record, RecordStore};
use async_trait::async_trait;
use recflow_protocol::RecordKey;
use std::sync::Arc;
use tracing::{debug, warn};

/// Performs each operation against the store as soon as it is reached.
///
/// There is no rollback: if a later operation fails, writes already made by
/// earlier operations of the same program stay in the store.
pub struct AutoCommitInterpreter<S: RecordStore + ?Sized> {
    store: Arc<S>,
}

impl<S: RecordStore + ?Sized> AutoCommitInterpreter<S> {
    /// Creates an interpreter over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn step<K: Send + 'static>(&self, op: Operation<K>) -> FlowResult<K> {
        debug!("auto-commit {} on app {:?}", op.kind(), op.app());
        let store = self.store.as_ref();
        let next = match op {
            Operation::RunAsync { task, cont } => cont(task.await?),
            Operation::ReadOne { app, id, cont } => cont(fetch_record(store, &app, &id).await?),
            Operation::ReadMany { query, cont } => cont(store.get_records(&query).await?),
            Operation::Create { app, record, cont } => {
                let created = store.add_record(&app, &record).await?;
                debug!("created record {} in app {}", created.id, app);
                cont(Some(created))
            }
            Operation::Update {
                app,
                record,
                target,
                revision,
                cont,
            } => {
                let key = target
                    .resolve()
                    .ok_or_else(|| FlowError::MissingUpdateTarget { app: app.clone() })?;
                let record = match &key {
                    RecordKey::UpdateKey(k) => record.without_field(&k.field),
                    RecordKey::Id(_) => record,
                };
                let revision = store
                    .update_record(&app, &record, &key, revision.as_ref())
                    .await?;
                cont(Some(revision))
            }
            Operation::Delete { app, targets, cont } => {
                if !targets.is_empty() {
                    store.delete_records(&app, &targets).await?;
                }
                cont(())
            }
        };
        Ok(next)
    }
}

impl<S: RecordStore + ?Sized> Clone for AutoCommitInterpreter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

#[async_trait]
impl<S: RecordStore + ?Sized> Interpreter for AutoCommitInterpreter<S> {
    async fn execute<A>(&self, program: Program<A>) -> FlowResult<A>
    where
        A: Send + 'static,
    {
        let mut program = program;
        let mut steps = 0usize;
        loop {
            match program {
                Program::Done(value) => {
                    debug!("auto-commit finished after {} operations", steps);
                    return Ok(value);
                }
                Program::Step(op) => {
                    steps += 1;
                    program = match self.step(op).await {
                        Ok(next) => next,
                        Err(e) => {
                            warn!("auto-commit aborted at operation {}: {}", steps, e);
                            return Err(e);
                        }
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::Slot;
    use crate::error::StoreError;
    use crate::store::{MockStore, StoreCall};
    use recflow_protocol::{
        AppId, Created, DeleteTarget, Record, RecordId, RecordPage, RecordQuery, Revision,
        UpdateKey, UpdateTarget,
    };
    use serde_json::json;

    fn interpreter() -> (Arc<MockStore>, AutoCommitInterpreter<MockStore>) {
        let store = Arc::new(MockStore::new());
        (Arc::clone(&store), AutoCommitInterpreter::new(store))
    }

    #[tokio::test]
    async fn reads_pass_results_through() {
        let (store, auto) = interpreter();
        store.push_record(Ok(Some(Record::persisted("1", "1").with_field("a", 1))));

        let record = auto
            .execute(Program::read_one(AppId::from("1"), RecordId::from("1")))
            .await
            .unwrap();
        assert_eq!(record.unwrap().field("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn not_found_reads_as_none() {
        let (store, auto) = interpreter();
        let app = AppId::from("1");
        let id = RecordId::from("404");
        store.push_record(Err(StoreError::not_found(&app, &id)));

        let record = auto.execute(Program::read_one(app, id)).await.unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn writes_are_issued_immediately_in_order() {
        let (store, auto) = interpreter();
        store.push_created(Ok(Created {
            id: RecordId::from("5"),
            revision: Revision::from("1"),
        }));
        store.push_revision(Ok(Revision::from("2")));

        let app = AppId::from("1");
        let program = Program::create(app.clone(), Record::new().with_field("a", 1))
            .and_then({
                let app = app.clone();
                move |created| {
                    let created = created.unwrap_or(Created {
                        id: RecordId::from("0"),
                        revision: Revision::from("0"),
                    });
                    Program::update(
                        app,
                        Record::new().with_field("a", 2),
                        UpdateTarget::id(created.id),
                        Some(created.revision),
                    )
                }
            })
            .and_then(move |_| Program::delete(app, vec![DeleteTarget::new("5")]));

        auto.execute(program).await.unwrap();

        let calls = store.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], StoreCall::AddRecord { .. }));
        assert!(matches!(
            &calls[1],
            StoreCall::UpdateRecord { revision: Some(r), .. } if r == &Revision::from("1")
        ));
        assert!(matches!(calls[2], StoreCall::DeleteRecords { .. }));
        assert!(store.bulk_calls().is_empty());
    }

    #[tokio::test]
    async fn update_by_key_strips_key_field() {
        let (store, auto) = interpreter();
        store.push_revision(Ok(Revision::from("4")));

        let program = Program::update(
            AppId::from("1"),
            Record::new().with_field("code", "A").with_field("qty", 1),
            UpdateTarget::update_key(UpdateKey::new("code", "A")),
            None,
        );
        let revision = auto.execute(program).await.unwrap();
        assert_eq!(revision, Some(Revision::from("4")));

        let StoreCall::UpdateRecord { record, .. } = &store.calls()[0] else {
            panic!("expected an update");
        };
        assert!(record.field("code").is_none());
        assert_eq!(record.field("qty"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn failure_aborts_remaining_operations() {
        let (store, auto) = interpreter();
        store.push_created(Ok(Created {
            id: RecordId::from("1"),
            revision: Revision::from("1"),
        }));
        store.push_page(Err(StoreError::rejected("GAIA_IQ11", "bad query")));

        let program = Program::create(AppId::from("1"), Record::new())
            .then(Program::read_many(RecordQuery::new("1")))
            .then(Program::delete(AppId::from("1"), vec![DeleteTarget::new("1")]));

        let err = auto.execute(program).await.unwrap_err();
        assert!(matches!(err, FlowError::Store(StoreError::Rejected { .. })));

        // The create stays applied; the delete never ran.
        let calls = store.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].is_write());
    }

    #[tokio::test]
    async fn run_async_result_feeds_continuation() {
        let (_, auto) = interpreter();
        let program = Program::run_async(async { Ok::<_, FlowError>(Slot::Value(json!(41))) })
            .map(|slot| slot.as_value().and_then(|v| v.as_i64()).unwrap_or(0) + 1);
        assert_eq!(auto.execute(program).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn task_failure_propagates() {
        let (_, auto) = interpreter();
        let program = Program::run_async(async { Err(FlowError::task("boom")) });
        assert!(matches!(
            auto.execute(program).await,
            Err(FlowError::Task(msg)) if msg == "boom"
        ));
    }

    #[tokio::test]
    async fn update_without_target_fails_locally() {
        let (store, auto) = interpreter();
        let program = Program::update(AppId::from("1"), Record::new(), UpdateTarget::default(), None);
        let err = auto.execute(program).await.unwrap_err();
        assert!(err.is_local());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn query_page_is_returned_verbatim() {
        let (store, auto) = interpreter();
        let page = RecordPage::new(vec![Record::persisted("1", "1")]).with_total_count(1);
        store.push_page(Ok(page.clone()));

        let result = auto
            .execute(Program::read_many(RecordQuery::new("1").with_total_count()))
            .await
            .unwrap();
        assert_eq!(result, page);
    }
}
