//! Tag-indexed program builder.

use crate::bag::{Bag, Slot};
use crate::config::TransactionConfig;
use crate::error::FlowResult;
use crate::interpreter::{AutoCommitInterpreter, Interpreter, TransactionalInterpreter};
use crate::program::Program;
use crate::store::RecordStore;
use recflow_protocol::{
    AppId, DeleteTarget, Record, RecordId, RecordQuery, Revision, UpdateKey, UpdateTarget,
};
use std::future::Future;
use std::sync::Arc;

/// Builds a program whose named results accumulate in a [`Bag`].
///
/// Every method appends one operation and stores its result under the given
/// tag. Nothing touches the store until [`commit`](Flow::commit) or
/// [`commit_transactional`](Flow::commit_transactional) is awaited.
///
/// ```ignore
/// let title = Flow::instance(store)
///     .read_one("post", "1", "42")
///     .update_by_id("saved", "1", "42", Record::new().with_field("title", "new"))
///     .commit_transactional(|bag| bag.record("post").cloned())
///     .await?;
/// ```
pub struct Flow<S: RecordStore + ?Sized> {
    program: Program<Bag>,
    auto: AutoCommitInterpreter<S>,
    transactional: TransactionalInterpreter<S>,
}

impl<S: RecordStore + ?Sized> Flow<S> {
    /// Starts an empty program over a store.
    pub fn instance(store: Arc<S>) -> Self {
        Self::with_config(store, TransactionConfig::default())
    }

    /// Starts an empty program with a transactional configuration.
    pub fn with_config(store: Arc<S>, config: TransactionConfig) -> Self {
        Self::with_interpreters(
            AutoCommitInterpreter::new(Arc::clone(&store)),
            TransactionalInterpreter::with_config(store, config),
        )
    }

    /// Starts an empty program with explicit interpreters.
    pub fn with_interpreters(
        auto: AutoCommitInterpreter<S>,
        transactional: TransactionalInterpreter<S>,
    ) -> Self {
        Self {
            program: Program::pure(Bag::new()),
            auto,
            transactional,
        }
    }

    /// Reads one record into `tag`; absent records are stored as `None`.
    pub fn read_one(
        self,
        tag: impl Into<String>,
        app: impl Into<AppId>,
        id: impl Into<RecordId>,
    ) -> Self {
        let (app, id) = (app.into(), id.into());
        self.chain(tag, move |_| Program::read_one(app, id).map(Slot::Record))
    }

    /// Reads the records matching `query` into `tag`.
    pub fn read_many(self, tag: impl Into<String>, query: RecordQuery) -> Self {
        self.chain(tag, move |_| Program::read_many(query).map(Slot::Page))
    }

    /// Creates a record.
    ///
    /// Under auto-commit `tag` receives the record with its assigned id and
    /// revision. Under a transaction they are not known before commit, so
    /// `tag` receives `None`.
    pub fn create(self, tag: impl Into<String>, app: impl Into<AppId>, record: Record) -> Self {
        let app = app.into();
        self.chain(tag, move |_| {
            let created = record.clone();
            Program::create(app, record).map(move |result| {
                Slot::Record(result.map(|c| created.with_markers(c.id, c.revision)))
            })
        })
    }

    /// Updates a record by id or update key.
    ///
    /// `revision` is an optional precondition; under a transaction the
    /// revision of an earlier read takes precedence. `tag` receives the
    /// record with its new revision, or `None` under a transaction.
    pub fn update(
        self,
        tag: impl Into<String>,
        app: impl Into<AppId>,
        record: Record,
        target: UpdateTarget,
        revision: Option<Revision>,
    ) -> Self {
        let app = app.into();
        self.chain(tag, move |_| {
            let mut updated = record.clone();
            if let Some(id) = &target.id {
                updated.id = Some(id.clone());
            }
            Program::update(app, record, target, revision).map(move |result| {
                Slot::Record(result.map(|revision| Record {
                    revision: Some(revision),
                    ..updated
                }))
            })
        })
    }

    /// Updates a record by id.
    pub fn update_by_id(
        self,
        tag: impl Into<String>,
        app: impl Into<AppId>,
        id: impl Into<RecordId>,
        record: Record,
    ) -> Self {
        self.update(tag, app, record, UpdateTarget::id(id), None)
    }

    /// Updates the record whose unique field holds the key's value.
    pub fn update_by_key(
        self,
        tag: impl Into<String>,
        app: impl Into<AppId>,
        key: UpdateKey,
        record: Record,
    ) -> Self {
        self.update(tag, app, record, UpdateTarget::update_key(key), None)
    }

    /// Deletes records. The bag is left unchanged.
    pub fn delete(self, app: impl Into<AppId>, targets: Vec<DeleteTarget>) -> Self {
        let app = app.into();
        let program = self
            .program
            .and_then(move |bag| Program::delete(app, targets).map(move |()| bag));
        Self {
            program,
            auto: self.auto,
            transactional: self.transactional,
        }
    }

    /// Replaces the value under `tag` with the result of `f`.
    ///
    /// `f` receives the current value (`None` if the tag is not set yet)
    /// and runs when the program is interpreted, in order with the store
    /// operations around it.
    pub fn transform<F, Fut>(self, tag: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(Option<Slot>) -> Fut + Send + 'static,
        Fut: Future<Output = FlowResult<Slot>> + Send + 'static,
    {
        let tag = tag.into();
        let key = tag.clone();
        self.chain(tag, move |bag| Program::run_async(f(bag.get(&key).cloned())))
    }

    /// Appends a program built from the results so far.
    ///
    /// This is how a later operation takes its inputs from earlier ones,
    /// e.g. updating a record that an earlier step read.
    pub fn chain<F>(self, tag: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(&Bag) -> Program<Slot> + Send + 'static,
    {
        let tag = tag.into();
        let program = self.program.and_then(move |bag| {
            let next = f(&bag);
            next.map(move |slot| {
                let mut bag = bag;
                bag.insert(tag, slot);
                bag
            })
        });
        Self {
            program,
            auto: self.auto,
            transactional: self.transactional,
        }
    }

    /// Returns the built program without running it.
    pub fn into_program(self) -> Program<Bag> {
        self.program
    }

    /// Runs the program with auto-commit and extracts the result.
    pub async fn commit<A, F>(self, extract: F) -> FlowResult<A>
    where
        A: Send + 'static,
        F: FnOnce(Bag) -> A + Send + 'static,
    {
        self.auto.execute(self.program.map(extract)).await
    }

    /// Runs the program as one transaction and extracts the result.
    pub async fn commit_transactional<A, F>(self, extract: F) -> FlowResult<A>
    where
        A: Send + 'static,
        F: FnOnce(Bag) -> A + Send + 'static,
    {
        self.transactional.execute(self.program.map(extract)).await
    }
}
