//! The operation algebra.
//!
//! An [`Operation`] describes one store action together with the
//! continuation that receives its result. Operations carry no behavior of
//! their own; an interpreter decides what each one means.

use crate::bag::Slot;
use crate::error::FlowResult;
use recflow_protocol::{
    AppId, Created, DeleteTarget, Record, RecordId, RecordPage, RecordQuery, Revision,
    UpdateTarget,
};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A caller-supplied async computation.
pub type BoxTask = Pin<Box<dyn Future<Output = FlowResult<Slot>> + Send + 'static>>;

/// Continuation receiving an operation's result.
pub type Cont<R, K> = Box<dyn FnOnce(R) -> K + Send + 'static>;

/// One instruction of a program, parameterized by what follows it.
pub enum Operation<K> {
    /// Run an arbitrary async computation.
    RunAsync {
        /// The computation.
        task: BoxTask,
        /// Receives the computed value.
        cont: Cont<Slot, K>,
    },
    /// Read one record by id.
    ReadOne {
        /// Target app.
        app: AppId,
        /// Record id.
        id: RecordId,
        /// Receives the record, or `None` if it does not exist.
        cont: Cont<Option<Record>, K>,
    },
    /// Read the records matching a query.
    ReadMany {
        /// The query.
        query: RecordQuery,
        /// Receives the page.
        cont: Cont<RecordPage, K>,
    },
    /// Create a record.
    Create {
        /// Target app.
        app: AppId,
        /// Record to add.
        record: Record,
        /// Receives the assigned id and revision, if known yet.
        cont: Cont<Option<Created>, K>,
    },
    /// Update a record by id or update key.
    Update {
        /// Target app.
        app: AppId,
        /// New field values.
        record: Record,
        /// Id and/or update key.
        target: UpdateTarget,
        /// Caller-supplied revision precondition.
        revision: Option<Revision>,
        /// Receives the new revision, if known yet.
        cont: Cont<Option<Revision>, K>,
    },
    /// Delete records.
    Delete {
        /// Target app.
        app: AppId,
        /// Records to delete.
        targets: Vec<DeleteTarget>,
        /// Resumes after the delete.
        cont: Cont<(), K>,
    },
}

/// Discriminant of an [`Operation`], used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// [`Operation::RunAsync`].
    RunAsync,
    /// [`Operation::ReadOne`].
    ReadOne,
    /// [`Operation::ReadMany`].
    ReadMany,
    /// [`Operation::Create`].
    Create,
    /// [`Operation::Update`].
    Update,
    /// [`Operation::Delete`].
    Delete,
}

impl OperationKind {
    /// Returns a short name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::RunAsync => "run_async",
            OperationKind::ReadOne => "read_one",
            OperationKind::ReadMany => "read_many",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    /// Returns true for operations that change store state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            OperationKind::Create | OperationKind::Update | OperationKind::Delete
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<K: 'static> Operation<K> {
    /// Returns the operation's kind.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::RunAsync { .. } => OperationKind::RunAsync,
            Operation::ReadOne { .. } => OperationKind::ReadOne,
            Operation::ReadMany { .. } => OperationKind::ReadMany,
            Operation::Create { .. } => OperationKind::Create,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Returns the target app, if the operation touches the store.
    pub fn app(&self) -> Option<&AppId> {
        match self {
            Operation::RunAsync { .. } => None,
            Operation::ReadMany { query, .. } => Some(&query.app),
            Operation::ReadOne { app, .. }
            | Operation::Create { app, .. }
            | Operation::Update { app, .. }
            | Operation::Delete { app, .. } => Some(app),
        }
    }

    /// Post-composes `f` onto the continuation.
    ///
    /// The payload is untouched; only what happens after the result is
    /// delivered changes.
    pub fn map<K2, F>(self, f: F) -> Operation<K2>
    where
        K2: 'static,
        F: FnOnce(K) -> K2 + Send + 'static,
    {
        match self {
            Operation::RunAsync { task, cont } => Operation::RunAsync {
                task,
                cont: compose(cont, f),
            },
            Operation::ReadOne { app, id, cont } => Operation::ReadOne {
                app,
                id,
                cont: compose(cont, f),
            },
            Operation::ReadMany { query, cont } => Operation::ReadMany {
                query,
                cont: compose(cont, f),
            },
            Operation::Create { app, record, cont } => Operation::Create {
                app,
                record,
                cont: compose(cont, f),
            },
            Operation::Update {
                app,
                record,
                target,
                revision,
                cont,
            } => Operation::Update {
                app,
                record,
                target,
                revision,
                cont: compose(cont, f),
            },
            Operation::Delete { app, targets, cont } => Operation::Delete {
                app,
                targets,
                cont: compose(cont, f),
            },
        }
    }
}

fn compose<R, K, K2, F>(cont: Cont<R, K>, f: F) -> Cont<R, K2>
where
    R: 'static,
    K: 'static,
    K2: 'static,
    F: FnOnce(K) -> K2 + Send + 'static,
{
    Box::new(move |result| f(cont(result)))
}

impl<K: 'static> fmt::Debug for Operation<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Operation");
        s.field("kind", &self.kind());
        match self {
            Operation::RunAsync { .. } => {}
            Operation::ReadOne { app, id, .. } => {
                s.field("app", app).field("id", id);
            }
            Operation::ReadMany { query, .. } => {
                s.field("query", query);
            }
            Operation::Create { app, record, .. } => {
                s.field("app", app).field("record", record);
            }
            Operation::Update {
                app,
                record,
                target,
                revision,
                ..
            } => {
                s.field("app", app)
                    .field("record", record)
                    .field("target", target)
                    .field("revision", revision);
            }
            Operation::Delete { app, targets, .. } => {
                s.field("app", app).field("targets", targets);
            }
        }
        s.finish_non_exhaustive()
    }
}
