//! Programs: sequences of operations with data dependencies.

use crate::bag::Slot;
use crate::error::FlowResult;
use crate::operation::Operation;
use recflow_protocol::{
    AppId, Created, DeleteTarget, Record, RecordId, RecordPage, RecordQuery, Revision,
    UpdateTarget,
};
use std::fmt;
use std::future::Future;

/// An immutable description of store work yielding an `A`.
///
/// A program is either finished with a value, or one [`Operation`] whose
/// continuation produces the rest of the program. Building one performs no
/// I/O; each continuation runs only when an interpreter delivers the result
/// it waits for.
pub enum Program<A> {
    /// Finished with a value.
    Done(A),
    /// One operation, then whatever its continuation returns.
    Step(Operation<Program<A>>),
}

impl<A: Send + 'static> Program<A> {
    /// A program that performs nothing and yields `value`.
    pub fn pure(value: A) -> Self {
        Program::Done(value)
    }

    /// Lifts a single operation into a program.
    pub fn lift(op: Operation<A>) -> Self {
        Program::Step(op.map(Program::Done))
    }

    /// Returns true if no operation remains.
    pub fn is_done(&self) -> bool {
        matches!(self, Program::Done(_))
    }

    /// Transforms the final value.
    pub fn map<B, F>(self, f: F) -> Program<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> B + Send + 'static,
    {
        self.and_then(move |a| Program::Done(f(a)))
    }

    /// Sequences a program that depends on this one's value.
    pub fn and_then<B, F>(self, f: F) -> Program<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> Program<B> + Send + 'static,
    {
        match self {
            Program::Done(a) => f(a),
            Program::Step(op) => Program::Step(op.map(move |next: Program<A>| next.and_then(f))),
        }
    }

    /// Runs `next` after this program, discarding this program's value.
    pub fn then<B>(self, next: Program<B>) -> Program<B>
    where
        B: Send + 'static,
    {
        self.and_then(move |_| next)
    }
}

impl Program<Option<Record>> {
    /// Reads one record; yields `None` if it does not exist.
    pub fn read_one(app: AppId, id: RecordId) -> Self {
        Program::lift(Operation::ReadOne {
            app,
            id,
            cont: Box::new(|record| record),
        })
    }
}

impl Program<RecordPage> {
    /// Reads the records matching a query.
    pub fn read_many(query: RecordQuery) -> Self {
        Program::lift(Operation::ReadMany {
            query,
            cont: Box::new(|page| page),
        })
    }
}

impl Program<Option<Created>> {
    /// Creates a record.
    pub fn create(app: AppId, record: Record) -> Self {
        Program::lift(Operation::Create {
            app,
            record,
            cont: Box::new(|created| created),
        })
    }
}

impl Program<Option<Revision>> {
    /// Updates a record by id or update key.
    pub fn update(
        app: AppId,
        record: Record,
        target: UpdateTarget,
        revision: Option<Revision>,
    ) -> Self {
        Program::lift(Operation::Update {
            app,
            record,
            target,
            revision,
            cont: Box::new(|revision| revision),
        })
    }
}

impl Program<()> {
    /// Deletes records.
    pub fn delete(app: AppId, targets: Vec<DeleteTarget>) -> Self {
        Program::lift(Operation::Delete {
            app,
            targets,
            cont: Box::new(|()| ()),
        })
    }
}

impl Program<Slot> {
    /// Runs an arbitrary async computation when the program is interpreted.
    pub fn run_async<F>(task: F) -> Self
    where
        F: Future<Output = FlowResult<Slot>> + Send + 'static,
    {
        Program::lift(Operation::RunAsync {
            task: Box::pin(task),
            cont: Box::new(|slot| slot),
        })
    }
}

impl<A: fmt::Debug + 'static> fmt::Debug for Program<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Program::Done(a) => f.debug_tuple("Done").field(a).finish(),
            Program::Step(op) => f.debug_tuple("Step").field(op).finish(),
        }
    }
}
