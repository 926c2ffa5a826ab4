//! Program interpreters.
//!
//! An interpreter walks a [`Program`] one operation at a time, feeding each
//! result to the operation's continuation, until the program is done.
//!
//! - [`AutoCommitInterpreter`] performs every operation against the store
//!   as soon as it is reached.
//! - [`TransactionalInterpreter`] performs reads immediately, stages writes
//!   in a [`UnitOfWork`](crate::UnitOfWork) and submits them in one atomic
//!   bulk request at the end.

mod auto_commit;
mod transactional;

pub use auto_commit::AutoCommitInterpreter;
pub use transactional::{CommitOutcome, CommitPhase, CommitStats, TransactionalInterpreter};

use crate::error::FlowResult;
use crate::program::Program;
use async_trait::async_trait;

/// A commit discipline for programs.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Runs the program to completion and returns its value.
    ///
    /// Operations run strictly in order. The first failure aborts the rest
    /// of the program.
    async fn execute<A>(&self, program: Program<A>) -> FlowResult<A>
    where
        A: Send + 'static;
}
