//! # recflow Core
//!
//! Composable record-store programs and the interpreters that run them.
//!
//! This crate provides:
//! - The operation algebra (read one, read many, create, update, delete,
//!   arbitrary async work)
//! - `Program`, a lazily evaluated chain of operations
//! - `Flow`, a builder that names each step's result in a `Bag`
//! - An auto-commit interpreter that writes as it goes
//! - A transactional interpreter that stages writes in a unit of work and
//!   submits them in one atomic bulk request
//! - The `RecordStore` seam and a scripted `MockStore`
//!
//! ## Optimistic concurrency
//!
//! Transactions hold no locks. Every staged update and delete carries the
//! revision observed by a read in the same execution, and the store rejects
//! the whole bulk request if any of those records changed since. Of two
//! transactions racing on the same record, the first to commit wins.
//!
//! ## Key Invariants
//!
//! - Building a program never performs I/O
//! - Operations run strictly in order
//! - A transaction writes exactly once, atomically, at the end
//! - A transaction never writes a record it did not read, unless the caller
//!   supplied the revision
//! - Not-found on a point read is `None`, never an error

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Library code propagates errors; it does not panic.
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod bag;
mod builder;
mod config;
mod error;
mod interpreter;
mod operation;
mod program;
mod store;
mod uow;

pub use bag::{Bag, Slot};
pub use builder::Flow;
pub use config::{TransactionConfig, DEFAULT_MAX_BULK_REQUESTS};
pub use error::{FlowError, FlowResult, StoreError, StoreResult};
pub use interpreter::{
    AutoCommitInterpreter, CommitOutcome, CommitPhase, CommitStats, Interpreter,
    TransactionalInterpreter,
};
pub use operation::{BoxTask, Cont, Operation, OperationKind};
pub use program::Program;
pub use store::{MockStore, RecordStore, StoreCall};
pub use uow::UnitOfWork;
