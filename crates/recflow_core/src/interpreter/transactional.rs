//! Transactional execution.

use super::Interpreter;
use crate::config::TransactionConfig;
use crate::error::{FlowError, FlowResult};
use crate::operation::Operation;
use crate::program::Program;
use crate::store::{fetch_record, RecordStore};
use crate::uow::UnitOfWork;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Phase of one transactional execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    /// Not started.
    Idle,
    /// Reading and staging writes.
    Folding,
    /// Submitting the bulk request.
    BulkSubmit,
    /// The bulk request succeeded, or there was nothing to submit.
    Committed,
    /// A local check, read or the bulk request failed.
    Aborted,
}

impl CommitPhase {
    /// Returns true for `Committed` and `Aborted`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommitPhase::Committed | CommitPhase::Aborted)
    }

    /// Returns true while the execution is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, CommitPhase::Folding | CommitPhase::BulkSubmit)
    }
}

/// Counters kept across executions of one interpreter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Executions that committed.
    pub committed: u64,
    /// Executions that aborted.
    pub aborted: u64,
    /// Write requests accepted by the store.
    pub requests_submitted: u64,
    /// Message of the last abort.
    pub last_error: Option<String>,
}

/// Result of one transactional execution.
#[derive(Debug)]
pub struct CommitOutcome<A> {
    /// The program's value, or why the execution aborted.
    pub result: FlowResult<A>,
    /// Terminal phase reached.
    pub phase: CommitPhase,
    /// Phase during which the execution aborted, if it did.
    pub failed_in: Option<CommitPhase>,
    /// Write requests accepted by the store.
    pub submitted: usize,
    /// Wall time of the execution.
    pub duration: Duration,
}

impl<A> CommitOutcome<A> {
    /// Returns true if the execution committed.
    pub fn is_committed(&self) -> bool {
        self.phase == CommitPhase::Committed
    }
}

/// Reads immediately, stages writes, and submits them in one bulk request.
///
/// Every update and delete is conditioned on the revision observed by a read
/// earlier in the same execution, so a concurrent writer that commits first
/// makes the whole bulk request fail. Nothing is written unless everything
/// is.
pub struct TransactionalInterpreter<S: RecordStore + ?Sized> {
    store: Arc<S>,
    config: TransactionConfig,
    stats: Arc<RwLock<CommitStats>>,
}

impl<S: RecordStore + ?Sized> TransactionalInterpreter<S> {
    /// Creates an interpreter with the default configuration.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, TransactionConfig::default())
    }

    /// Creates an interpreter with the given configuration.
    pub fn with_config(store: Arc<S>, config: TransactionConfig) -> Self {
        Self {
            store,
            config,
            stats: Arc::new(RwLock::new(CommitStats::default())),
        }
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Returns a copy of the counters.
    pub fn stats(&self) -> CommitStats {
        self.stats.read().clone()
    }

    /// Runs the fold only, returning the value and the staged unit of work.
    ///
    /// Reads hit the store; nothing is written.
    pub async fn execute_staged<A>(&self, program: Program<A>) -> FlowResult<(A, UnitOfWork)>
    where
        A: Send + 'static,
    {
        self.fold_with(program, UnitOfWork::new()).await
    }

    /// Folds a program through the given unit of work.
    pub async fn fold_with<A>(
        &self,
        program: Program<A>,
        mut uow: UnitOfWork,
    ) -> FlowResult<(A, UnitOfWork)>
    where
        A: Send + 'static,
    {
        let mut program = program;
        loop {
            match program {
                Program::Done(value) => return Ok((value, uow)),
                Program::Step(op) => program = self.stage(op, &mut uow).await?,
            }
        }
    }

    /// Runs a program and reports how the execution ended.
    pub async fn commit<A>(&self, program: Program<A>) -> CommitOutcome<A>
    where
        A: Send + 'static,
    {
        let start = Instant::now();
        let mut phase = CommitPhase::Idle;
        let mut submitted = 0usize;

        let result = self.run(program, &mut phase, &mut submitted).await;
        let failed_in = result.as_ref().err().map(|_| phase);
        let terminal = match &result {
            Ok(_) => CommitPhase::Committed,
            Err(_) => CommitPhase::Aborted,
        };

        {
            let mut stats = self.stats.write();
            match &result {
                Ok(_) => {
                    stats.committed += 1;
                    stats.requests_submitted += submitted as u64;
                }
                Err(e) => {
                    stats.aborted += 1;
                    stats.last_error = Some(e.to_string());
                }
            }
        }

        match &result {
            Ok(_) => info!("transaction committed with {} writes", submitted),
            Err(e) => warn!("transaction aborted during {:?}: {}", phase, e),
        }

        CommitOutcome {
            result,
            phase: terminal,
            failed_in,
            submitted,
            duration: start.elapsed(),
        }
    }

    async fn run<A>(
        &self,
        program: Program<A>,
        phase: &mut CommitPhase,
        submitted: &mut usize,
    ) -> FlowResult<A>
    where
        A: Send + 'static,
    {
        *phase = CommitPhase::Folding;
        let (value, uow) = self.execute_staged(program).await?;
        let requests = uow.into_pending();

        if requests.len() > self.config.max_bulk_requests {
            return Err(FlowError::BulkLimitExceeded {
                count: requests.len(),
                limit: self.config.max_bulk_requests,
            });
        }
        if requests.is_empty() && !self.config.submit_empty {
            debug!("transaction staged no writes; skipping bulk request");
            return Ok(value);
        }

        *phase = CommitPhase::BulkSubmit;
        debug!("submitting bulk request with {} writes", requests.len());
        self.store.bulk_request(&requests).await?;
        *submitted = requests.len();
        Ok(value)
    }

    async fn stage<K: Send + 'static>(
        &self,
        op: Operation<K>,
        uow: &mut UnitOfWork,
    ) -> FlowResult<K> {
        debug!("transactional {} on app {:?}", op.kind(), op.app());
        let store = self.store.as_ref();
        let next = match op {
            Operation::RunAsync { task, cont } => cont(task.await?),
            Operation::ReadOne { app, id, cont } => {
                let record = fetch_record(store, &app, &id).await?;
                if let Some(record) = &record {
                    uow.record_read(&app, record.clone())?;
                }
                cont(record)
            }
            Operation::ReadMany { query, cont } => {
                let page = store.get_records(&query).await?;
                uow.record_page(&query, &page)?;
                cont(page)
            }
            Operation::Create { app, record, cont } => {
                uow.stage_create(app, record);
                cont(None)
            }
            Operation::Update {
                app,
                record,
                target,
                revision,
                cont,
            } => {
                uow.stage_update(app, record, &target, revision)?;
                cont(None)
            }
            Operation::Delete { app, targets, cont } => {
                uow.stage_delete(app, &targets)?;
                cont(())
            }
        };
        Ok(next)
    }
}

impl<S: RecordStore + ?Sized> Clone for TransactionalInterpreter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

#[async_trait]
impl<S: RecordStore + ?Sized> Interpreter for TransactionalInterpreter<S> {
    async fn execute<A>(&self, program: Program<A>) -> FlowResult<A>
    where
        A: Send + 'static,
    {
        self.commit(program).await.result
    }
}
