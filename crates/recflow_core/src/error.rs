//! Error types for program execution.

use recflow_protocol::{AppId, ProtocolError, RecordId};
use thiserror::Error;

/// Result type for program execution.
pub type FlowResult<T> = Result<T, FlowError>;

/// Result type for backing-store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by the backing store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("record {id} not found in app {app}")]
    NotFound {
        /// App searched.
        app: String,
        /// Record id searched.
        id: String,
    },

    /// A revision precondition failed.
    #[error("revision conflict: {message}")]
    Conflict {
        /// Store message.
        message: String,
    },

    /// The store rejected the request.
    #[error("store rejected request ({code}): {message}")]
    Rejected {
        /// Store error code.
        code: String,
        /// Store message.
        message: String,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the call can be retried.
        retryable: bool,
    },

    /// Response could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(app: &AppId, id: &RecordId) -> Self {
        Self::NotFound {
            app: app.to_string(),
            id: id.to_string(),
        }
    }

    /// Creates a revision conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a rejection error.
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Returns true for not-found errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Returns true for revision conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Returns true if the call can be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

/// Errors that abort a program execution.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Backing-store failure, propagated unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A write targeted a record that was not read in this execution.
    #[error("record {key} in app {app} must be read before it is written")]
    ReadBeforeWrite {
        /// Target app.
        app: AppId,
        /// Id or update key that could not be resolved.
        key: String,
    },

    /// A delete named records that were not read in this execution.
    #[error("records with revisions not found in app {app} for ids: {}", join_ids(.ids))]
    UnresolvedDelete {
        /// Target app.
        app: AppId,
        /// Ids without a snapshot or explicit revision.
        ids: Vec<RecordId>,
    },

    /// An update supplied neither an id nor an update key.
    #[error("update in app {app} needs a record id or an update key")]
    MissingUpdateTarget {
        /// Target app.
        app: AppId,
    },

    /// A record that must carry an id did not.
    #[error("record returned from app {app} has no id")]
    MissingRecordId {
        /// Source app.
        app: AppId,
    },

    /// A snapshot matched but carries no revision.
    #[error("record {id} in app {app} has no revision")]
    MissingRevision {
        /// Target app.
        app: AppId,
        /// Record id.
        id: RecordId,
    },

    /// A record already has an update or delete staged in this execution.
    #[error("record {id} in app {app} already has a staged write")]
    AlreadyWritten {
        /// Target app.
        app: AppId,
        /// Record id.
        id: RecordId,
    },

    /// The staged writes exceed what one bulk request may carry.
    #[error("bulk request of {count} writes exceeds the limit of {limit}")]
    BulkLimitExceeded {
        /// Staged writes.
        count: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A caller-supplied async computation failed.
    #[error("task failed: {0}")]
    Task(String),

    /// Wire encoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl FlowError {
    /// Creates a task error.
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task(message.into())
    }

    /// Returns true for local invariant violations.
    ///
    /// These are raised before anything is sent to the store and are never
    /// worth retrying.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            FlowError::ReadBeforeWrite { .. }
                | FlowError::UnresolvedDelete { .. }
                | FlowError::MissingUpdateTarget { .. }
                | FlowError::MissingRecordId { .. }
                | FlowError::MissingRevision { .. }
                | FlowError::AlreadyWritten { .. }
                | FlowError::BulkLimitExceeded { .. }
        )
    }

    /// Returns the store error, if this is one.
    pub fn as_store(&self) -> Option<&StoreError> {
        match self {
            FlowError::Store(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if the store rejected a revision precondition.
    pub fn is_conflict(&self) -> bool {
        self.as_store().is_some_and(StoreError::is_conflict)
    }
}

fn join_ids(ids: &[RecordId]) -> String {
    ids.iter()
        .map(RecordId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
