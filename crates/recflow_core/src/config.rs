//! Configuration for the transactional interpreter.

/// Default number of writes one bulk request may carry.
pub const DEFAULT_MAX_BULK_REQUESTS: usize = 20;

/// Configuration for transactional commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Maximum number of staged writes submitted in one bulk request.
    pub max_bulk_requests: usize,
    /// Whether an execution that staged no writes still issues a bulk call.
    pub submit_empty: bool,
}

impl TransactionConfig {
    /// Creates a configuration with the default limits.
    pub fn new() -> Self {
        Self {
            max_bulk_requests: DEFAULT_MAX_BULK_REQUESTS,
            submit_empty: false,
        }
    }

    /// Sets the bulk request limit.
    pub fn with_max_bulk_requests(mut self, max: usize) -> Self {
        self.max_bulk_requests = max;
        self
    }

    /// Removes the bulk request limit.
    pub fn unlimited(mut self) -> Self {
        self.max_bulk_requests = usize::MAX;
        self
    }

    /// Makes executions without writes still issue an (empty) bulk call.
    pub fn with_submit_empty(mut self, submit: bool) -> Self {
        self.submit_empty = submit;
        self
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self::new()
    }
}
