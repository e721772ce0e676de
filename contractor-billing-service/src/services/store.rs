//! Storage abstraction consumed by the reconciliation engine.
//!
//! Every read and write of one unit of work goes through a
//! [`StoreTransaction`]; nothing is visible to other requests until
//! [`StoreTransaction::commit`] succeeds.

use crate::models::{Bill, Contractor, JobOpsMaster, Operation, WorkDone};
use async_trait::async_trait;
use mongodb::error::{TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// The backend could not serve the request right now; retrying may succeed.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The commit was sent but its outcome is unknown; it may have applied.
    #[error("Commit outcome unknown: {0}")]
    CommitUnknown(String),

    #[error("Storage error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether re-running the whole unit of work may succeed.
    ///
    /// A commit with an unknown outcome is never transient here: it may have
    /// applied, and only the commit itself can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Mongo(e) => {
                e.contains_label(TRANSIENT_TRANSACTION_ERROR)
                    && !e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
            }
            StoreError::Unavailable(_) => true,
            StoreError::CommitUnknown(_) | StoreError::Backend(_) => false,
        }
    }

    /// Whether re-sending the commit on the same transaction may settle it.
    pub fn is_commit_unknown(&self) -> bool {
        match self {
            StoreError::Mongo(e) => e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT),
            StoreError::CommitUnknown(_) => true,
            StoreError::Unavailable(_) | StoreError::Backend(_) => false,
        }
    }
}

/// Entry point to the billing collections.
#[async_trait]
pub trait BillingStore: Send + Sync {
    type Tx: StoreTransaction;

    /// Open a new transaction scope.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Resolve a contractor by display name (contractor directory).
    async fn find_contractor_by_name(&self, name: &str) -> Result<Option<Contractor>, StoreError>;
}

/// One transaction scope over the billing collections.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Find a non-deleted bill by number.
    async fn find_bill(&mut self, bill_number: &str) -> Result<Option<Bill>, StoreError>;

    async fn find_job_ops(&mut self, job_id: &str) -> Result<Option<JobOpsMaster>, StoreError>;

    async fn find_work_done(
        &mut self,
        contractor_id: &str,
        job_id: &str,
    ) -> Result<Option<WorkDone>, StoreError>;

    /// Batch catalog lookup. Unknown ids are simply absent from the result.
    async fn find_operations_by_ids(&mut self, ids: &[String])
    -> Result<Vec<Operation>, StoreError>;

    async fn find_operation_by_name(&mut self, name: &str)
    -> Result<Option<Operation>, StoreError>;

    /// Insert or replace the bill keyed by its number.
    async fn save_bill(&mut self, bill: &Bill) -> Result<(), StoreError>;

    /// Insert or replace the master record keyed by job id.
    async fn save_job_ops(&mut self, master: &JobOpsMaster) -> Result<(), StoreError>;

    /// Insert or replace the ledger keyed by (contractor, job).
    async fn save_work_done(&mut self, ledger: &WorkDone) -> Result<(), StoreError>;

    async fn delete_work_done(&mut self, contractor_id: &str, job_id: &str)
    -> Result<(), StoreError>;

    /// Commit the transaction. May be called again on the same transaction
    /// after an error for which [`StoreError::is_commit_unknown`] holds.
    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn abort(self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_transient() {
        assert!(StoreError::Unavailable("primary stepped down".to_string()).is_transient());
    }

    #[test]
    fn test_backend_error_is_permanent() {
        let err = StoreError::Backend("document too large".to_string());
        assert!(!err.is_transient());
        assert!(!err.is_commit_unknown());
    }

    #[test]
    fn test_unknown_commit_is_not_a_unit_retry() {
        let err = StoreError::CommitUnknown("connection reset after commit".to_string());
        assert!(err.is_commit_unknown());
        assert!(!err.is_transient());
    }
}
