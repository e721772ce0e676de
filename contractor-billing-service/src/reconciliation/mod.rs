//! Quantity reconciliation between bills, job masters and contractor ledgers.

pub mod delta;
pub mod error;
pub mod job_ops;
pub mod key;
pub mod orchestrator;
pub mod reversal;
pub mod unit_of_work;
pub mod work_done;

pub use delta::{compute_deltas, JobDeltas, OpDelta, QuantityChange};
pub use error::{ErrorCategory, ReconciliationError};
pub use job_ops::{LedgerAdjustment, PENDING_EPSILON};
pub use key::{
    normalize, OpKey, OperationNames, BILL_RATE_PRECISION, LEDGER_RATE_PRECISION,
    UNKNOWN_OPERATION,
};
pub use orchestrator::{BillReconciler, EditPhase};
pub use reversal::{ReversalFailure, ReversalReport};
pub use unit_of_work::UnitOfWork;
pub use work_done::{LedgerAction, LedgerDraft, LedgerOutcome};
