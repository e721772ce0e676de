//! Retraction of a deleted bill's completed work.

use crate::models::{BillJob, JobOpsMaster};
use crate::reconciliation::error::{ErrorCategory, ReconciliationError};
use crate::reconciliation::job_ops::restore_pending;
use crate::reconciliation::key::{format_rate, round_to, LEDGER_RATE_PRECISION};
use crate::reconciliation::unit_of_work::UnitOfWork;
use crate::reconciliation::work_done::LedgerDraft;
use crate::services::{record_ledger_adjustment, StoreTransaction};
use chrono::{DateTime, Utc};

/// A job whose reversal was rolled back.
#[derive(Debug, Clone, PartialEq)]
pub struct ReversalFailure {
    pub job_number: String,
    pub category: ErrorCategory,
    pub reason: String,
}

/// Per-job outcome of reversing one bill.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReversalReport {
    pub bill_number: String,
    pub reversed_jobs: Vec<String>,
    /// Jobs without any completed quantity; nothing to retract.
    pub skipped_jobs: Vec<String>,
    pub failures: Vec<ReversalFailure>,
}

impl ReversalReport {
    pub fn new(bill_number: &str) -> Self {
        Self {
            bill_number: bill_number.to_string(),
            ..Default::default()
        }
    }

    pub fn total_jobs(&self) -> usize {
        self.reversed_jobs.len() + self.skipped_jobs.len() + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Master op for a catalog id, preferring the one priced like the bill line.
fn pick_master_op(master: &JobOpsMaster, op_id: &str, rate: f64) -> Option<usize> {
    let rate_key = format_rate(rate, LEDGER_RATE_PRECISION);
    let mut first = None;
    for (i, op) in master.ops.iter().enumerate() {
        if op.op_id != op_id {
            continue;
        }
        if format_rate(op.value_per_book, LEDGER_RATE_PRECISION) == rate_key {
            return Some(i);
        }
        first.get_or_insert(i);
    }
    first
}

/// Stage the reversal of one bill job into `uow`.
pub(crate) async fn reverse_job<T: StoreTransaction>(
    uow: &mut UnitOfWork<T>,
    contractor_id: &str,
    job: &BillJob,
    now: DateTime<Utc>,
) -> Result<(), ReconciliationError> {
    let job_id = job.job_number.trim();

    let mut master = uow
        .job_ops(job_id)
        .await?
        .ok_or_else(|| ReconciliationError::JobMasterNotFound(job_id.to_string()))?;

    let existing = uow.work_done(contractor_id, job_id).await?;
    let mut draft = LedgerDraft::open(contractor_id, job_id, existing);

    for line in job.ops.iter().filter(|op| op.qty_completed > 0.0) {
        let ops_name = line.ops_name.trim();
        let operation = uow
            .tx()
            .find_operation_by_name(ops_name)
            .await?
            .ok_or_else(|| ReconciliationError::OperationNotFound {
                job_number: job_id.to_string(),
                ops_name: ops_name.to_string(),
                rate: format_rate(line.rate, LEDGER_RATE_PRECISION),
            })?;

        let idx = pick_master_op(&master, &operation.id, line.rate).ok_or_else(|| {
            ReconciliationError::OperationNotFoundInMaster {
                job_number: job_id.to_string(),
                ops_name: ops_name.to_string(),
                rate: format_rate(line.rate, LEDGER_RATE_PRECISION),
            }
        })?;

        let op = &mut master.ops[idx];
        restore_pending(op, line.qty_completed, now);
        if op.pending_ops_qty > op.total_ops_qty {
            tracing::warn!(
                job_number = %job_id,
                ops_name = %ops_name,
                pending_ops_qty = op.pending_ops_qty,
                total_ops_qty = op.total_ops_qty,
                "Restored pending quantity exceeds total"
            );
        }
        record_ledger_adjustment("job_ops", "restored");

        let value_per_book = round_to(op.value_per_book, LEDGER_RATE_PRECISION);
        let action = draft.release(
            &operation.id,
            ops_name,
            value_per_book,
            line.qty_completed,
            now,
        );
        record_ledger_adjustment("work_done", action.as_str());

        tracing::debug!(
            job_number = %job_id,
            ops_name = %ops_name,
            qty = line.qty_completed,
            ledger_action = action.as_str(),
            "Reversed bill line"
        );
    }

    uow.stage_job_ops(master);
    uow.stage_ledger(draft.close());
    Ok(())
}
