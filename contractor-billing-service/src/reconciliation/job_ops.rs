//! Pending-quantity adjustments on a job's master record.

use crate::models::{JobOpsMaster, MasterOp};
use crate::reconciliation::delta::OpDelta;
use crate::reconciliation::error::ReconciliationError;
use crate::reconciliation::key::{
    format_rate, normalize, round_to, OperationNames, LEDGER_RATE_PRECISION,
};
use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

/// Slack allowed below zero before a consumption counts as over-commitment.
pub const PENDING_EPSILON: f64 = 1e-6;

/// Delta to carry into the contractor ledger for one master operation.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerAdjustment {
    pub ops_name: String,
    /// Master `valuePerBook`, rounded to ledger precision.
    pub value_per_book: f64,
    pub delta: f64,
}

/// Locate the master op for `(ops_name, rate)` using ledger precision.
pub fn find_master_op(
    master: &JobOpsMaster,
    names: &OperationNames,
    ops_name: &str,
    rate: f64,
) -> Option<usize> {
    let wanted = normalize(&master.job_id, ops_name, rate, LEDGER_RATE_PRECISION);
    master.ops.iter().position(|op| {
        normalize(
            &master.job_id,
            names.name_of(&op.op_id),
            op.value_per_book,
            LEDGER_RATE_PRECISION,
        ) == wanted
    })
}

/// Consume (positive delta) or release (negative delta) pending work.
///
/// Rejects a consumption that would push pending meaningfully below zero;
/// otherwise the result is clamped into `[0, totalOpsQty]`.
pub fn apply_pending_delta(
    job_number: &str,
    ops_name: &str,
    op: &mut MasterOp,
    delta: f64,
    now: DateTime<Utc>,
) -> Result<(), ReconciliationError> {
    let new_pending = op.pending_ops_qty - delta;
    if new_pending < -PENDING_EPSILON {
        return Err(ReconciliationError::InsufficientPendingQuantity {
            job_number: job_number.to_string(),
            ops_name: ops_name.to_string(),
            pending: op.pending_ops_qty,
            requested: delta,
        });
    }

    op.pending_ops_qty = new_pending.max(0.0).min(op.total_ops_qty.max(0.0));
    op.last_updated_date = Some(BsonDateTime::from_chrono(now));
    Ok(())
}

/// Apply every delta of one job to its master record.
///
/// `master` is only meaningful to persist if this returns `Ok`.
pub fn apply_job_deltas(
    master: &mut JobOpsMaster,
    names: &OperationNames,
    deltas: &[OpDelta],
    now: DateTime<Utc>,
) -> Result<Vec<LedgerAdjustment>, ReconciliationError> {
    let mut adjustments = Vec::with_capacity(deltas.len());

    for d in deltas {
        let idx = find_master_op(master, names, &d.ops_name, d.rate).ok_or_else(|| {
            ReconciliationError::OperationNotFoundInMaster {
                job_number: master.job_id.clone(),
                ops_name: d.ops_name.clone(),
                rate: format_rate(d.rate, LEDGER_RATE_PRECISION),
            }
        })?;

        let job_id = master.job_id.clone();
        let op = &mut master.ops[idx];
        apply_pending_delta(&job_id, &d.ops_name, op, d.delta, now)?;

        tracing::debug!(
            job_number = %job_id,
            ops_name = %d.ops_name,
            delta = d.delta,
            pending_ops_qty = op.pending_ops_qty,
            "Adjusted pending quantity"
        );

        adjustments.push(LedgerAdjustment {
            ops_name: d.ops_name.clone(),
            value_per_book: round_to(op.value_per_book, LEDGER_RATE_PRECISION),
            delta: d.delta,
        });
    }

    Ok(adjustments)
}

/// Put back `qty` units of retracted work. Floors at zero; no upper bound.
pub fn restore_pending(op: &mut MasterOp, qty: f64, now: DateTime<Utc>) {
    op.pending_ops_qty = (op.pending_ops_qty + qty).max(0.0);
    op.last_updated_date = Some(BsonDateTime::from_chrono(now));
}
