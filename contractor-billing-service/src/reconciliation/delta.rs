//! Signed completed-quantity deltas between a bill and a change request.

use crate::models::Bill;
use crate::reconciliation::error::ReconciliationError;
use crate::reconciliation::key::{format_rate, normalize, OpKey, BILL_RATE_PRECISION};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Requested completed quantity for one bill line.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuantityChange {
    #[validate(custom(function = "not_blank", message = "Job number is required"))]
    pub job_number: String,
    #[validate(custom(function = "not_blank", message = "Operation name is required"))]
    pub ops_name: String,
    pub rate: f64,
    pub new_qty_completed: f64,
}

/// Net change for one operation of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct OpDelta {
    pub ops_name: String,
    pub rate: f64,
    pub delta: f64,
}

/// All operation deltas of one job, in first-appearance order.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDeltas {
    pub job_number: String,
    pub ops: Vec<OpDelta>,
}

/// Apply `changes` to the in-memory `bill` and return the per-job deltas.
///
/// Lines are located with the bill-internal precision. Repeated requests for
/// one line are applied in order and their deltas summed; deltas that net to
/// zero are dropped. Nothing outside `bill` is touched, so a failure leaves
/// no effect beyond the caller's copy.
pub fn compute_deltas(
    bill: &mut Bill,
    changes: &[QuantityChange],
) -> Result<Vec<JobDeltas>, ReconciliationError> {
    let mut grouped: Vec<(JobDeltas, Vec<OpKey>)> = Vec::new();

    for change in changes {
        let wanted = normalize(
            &change.job_number,
            &change.ops_name,
            change.rate,
            BILL_RATE_PRECISION,
        );

        let line = bill
            .jobs
            .iter_mut()
            .filter(|job| job.job_number.trim() == wanted.job)
            .flat_map(|job| job.ops.iter_mut())
            .find(|op| {
                normalize(&wanted.job, &op.ops_name, op.rate, BILL_RATE_PRECISION) == wanted
            })
            .ok_or_else(|| ReconciliationError::OperationNotFound {
                job_number: wanted.job.clone(),
                ops_name: wanted.name.clone(),
                rate: format_rate(change.rate, BILL_RATE_PRECISION),
            })?;

        let new_qty = change.new_qty_completed;
        if !new_qty.is_finite() || new_qty < 0.0 {
            return Err(ReconciliationError::InvalidQuantity {
                job_number: wanted.job,
                ops_name: wanted.name,
                value: new_qty,
            });
        }

        let delta = new_qty - line.qty_completed;
        if delta == 0.0 {
            continue;
        }

        let rate = line.rate;
        line.set_qty_completed(new_qty);

        let slot = match grouped.iter().position(|(j, _)| j.job_number == wanted.job) {
            Some(i) => i,
            None => {
                grouped.push((
                    JobDeltas {
                        job_number: wanted.job.clone(),
                        ops: Vec::new(),
                    },
                    Vec::new(),
                ));
                grouped.len() - 1
            }
        };
        let (job_deltas, keys) = &mut grouped[slot];

        match keys.iter().position(|k| *k == wanted) {
            Some(i) => job_deltas.ops[i].delta += delta,
            None => {
                job_deltas.ops.push(OpDelta {
                    ops_name: wanted.name.clone(),
                    rate,
                    delta,
                });
                keys.push(wanted);
            }
        }
    }

    Ok(grouped
        .into_iter()
        .filter_map(|(mut job, _)| {
            job.ops.retain(|op| op.delta != 0.0);
            (!job.ops.is_empty()).then_some(job)
        })
        .collect())
}
