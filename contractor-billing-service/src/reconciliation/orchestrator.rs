//! Bill edit and bill delete reconciliation.
//!
//! An edit runs as one unit of work: every master and ledger adjustment plus
//! the rewritten bill commits together, or none of it does. A delete runs one
//! unit of work per job so that one bad job does not block the others.

use crate::models::{Bill, BillJob};
use crate::reconciliation::delta::{compute_deltas, JobDeltas, QuantityChange};
use crate::reconciliation::error::ReconciliationError;
use crate::reconciliation::job_ops::apply_job_deltas;
use crate::reconciliation::key::OperationNames;
use crate::reconciliation::reversal::{reverse_job, ReversalFailure, ReversalReport};
use crate::reconciliation::unit_of_work::UnitOfWork;
use crate::reconciliation::work_done::LedgerDraft;
use crate::services::{
    record_error, record_ledger_adjustment, record_reconciliation, BillingStore, StoreError,
    StoreTransaction,
};
use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use service_core::retry::{retry_async, RetryConfig};
use tracing::instrument;
use validator::Validate;

/// Progress of one edit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhase {
    Validating,
    Adjusting,
    Committing,
    Done,
    Aborted,
}

impl EditPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Adjusting => "adjusting",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

fn advance(bill_number: &str, phase: &mut EditPhase, next: EditPhase) {
    tracing::debug!(
        bill_number = %bill_number,
        from = phase.as_str(),
        to = next.as_str(),
        "Edit phase transition"
    );
    *phase = next;
}

enum EditOutcome {
    Committed(Bill),
    Unchanged(Bill),
}

pub struct BillReconciler<S: BillingStore> {
    store: S,
    retry: RetryConfig,
}

impl<S: BillingStore> BillReconciler<S> {
    pub fn new(store: S, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Set new completed quantities on a bill and propagate the deltas to
    /// the job masters and the contractor's ledgers.
    ///
    /// Returns the bill as stored afterwards. A request that changes nothing
    /// returns the current bill without writing.
    #[instrument(skip(self, changes), fields(change_count = changes.len()))]
    pub async fn edit_bill_quantities(
        &self,
        bill_number: &str,
        contractor_id: &str,
        changes: &[QuantityChange],
    ) -> Result<Bill, ReconciliationError> {
        let result = retry_async(
            &self.retry,
            "edit_bill_quantities",
            ReconciliationError::is_transient,
            || self.try_edit(bill_number, contractor_id, changes),
        )
        .await;

        match result {
            Ok(EditOutcome::Committed(bill)) => {
                record_reconciliation("edit", "committed");
                tracing::info!(bill_number = %bill_number, "Bill quantities updated");
                Ok(bill)
            }
            Ok(EditOutcome::Unchanged(bill)) => {
                record_reconciliation("edit", "unchanged");
                tracing::info!(bill_number = %bill_number, "Bill quantities unchanged");
                Ok(bill)
            }
            Err(e) => {
                record_reconciliation("edit", "failed");
                record_error(e.kind(), "edit");
                tracing::warn!(bill_number = %bill_number, error = %e, "Bill edit rejected");
                Err(e)
            }
        }
    }

    async fn try_edit(
        &self,
        bill_number: &str,
        contractor_id: &str,
        changes: &[QuantityChange],
    ) -> Result<EditOutcome, ReconciliationError> {
        let mut phase = EditPhase::Validating;
        let mut uow = UnitOfWork::new(self.store.begin().await?);
        let now = Utc::now();

        let staged = match self
            .stage_edit(&mut uow, &mut phase, bill_number, contractor_id, changes, now)
            .await
        {
            Ok(staged) => staged,
            Err(e) => {
                tracing::debug!(
                    bill_number = %bill_number,
                    phase = phase.as_str(),
                    error = %e,
                    "Edit aborted"
                );
                advance(bill_number, &mut phase, EditPhase::Aborted);
                uow.rollback().await;
                return Err(e);
            }
        };

        let mut bill = match staged {
            EditOutcome::Unchanged(bill) => {
                uow.rollback().await;
                advance(bill_number, &mut phase, EditPhase::Done);
                return Ok(EditOutcome::Unchanged(bill));
            }
            EditOutcome::Committed(bill) => bill,
        };

        advance(bill_number, &mut phase, EditPhase::Committing);
        let pruned = bill.prune_empty_lines();
        bill.updated_at = Some(BsonDateTime::from_chrono(now));
        uow.stage_bill(bill.clone());

        let writes = uow.pending_writes();
        if let Err(e) = uow.commit(&self.retry).await {
            tracing::debug!(
                bill_number = %bill_number,
                phase = phase.as_str(),
                error = %e,
                "Edit aborted"
            );
            advance(bill_number, &mut phase, EditPhase::Aborted);
            return Err(e.into());
        }

        advance(bill_number, &mut phase, EditPhase::Done);
        tracing::debug!(
            bill_number = %bill_number,
            writes = writes,
            pruned_lines = pruned,
            "Edit committed"
        );
        Ok(EditOutcome::Committed(bill))
    }

    async fn stage_edit(
        &self,
        uow: &mut UnitOfWork<S::Tx>,
        phase: &mut EditPhase,
        bill_number: &str,
        contractor_id: &str,
        changes: &[QuantityChange],
        now: DateTime<Utc>,
    ) -> Result<EditOutcome, ReconciliationError> {
        let bill_number = bill_number.trim();
        let mut bill = uow
            .tx()
            .find_bill(bill_number)
            .await?
            .ok_or_else(|| ReconciliationError::BillNotFound(bill_number.to_string()))?;

        if bill.is_paid() {
            return Err(ReconciliationError::BillAlreadyPaid(bill.bill_number));
        }

        let contractor_id = contractor_id.trim();
        if contractor_id.is_empty() {
            return Err(ReconciliationError::Validation(
                "Contractor id is required".to_string(),
            ));
        }
        if changes.is_empty() {
            return Err(ReconciliationError::Validation(
                "At least one quantity change is required".to_string(),
            ));
        }
        for change in changes {
            change.validate()?;
        }

        let current = bill.clone();
        let deltas = compute_deltas(&mut bill, changes)?;
        if deltas.is_empty() {
            return Ok(EditOutcome::Unchanged(current));
        }

        advance(bill_number, phase, EditPhase::Adjusting);
        for job in &deltas {
            stage_job_adjustment(uow, contractor_id, job, now).await?;
        }

        Ok(EditOutcome::Committed(bill))
    }

    /// Retract everything a deleted bill had recorded.
    ///
    /// Jobs are reversed independently. If any job fails the others still
    /// commit and the result is [`ReconciliationError::PartialReversal`].
    #[instrument(
        skip(self, bill),
        fields(bill_number = %bill.bill_number, job_count = bill.jobs.len())
    )]
    pub async fn reverse_bill_on_delete(
        &self,
        bill: &Bill,
    ) -> Result<ReversalReport, ReconciliationError> {
        let contractor_name = bill.contractor_name.trim();
        let contractor = retry_async(
            &self.retry,
            "find_contractor_by_name",
            StoreError::is_transient,
            || self.store.find_contractor_by_name(contractor_name),
        )
        .await
        .map_err(ReconciliationError::from)
        .and_then(|found| {
            found.ok_or_else(|| {
                ReconciliationError::ContractorNotFound(contractor_name.to_string())
            })
        });

        let contractor = match contractor {
            Ok(c) => c,
            Err(e) => {
                record_reconciliation("reverse", "failed");
                record_error(e.kind(), "reverse");
                tracing::warn!(error = %e, "Bill reversal rejected");
                return Err(e);
            }
        };

        let mut report = ReversalReport::new(&bill.bill_number);

        for job in &bill.jobs {
            let job_number = job.job_number.trim().to_string();
            if !job.ops.iter().any(|op| op.qty_completed > 0.0) {
                report.skipped_jobs.push(job_number);
                continue;
            }

            let result = retry_async(
                &self.retry,
                "reverse_job",
                ReconciliationError::is_transient,
                || self.try_reverse_job(&contractor.id, job),
            )
            .await;

            match result {
                Ok(()) => report.reversed_jobs.push(job_number),
                Err(e) => {
                    record_error(e.kind(), "reverse");
                    tracing::warn!(
                        job_number = %job_number,
                        error = %e,
                        "Job reversal rolled back"
                    );
                    report.failures.push(ReversalFailure {
                        job_number,
                        category: e.category(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if report.is_complete() {
            record_reconciliation("reverse", "completed");
            tracing::info!(
                reversed = report.reversed_jobs.len(),
                skipped = report.skipped_jobs.len(),
                "Bill reversal completed"
            );
            Ok(report)
        } else {
            record_reconciliation("reverse", "partial");
            tracing::warn!(
                reversed = report.reversed_jobs.len(),
                failed = report.failures.len(),
                "Bill reversal incomplete"
            );
            Err(ReconciliationError::PartialReversal(report))
        }
    }

    async fn try_reverse_job(
        &self,
        contractor_id: &str,
        job: &BillJob,
    ) -> Result<(), ReconciliationError> {
        let mut uow = UnitOfWork::new(self.store.begin().await?);

        if let Err(e) = reverse_job(&mut uow, contractor_id, job, Utc::now()).await {
            uow.rollback().await;
            return Err(e);
        }

        uow.commit(&self.retry).await?;
        Ok(())
    }
}

/// Stage the master and ledger adjustments for one job's deltas.
async fn stage_job_adjustment<T: StoreTransaction>(
    uow: &mut UnitOfWork<T>,
    contractor_id: &str,
    job: &JobDeltas,
    now: DateTime<Utc>,
) -> Result<(), ReconciliationError> {
    let mut master = uow
        .job_ops(&job.job_number)
        .await?
        .ok_or_else(|| ReconciliationError::JobMasterNotFound(job.job_number.clone()))?;

    let catalog = uow.tx().find_operations_by_ids(&master.op_ids()).await?;
    let names = OperationNames::from_catalog(catalog);

    let adjustments = apply_job_deltas(&mut master, &names, &job.ops, now)?;
    for d in &job.ops {
        record_ledger_adjustment("job_ops", if d.delta > 0.0 { "consumed" } else { "released" });
    }

    let existing = uow.work_done(contractor_id, &job.job_number).await?;
    let mut draft = LedgerDraft::open(contractor_id, &job.job_number, existing);
    for adjustment in &adjustments {
        let action = draft.apply(adjustment, now);
        record_ledger_adjustment("work_done", action.as_str());
        tracing::debug!(
            job_number = %job.job_number,
            contractor_id = %contractor_id,
            ops_name = %adjustment.ops_name,
            delta = adjustment.delta,
            ledger_action = action.as_str(),
            "Adjusted contractor ledger"
        );
    }

    uow.stage_job_ops(master);
    uow.stage_ledger(draft.close());
    Ok(())
}
