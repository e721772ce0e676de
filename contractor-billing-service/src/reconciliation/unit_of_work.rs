//! Staged writes over one store transaction.
//!
//! Reads go through the staged state first, so later steps of the same unit
//! of work observe earlier adjustments. Nothing reaches the store until
//! [`UnitOfWork::commit`], which flushes everything and commits as one step.
//! A commit whose outcome is unknown is re-sent on the same transaction and
//! never replayed from the start.

use crate::models::{Bill, JobOpsMaster, WorkDone};
use crate::reconciliation::work_done::LedgerOutcome;
use crate::services::{StoreError, StoreTransaction};
use service_core::retry::RetryConfig;
use std::collections::BTreeMap;

pub struct UnitOfWork<T: StoreTransaction> {
    tx: T,
    bill: Option<Bill>,
    job_ops: BTreeMap<String, JobOpsMaster>,
    ledgers: BTreeMap<(String, String), LedgerOutcome>,
}

impl<T: StoreTransaction> UnitOfWork<T> {
    pub fn new(tx: T) -> Self {
        Self {
            tx,
            bill: None,
            job_ops: BTreeMap::new(),
            ledgers: BTreeMap::new(),
        }
    }

    /// Direct access for reads that are never staged (bills, catalog).
    pub fn tx(&mut self) -> &mut T {
        &mut self.tx
    }

    pub async fn job_ops(&mut self, job_id: &str) -> Result<Option<JobOpsMaster>, StoreError> {
        if let Some(master) = self.job_ops.get(job_id) {
            return Ok(Some(master.clone()));
        }
        self.tx.find_job_ops(job_id).await
    }

    pub async fn work_done(
        &mut self,
        contractor_id: &str,
        job_id: &str,
    ) -> Result<Option<WorkDone>, StoreError> {
        let key = (contractor_id.to_string(), job_id.to_string());
        match self.ledgers.get(&key) {
            Some(LedgerOutcome::Save(ledger)) => Ok(Some(ledger.clone())),
            Some(LedgerOutcome::Delete { .. }) => Ok(None),
            Some(LedgerOutcome::Discard) | None => {
                self.tx.find_work_done(contractor_id, job_id).await
            }
        }
    }

    pub fn stage_bill(&mut self, bill: Bill) {
        self.bill = Some(bill);
    }

    pub fn stage_job_ops(&mut self, master: JobOpsMaster) {
        self.job_ops.insert(master.job_id.clone(), master);
    }

    /// Stage a closed ledger. `Discard` leaves any earlier staged state alone.
    pub fn stage_ledger(&mut self, outcome: LedgerOutcome) {
        let key = match &outcome {
            LedgerOutcome::Save(ledger) => (ledger.contractor_id.clone(), ledger.job_id.clone()),
            LedgerOutcome::Delete {
                contractor_id,
                job_id,
            } => (contractor_id.clone(), job_id.clone()),
            LedgerOutcome::Discard => return,
        };
        self.ledgers.insert(key, outcome);
    }

    /// Number of store writes a commit would issue.
    pub fn pending_writes(&self) -> usize {
        self.job_ops.len() + self.ledgers.len() + usize::from(self.bill.is_some())
    }

    /// Flush every staged write, then commit. A failed flush aborts the
    /// transaction and returns the flush error.
    ///
    /// The commit is re-sent while its outcome is unknown, up to
    /// `retry.max_retries` times.
    pub async fn commit(self, retry: &RetryConfig) -> Result<(), StoreError> {
        let Self {
            mut tx,
            bill,
            job_ops,
            ledgers,
        } = self;

        if let Err(e) = flush(&mut tx, bill.as_ref(), &job_ops, &ledgers).await {
            if let Err(abort_err) = tx.abort().await {
                tracing::warn!(error = %abort_err, "Abort after failed flush also failed");
            }
            return Err(e);
        }

        let mut attempt = 0;
        loop {
            match tx.commit().await {
                Err(e) if e.is_commit_unknown() && attempt < retry.max_retries => {
                    let backoff = retry.backoff_duration(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Commit outcome unknown, re-sending commit"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Drop every staged write and abort the transaction.
    pub async fn rollback(self) {
        if let Err(e) = self.tx.abort().await {
            tracing::warn!(error = %e, "Failed to abort transaction");
        }
    }
}

async fn flush<T: StoreTransaction>(
    tx: &mut T,
    bill: Option<&Bill>,
    job_ops: &BTreeMap<String, JobOpsMaster>,
    ledgers: &BTreeMap<(String, String), LedgerOutcome>,
) -> Result<(), StoreError> {
    for master in job_ops.values() {
        tx.save_job_ops(master).await?;
    }

    for outcome in ledgers.values() {
        match outcome {
            LedgerOutcome::Save(ledger) => tx.save_work_done(ledger).await?,
            LedgerOutcome::Delete {
                contractor_id,
                job_id,
            } => tx.delete_work_done(contractor_id, job_id).await?,
            LedgerOutcome::Discard => {}
        }
    }

    if let Some(bill) = bill {
        tx.save_bill(bill).await?;
    }

    Ok(())
}
