//! MongoDB implementation of the billing store.
//!
//! Each [`MongoTransaction`] owns a client session with an open
//! multi-document transaction; all reads and writes go through it.

use crate::models::{Bill, Contractor, JobOpsMaster, Operation, WorkDone};
use crate::services::database::MongoDb;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{BillingStore, StoreError, StoreTransaction};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    options::{Acknowledgment, ReadConcern, ReplaceOptions, TransactionOptions, WriteConcern},
    ClientSession,
};
use tracing::instrument;

#[derive(Clone)]
pub struct MongoStore {
    db: MongoDb,
}

impl MongoStore {
    pub fn new(db: MongoDb) -> Self {
        Self { db }
    }
}

pub struct MongoTransaction {
    db: MongoDb,
    session: ClientSession,
}

fn upsert() -> ReplaceOptions {
    ReplaceOptions::builder().upsert(true).build()
}

#[async_trait]
impl BillingStore for MongoStore {
    type Tx = MongoTransaction;

    #[instrument(skip(self))]
    async fn begin(&self) -> Result<MongoTransaction, StoreError> {
        let mut session = self.db.client().start_session(None).await.map_err(|e| {
            tracing::error!("Failed to start MongoDB session: {}", e);
            StoreError::from(e)
        })?;

        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session.start_transaction(options).await.map_err(|e| {
            tracing::error!("Failed to start MongoDB transaction: {}", e);
            StoreError::from(e)
        })?;

        Ok(MongoTransaction {
            db: self.db.clone(),
            session,
        })
    }

    #[instrument(skip(self))]
    async fn find_contractor_by_name(&self, name: &str) -> Result<Option<Contractor>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_contractor_by_name"])
            .start_timer();

        let contractor = self
            .db
            .contractors()
            .find_one(doc! { "name": name }, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to find contractor: {}", e);
                StoreError::from(e)
            })?;

        timer.observe_duration();
        Ok(contractor)
    }
}

#[async_trait]
impl StoreTransaction for MongoTransaction {
    #[instrument(skip(self))]
    async fn find_bill(&mut self, bill_number: &str) -> Result<Option<Bill>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_bill"])
            .start_timer();

        let bill = self
            .db
            .bills()
            .find_one_with_session(
                doc! { "billNumber": bill_number, "isDeleted": { "$ne": true } },
                None,
                &mut self.session,
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to find bill: {}", e);
                StoreError::from(e)
            })?;

        timer.observe_duration();
        Ok(bill)
    }

    #[instrument(skip(self))]
    async fn find_job_ops(&mut self, job_id: &str) -> Result<Option<JobOpsMaster>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_job_ops"])
            .start_timer();

        let master = self
            .db
            .job_ops()
            .find_one_with_session(doc! { "jobId": job_id }, None, &mut self.session)
            .await
            .map_err(|e| {
                tracing::error!("Failed to find job ops master: {}", e);
                StoreError::from(e)
            })?;

        timer.observe_duration();
        Ok(master)
    }

    #[instrument(skip(self))]
    async fn find_work_done(
        &mut self,
        contractor_id: &str,
        job_id: &str,
    ) -> Result<Option<WorkDone>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_work_done"])
            .start_timer();

        let ledger = self
            .db
            .work_done()
            .find_one_with_session(
                doc! { "contractorId": contractor_id, "jobId": job_id },
                None,
                &mut self.session,
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to find contractor work done: {}", e);
                StoreError::from(e)
            })?;

        timer.observe_duration();
        Ok(ledger)
    }

    #[instrument(skip(self, ids), fields(id_count = ids.len()))]
    async fn find_operations_by_ids(
        &mut self,
        ids: &[String],
    ) -> Result<Vec<Operation>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_operations_by_ids"])
            .start_timer();

        let mut cursor = self
            .db
            .operations()
            .find_with_session(doc! { "_id": { "$in": ids.to_vec() } }, None, &mut self.session)
            .await
            .map_err(|e| {
                tracing::error!("Failed to query operations: {}", e);
                StoreError::from(e)
            })?;

        let operations: Vec<Operation> = cursor
            .stream(&mut self.session)
            .try_collect()
            .await
            .map_err(|e| {
                tracing::error!("Failed to read operations cursor: {}", e);
                StoreError::from(e)
            })?;

        timer.observe_duration();
        Ok(operations)
    }

    #[instrument(skip(self))]
    async fn find_operation_by_name(
        &mut self,
        name: &str,
    ) -> Result<Option<Operation>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_operation_by_name"])
            .start_timer();

        let operation = self
            .db
            .operations()
            .find_one_with_session(doc! { "name": name }, None, &mut self.session)
            .await
            .map_err(|e| {
                tracing::error!("Failed to find operation: {}", e);
                StoreError::from(e)
            })?;

        timer.observe_duration();
        Ok(operation)
    }

    #[instrument(skip(self, bill), fields(bill_number = %bill.bill_number))]
    async fn save_bill(&mut self, bill: &Bill) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_bill"])
            .start_timer();

        self.db
            .bills()
            .replace_one_with_session(
                doc! { "billNumber": &bill.bill_number },
                bill,
                upsert(),
                &mut self.session,
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to save bill: {}", e);
                StoreError::from(e)
            })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, master), fields(job_id = %master.job_id))]
    async fn save_job_ops(&mut self, master: &JobOpsMaster) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_job_ops"])
            .start_timer();

        self.db
            .job_ops()
            .replace_one_with_session(
                doc! { "jobId": &master.job_id },
                master,
                upsert(),
                &mut self.session,
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to save job ops master: {}", e);
                StoreError::from(e)
            })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(
        skip(self, ledger),
        fields(contractor_id = %ledger.contractor_id, job_id = %ledger.job_id)
    )]
    async fn save_work_done(&mut self, ledger: &WorkDone) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_work_done"])
            .start_timer();

        self.db
            .work_done()
            .replace_one_with_session(
                doc! { "contractorId": &ledger.contractor_id, "jobId": &ledger.job_id },
                ledger,
                upsert(),
                &mut self.session,
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to save contractor work done: {}", e);
                StoreError::from(e)
            })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_work_done(
        &mut self,
        contractor_id: &str,
        job_id: &str,
    ) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_work_done"])
            .start_timer();

        self.db
            .work_done()
            .delete_one_with_session(
                doc! { "contractorId": contractor_id, "jobId": job_id },
                None,
                &mut self.session,
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete contractor work done: {}", e);
                StoreError::from(e)
            })?;

        timer.observe_duration();
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.session.commit_transaction().await.map_err(|e| {
            tracing::error!("Failed to commit transaction: {}", e);
            StoreError::from(e)
        })
    }

    async fn abort(mut self) -> Result<(), StoreError> {
        self.session.abort_transaction().await.map_err(|e| {
            tracing::warn!("Failed to abort transaction: {}", e);
            StoreError::from(e)
        })
    }
}
