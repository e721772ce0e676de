//! Common test utilities for contractor-billing-service integration tests.
//!
//! [`MemoryStore`] is an in-process [`BillingStore`]: every transaction works
//! on its own copy of the collections and publishes it on commit, so an
//! aborted unit of work leaves no trace.

#![allow(dead_code)]

use async_trait::async_trait;
use contractor_billing_service::models::{
    Bill, BillJob, BillOp, Contractor, JobOpsMaster, MasterOp, Operation, OpsDone, WorkDone,
};
use contractor_billing_service::reconciliation::{BillReconciler, QuantityChange};
use contractor_billing_service::services::{BillingStore, StoreError, StoreTransaction};
use service_core::retry::RetryConfig;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,contractor_billing_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const CONTRACTOR_ID: &str = "c-acme";
pub const CONTRACTOR_NAME: &str = "Acme Drilling";
pub const BILL_NUMBER: &str = "B-100";

/// Contents of every collection.
#[derive(Debug, Clone, Default)]
pub struct Collections {
    pub bills: BTreeMap<String, Bill>,
    pub job_ops: BTreeMap<String, JobOpsMaster>,
    pub work_done: BTreeMap<(String, String), WorkDone>,
    pub operations: Vec<Operation>,
    pub contractors: Vec<Contractor>,
}

impl Collections {
    pub fn bill(&self, bill_number: &str) -> &Bill {
        &self.bills[bill_number]
    }

    pub fn master_op(&self, job_id: &str, op_id: &str) -> &MasterOp {
        self.job_ops[job_id]
            .ops
            .iter()
            .find(|op| op.op_id == op_id)
            .expect("master op present")
    }

    pub fn ledger(&self, contractor_id: &str, job_id: &str) -> Option<&WorkDone> {
        self.work_done
            .get(&(contractor_id.to_string(), job_id.to_string()))
    }

    pub fn ledger_qty(&self, contractor_id: &str, job_id: &str, ops_name: &str) -> Option<f64> {
        self.ledger(contractor_id, job_id)?
            .ops_done
            .iter()
            .find(|e| e.ops_name == ops_name)
            .map(|e| e.ops_done_qty)
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// Permanent failure when saving this job's master record.
    job_ops_save: Option<String>,
    /// Number of upcoming commits that fail as unavailable.
    transient_commits: usize,
    /// Number of upcoming commit calls that apply but report an unknown outcome.
    lost_commit_acks: usize,
    /// Every commit fails as unavailable.
    unavailable: bool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<Collections>>,
    faults: Arc<Mutex<Faults>>,
    writes: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
    begins: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new(collections: Collections) -> Self {
        Self {
            data: Arc::new(Mutex::new(collections)),
            ..Default::default()
        }
    }

    /// Committed state.
    pub fn snapshot(&self) -> Collections {
        self.data.lock().unwrap().clone()
    }

    /// Save and delete calls issued, committed or not.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn fail_job_ops_save(&self, job_id: &str) {
        self.faults.lock().unwrap().job_ops_save = Some(job_id.to_string());
    }

    pub fn fail_next_commits(&self, count: usize) {
        self.faults.lock().unwrap().transient_commits = count;
    }

    /// The next `count` commit calls publish their writes, then fail as if
    /// the acknowledgement was lost.
    pub fn lose_next_commit_acks(&self, count: usize) {
        self.faults.lock().unwrap().lost_commit_acks = count;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unwrap().unavailable = unavailable;
    }
}

pub struct MemoryTransaction {
    working: Collections,
    store: MemoryStore,
    committed: bool,
}

impl MemoryTransaction {
    fn record_write(&self) {
        self.store.writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Make the working copy the committed state, once per transaction.
    fn publish(&mut self) {
        if self.committed {
            return;
        }
        *self.store.data.lock().unwrap() = self.working.clone();
        self.store.commits.fetch_add(1, Ordering::SeqCst);
        self.committed = true;
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTransaction {
            working: self.snapshot(),
            store: self.clone(),
            committed: false,
        })
    }

    async fn find_contractor_by_name(&self, name: &str) -> Result<Option<Contractor>, StoreError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .contractors
            .iter()
            .find(|c| c.name == name)
            .cloned())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_bill(&mut self, bill_number: &str) -> Result<Option<Bill>, StoreError> {
        Ok(self
            .working
            .bills
            .get(bill_number)
            .filter(|b| !b.is_deleted)
            .cloned())
    }

    async fn find_job_ops(&mut self, job_id: &str) -> Result<Option<JobOpsMaster>, StoreError> {
        Ok(self.working.job_ops.get(job_id).cloned())
    }

    async fn find_work_done(
        &mut self,
        contractor_id: &str,
        job_id: &str,
    ) -> Result<Option<WorkDone>, StoreError> {
        Ok(self
            .working
            .work_done
            .get(&(contractor_id.to_string(), job_id.to_string()))
            .cloned())
    }

    async fn find_operations_by_ids(
        &mut self,
        ids: &[String],
    ) -> Result<Vec<Operation>, StoreError> {
        Ok(self
            .working
            .operations
            .iter()
            .filter(|op| ids.contains(&op.id))
            .cloned()
            .collect())
    }

    async fn find_operation_by_name(
        &mut self,
        name: &str,
    ) -> Result<Option<Operation>, StoreError> {
        Ok(self
            .working
            .operations
            .iter()
            .find(|op| op.name == name)
            .cloned())
    }

    async fn save_bill(&mut self, bill: &Bill) -> Result<(), StoreError> {
        self.record_write();
        self.working
            .bills
            .insert(bill.bill_number.clone(), bill.clone());
        Ok(())
    }

    async fn save_job_ops(&mut self, master: &JobOpsMaster) -> Result<(), StoreError> {
        self.record_write();
        let failing = self.store.faults.lock().unwrap().job_ops_save.clone();
        if failing.as_deref() == Some(master.job_id.as_str()) {
            return Err(StoreError::Backend(format!(
                "write rejected for job {}",
                master.job_id
            )));
        }
        self.working
            .job_ops
            .insert(master.job_id.clone(), master.clone());
        Ok(())
    }

    async fn save_work_done(&mut self, ledger: &WorkDone) -> Result<(), StoreError> {
        self.record_write();
        assert!(
            !ledger.ops_done.is_empty(),
            "empty ledger handed to the store"
        );
        self.working.work_done.insert(
            (ledger.contractor_id.clone(), ledger.job_id.clone()),
            ledger.clone(),
        );
        Ok(())
    }

    async fn delete_work_done(
        &mut self,
        contractor_id: &str,
        job_id: &str,
    ) -> Result<(), StoreError> {
        self.record_write();
        self.working
            .work_done
            .remove(&(contractor_id.to_string(), job_id.to_string()));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let lose_ack = {
            let mut faults = self.store.faults.lock().unwrap();
            if faults.unavailable {
                return Err(StoreError::Unavailable("primary unreachable".to_string()));
            }
            if faults.transient_commits > 0 {
                faults.transient_commits -= 1;
                return Err(StoreError::Unavailable("write conflict".to_string()));
            }
            if faults.lost_commit_acks > 0 {
                faults.lost_commit_acks -= 1;
                true
            } else {
                false
            }
        };

        self.publish();
        if lose_ack {
            return Err(StoreError::CommitUnknown("connection reset".to_string()));
        }
        Ok(())
    }

    async fn abort(self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Retry policy with negligible backoff.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        add_jitter: false,
    }
}

pub fn reconciler(store: &MemoryStore) -> BillReconciler<MemoryStore> {
    init_tracing();
    BillReconciler::new(store.clone(), fast_retry())
}

pub fn change(job: &str, ops_name: &str, rate: f64, qty: f64) -> QuantityChange {
    QuantityChange {
        job_number: job.to_string(),
        ops_name: ops_name.to_string(),
        rate,
        new_qty_completed: qty,
    }
}

pub fn bill_line(ops_name: &str, rate: f64, qty: f64) -> BillOp {
    BillOp {
        ops_name: ops_name.to_string(),
        qty_book: 20.0,
        rate,
        qty_completed: qty,
        total_value: rate * qty,
    }
}

pub fn master_op(op_id: &str, vpb: f64, total: f64, pending: f64) -> MasterOp {
    MasterOp {
        op_id: op_id.to_string(),
        value_per_book: vpb,
        total_ops_qty: total,
        pending_ops_qty: pending,
        last_updated_date: None,
    }
}

pub fn ledger_entry(ops_id: Option<&str>, ops_name: &str, vpb: f64, qty: f64) -> OpsDone {
    OpsDone {
        ops_id: ops_id.map(str::to_string),
        ops_name: ops_name.to_string(),
        value_per_book: vpb,
        ops_done_qty: qty,
        completion_date: None,
    }
}

/// One unpaid bill over two jobs, with masters and ledgers consistent with it.
///
/// - J1: Drilling @10 x5, Cutting @2.5 x4
/// - J2: Binding @7 x2
pub fn sample_collections() -> Collections {
    let bill = Bill {
        id: Some("bill-1".to_string()),
        bill_number: BILL_NUMBER.to_string(),
        contractor_name: CONTRACTOR_NAME.to_string(),
        payment_status: "No".to_string(),
        payment_date: None,
        room_rent: 500.0,
        is_deleted: false,
        jobs: vec![
            BillJob {
                job_number: "J1".to_string(),
                client_name: "Northwind".to_string(),
                job_title: "Catalogue".to_string(),
                ops: vec![bill_line("Drilling", 10.0, 5.0), bill_line("Cutting", 2.5, 4.0)],
            },
            BillJob {
                job_number: "J2".to_string(),
                client_name: "Northwind".to_string(),
                job_title: "Annual report".to_string(),
                ops: vec![bill_line("Binding", 7.0, 2.0)],
            },
        ],
        updated_at: None,
    };

    let mut c = Collections::default();
    c.bills.insert(BILL_NUMBER.to_string(), bill);

    c.job_ops.insert(
        "J1".to_string(),
        JobOpsMaster {
            id: Some("jom-1".to_string()),
            job_id: "J1".to_string(),
            ops: vec![
                master_op("op-drill", 10.0, 20.0, 15.0),
                master_op("op-cut", 2.5, 40.0, 36.0),
            ],
        },
    );
    c.job_ops.insert(
        "J2".to_string(),
        JobOpsMaster {
            id: Some("jom-2".to_string()),
            job_id: "J2".to_string(),
            ops: vec![master_op("op-bind", 7.0, 10.0, 8.0)],
        },
    );

    c.work_done.insert(
        (CONTRACTOR_ID.to_string(), "J1".to_string()),
        WorkDone {
            id: Some("wd-1".to_string()),
            contractor_id: CONTRACTOR_ID.to_string(),
            job_id: "J1".to_string(),
            ops_done: vec![
                ledger_entry(None, "Drilling", 10.0, 5.0),
                ledger_entry(None, "Cutting", 2.5, 4.0),
            ],
        },
    );
    c.work_done.insert(
        (CONTRACTOR_ID.to_string(), "J2".to_string()),
        WorkDone {
            id: Some("wd-2".to_string()),
            contractor_id: CONTRACTOR_ID.to_string(),
            job_id: "J2".to_string(),
            ops_done: vec![ledger_entry(Some("op-bind"), "Binding", 7.0, 2.0)],
        },
    );

    c.operations = vec![
        Operation {
            id: "op-drill".to_string(),
            name: "Drilling".to_string(),
        },
        Operation {
            id: "op-cut".to_string(),
            name: "Cutting".to_string(),
        },
        Operation {
            id: "op-bind".to_string(),
            name: "Binding".to_string(),
        },
    ];
    c.contractors = vec![Contractor {
        id: CONTRACTOR_ID.to_string(),
        name: CONTRACTOR_NAME.to_string(),
    }];

    c
}
