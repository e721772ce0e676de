//! Contractor bill document.

use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

/// Payment status value that marks a bill as settled.
pub const PAYMENT_STATUS_PAID: &str = "Yes";

/// One operation line billed on a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillOp {
    pub ops_name: String,
    #[serde(default)]
    pub qty_book: f64,
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub qty_completed: f64,
    #[serde(default)]
    pub total_value: f64,
}

impl BillOp {
    /// Set the completed quantity and keep `total_value == rate * qty_completed`.
    pub fn set_qty_completed(&mut self, qty: f64) {
        self.qty_completed = qty;
        self.total_value = self.rate * qty;
    }
}

/// A job section of a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillJob {
    pub job_number: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub ops: Vec<BillOp>,
}

/// Billing document for one contractor submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub bill_number: String,
    pub contractor_name: String,
    #[serde(default)]
    pub payment_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<BsonDateTime>,
    #[serde(default)]
    pub room_rent: f64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub jobs: Vec<BillJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<BsonDateTime>,
}

impl Bill {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PAYMENT_STATUS_PAID
    }

    /// Drop op lines with nothing completed, then jobs left without lines.
    ///
    /// Returns the number of op lines removed.
    pub fn prune_empty_lines(&mut self) -> usize {
        let mut removed = 0;
        for job in &mut self.jobs {
            let before = job.ops.len();
            job.ops.retain(|op| op.qty_completed != 0.0);
            removed += before - job.ops.len();
        }
        self.jobs.retain(|job| !job.ops.is_empty());
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, qty: f64) -> BillOp {
        BillOp {
            ops_name: name.to_string(),
            qty_book: 10.0,
            rate: 2.5,
            qty_completed: qty,
            total_value: 2.5 * qty,
        }
    }

    fn bill(jobs: Vec<BillJob>) -> Bill {
        Bill {
            id: None,
            bill_number: "B-001".to_string(),
            contractor_name: "Acme".to_string(),
            payment_status: "No".to_string(),
            payment_date: None,
            room_rent: 0.0,
            is_deleted: false,
            jobs,
            updated_at: None,
        }
    }

    fn job(number: &str, ops: Vec<BillOp>) -> BillJob {
        BillJob {
            job_number: number.to_string(),
            client_name: "Client".to_string(),
            job_title: "Title".to_string(),
            ops,
        }
    }

    #[test]
    fn test_set_qty_completed_updates_total() {
        let mut op = line("Drilling", 1.0);
        op.set_qty_completed(4.0);
        assert_eq!(op.qty_completed, 4.0);
        assert_eq!(op.total_value, 10.0);
    }

    #[test]
    fn test_prune_removes_zero_lines_and_empty_jobs() {
        let mut b = bill(vec![
            job("J1", vec![line("Drilling", 0.0), line("Cutting", 2.0)]),
            job("J2", vec![line("Binding", 0.0)]),
        ]);

        let removed = b.prune_empty_lines();

        assert_eq!(removed, 2);
        assert_eq!(b.jobs.len(), 1);
        assert_eq!(b.jobs[0].job_number, "J1");
        assert_eq!(b.jobs[0].ops.len(), 1);
        assert_eq!(b.jobs[0].ops[0].ops_name, "Cutting");
    }

    #[test]
    fn test_is_paid() {
        let mut b = bill(vec![]);
        assert!(!b.is_paid());
        b.payment_status = PAYMENT_STATUS_PAID.to_string();
        assert!(b.is_paid());
    }

    #[test]
    fn test_deserializes_camel_case_document() {
        let json = serde_json::json!({
            "billNumber": "B-7",
            "contractorName": "Acme",
            "paymentStatus": "No",
            "jobs": [{
                "jobNumber": "J1",
                "clientName": "C",
                "jobTitle": "T",
                "ops": [{
                    "opsName": "Drilling",
                    "qtyBook": 10,
                    "rate": 10,
                    "qtyCompleted": 5,
                    "totalValue": 50
                }]
            }]
        });
        let b: Bill = serde_json::from_value(json).unwrap();
        assert_eq!(b.bill_number, "B-7");
        assert!(!b.is_deleted);
        assert_eq!(b.jobs[0].ops[0].qty_completed, 5.0);
    }
}
