//! Per-job master record of remaining work.

use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

/// Remaining-work counter for one operation on a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterOp {
    pub op_id: String,
    #[serde(default)]
    pub value_per_book: f64,
    #[serde(default)]
    pub total_ops_qty: f64,
    #[serde(default)]
    pub pending_ops_qty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_date: Option<BsonDateTime>,
}

/// JobOps Master document, one per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOpsMaster {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub job_id: String,
    #[serde(default)]
    pub ops: Vec<MasterOp>,
}

impl JobOpsMaster {
    /// Distinct operation ids referenced by this record, in order.
    pub fn op_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            if !ids.contains(&op.op_id) {
                ids.push(op.op_id.clone());
            }
        }
        ids
    }
}
