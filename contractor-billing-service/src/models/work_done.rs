//! Per-contractor, per-job ledger of completed work.

use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

/// Completed quantity of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpsDone {
    /// Catalog id; entries created from a bill edit carry none.
    #[serde(default)]
    pub ops_id: Option<String>,
    pub ops_name: String,
    #[serde(default)]
    pub value_per_book: f64,
    #[serde(default)]
    pub ops_done_qty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<BsonDateTime>,
}

/// Contractor Work-Done document.
///
/// A stored record always holds at least one entry; see
/// [`LedgerDraft`](crate::reconciliation::LedgerDraft).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkDone {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub contractor_id: String,
    pub job_id: String,
    #[serde(default)]
    pub ops_done: Vec<OpsDone>,
}
