//! Composite identity of an operation line across bills, job masters and
//! contractor ledgers, which share no primary key.

use crate::models::Operation;
use std::collections::HashMap;
use std::fmt;

/// Rate precision used when matching lines inside a bill.
pub const BILL_RATE_PRECISION: usize = 4;

/// Coarser rate precision used against JobOps Master and contractor ledgers.
pub const LEDGER_RATE_PRECISION: usize = 2;

/// Name used for catalog ids that do not resolve.
pub const UNKNOWN_OPERATION: &str = "Unknown";

/// Normalized `(job, operation name, rate)` identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpKey {
    pub job: String,
    pub name: String,
    pub rate: String,
}

impl fmt::Display for OpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.job, self.name, self.rate)
    }
}

/// Build the matching key for an operation line.
pub fn normalize(job: &str, name: &str, rate: f64, precision: usize) -> OpKey {
    OpKey {
        job: job.trim().to_string(),
        name: name.trim().to_string(),
        rate: format_rate(rate, precision),
    }
}

/// Format a rate with exactly `precision` decimals; non-finite rates become zero.
pub fn format_rate(rate: f64, precision: usize) -> String {
    let rate = if rate.is_finite() { rate } else { 0.0 };
    let formatted = format!("{:.*}", precision, rate);
    // "-0.00" and "0.00" must compare equal
    match formatted.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => formatted,
    }
}

/// Round to `precision` decimals.
pub fn round_to(value: f64, precision: usize) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Catalog id → display name lookup for one job master.
#[derive(Debug, Clone, Default)]
pub struct OperationNames {
    names: HashMap<String, String>,
}

impl OperationNames {
    pub fn from_catalog(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            names: operations
                .into_iter()
                .map(|op| (op.id, op.name))
                .collect(),
        }
    }

    /// Display name for `op_id`, or [`UNKNOWN_OPERATION`].
    pub fn name_of(&self, op_id: &str) -> &str {
        self.names
            .get(op_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_OPERATION)
    }
}
