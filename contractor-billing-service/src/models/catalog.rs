//! Read-only reference documents: operation catalog and contractor directory.

use serde::{Deserialize, Serialize};

/// Operation catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

/// Contractor directory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contractor {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}
