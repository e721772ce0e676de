//! Services module for contractor-billing-service.

pub mod database;
pub mod metrics;
pub mod mongo_store;
pub mod store;

pub use database::MongoDb;
pub use metrics::{
    get_metrics, init_metrics, record_error, record_ledger_adjustment, record_reconciliation,
};
pub use mongo_store::{MongoStore, MongoTransaction};
pub use store::{BillingStore, StoreError, StoreTransaction};
