//! Domain models for contractor-billing-service.

mod bill;
mod catalog;
mod job_ops;
mod work_done;

pub use bill::{Bill, BillJob, BillOp, PAYMENT_STATUS_PAID};
pub use catalog::{Contractor, Operation};
pub use job_ops::{JobOpsMaster, MasterOp};
pub use work_done::{OpsDone, WorkDone};
