use crate::reconciliation::reversal::ReversalReport;
use crate::services::StoreError;
use service_core::error::AppError;
use thiserror::Error;

/// Coarse error classes, used for metrics labels and HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    Persistence,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Persistence => "persistence",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid quantity {value} for {ops_name} on job {job_number}")]
    InvalidQuantity {
        job_number: String,
        ops_name: String,
        value: f64,
    },

    #[error("Bill {0} not found")]
    BillNotFound(String),

    #[error("Operation {ops_name} at rate {rate} not found on job {job_number} of the bill")]
    OperationNotFound {
        job_number: String,
        ops_name: String,
        rate: String,
    },

    #[error("Job ops master for job {0} not found")]
    JobMasterNotFound(String),

    #[error("Operation {ops_name} at rate {rate} not found in job ops master for job {job_number}")]
    OperationNotFoundInMaster {
        job_number: String,
        ops_name: String,
        rate: String,
    },

    #[error("Contractor {0} not found")]
    ContractorNotFound(String),

    #[error("Bill {0} is already paid")]
    BillAlreadyPaid(String),

    #[error(
        "Insufficient pending quantity for {ops_name} on job {job_number}: pending {pending}, requested {requested}"
    )]
    InsufficientPendingQuantity {
        job_number: String,
        ops_name: String,
        pending: f64,
        requested: f64,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error(
        "Reversal of bill {} incomplete: {} of {} jobs failed",
        .0.bill_number,
        .0.failures.len(),
        .0.total_jobs()
    )]
    PartialReversal(ReversalReport),
}

impl ReconciliationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::InvalidQuantity { .. } => ErrorCategory::Validation,
            Self::BillNotFound(_)
            | Self::OperationNotFound { .. }
            | Self::JobMasterNotFound(_)
            | Self::OperationNotFoundInMaster { .. }
            | Self::ContractorNotFound(_) => ErrorCategory::NotFound,
            Self::BillAlreadyPaid(_) | Self::InsufficientPendingQuantity { .. } => {
                ErrorCategory::Conflict
            }
            Self::Persistence(_) | Self::PartialReversal(_) => ErrorCategory::Persistence,
        }
    }

    /// Short identifier for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::BillNotFound(_) => "bill_not_found",
            Self::OperationNotFound { .. } => "operation_not_found",
            Self::JobMasterNotFound(_) => "job_master_not_found",
            Self::OperationNotFoundInMaster { .. } => "operation_not_found_in_master",
            Self::ContractorNotFound(_) => "contractor_not_found",
            Self::BillAlreadyPaid(_) => "bill_already_paid",
            Self::InsufficientPendingQuantity { .. } => "insufficient_pending_quantity",
            Self::Persistence(_) => "persistence",
            Self::PartialReversal(_) => "partial_reversal",
        }
    }

    /// Whether re-running the unit of work may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence(e) if e.is_transient())
    }
}

impl From<validator::ValidationErrors> for ReconciliationError {
    fn from(err: validator::ValidationErrors) -> Self {
        ReconciliationError::Validation(err.to_string())
    }
}

impl From<ReconciliationError> for AppError {
    fn from(err: ReconciliationError) -> Self {
        match err.category() {
            ErrorCategory::Validation => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            ErrorCategory::NotFound => AppError::NotFound(anyhow::anyhow!(err.to_string())),
            ErrorCategory::Conflict => AppError::Conflict(anyhow::anyhow!(err.to_string())),
            ErrorCategory::Persistence => match err {
                ReconciliationError::Persistence(e) if e.is_transient() => {
                    AppError::ServiceUnavailable
                }
                ReconciliationError::Persistence(e) => {
                    AppError::DatabaseError(anyhow::Error::new(e))
                }
                other => AppError::InternalError(anyhow::anyhow!(other.to_string())),
            },
        }
    }
}
