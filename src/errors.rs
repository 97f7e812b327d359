use thiserror::Error;

use crate::decimal::Money;
use crate::store::StoreError;
use crate::types::LoanId;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("active loan not found: {loan_id}")]
    ActiveLoanNotFound {
        loan_id: LoanId,
    },

    #[error("no pending payments found for loan {loan_id}")]
    NoPendingObligations {
        loan_id: LoanId,
    },

    #[error("payment must be exactly {expected}{reason}, provided {provided}")]
    AmountMismatch {
        expected: Money,
        provided: Money,
        reason: &'static str,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("timed out after {waited_ms}ms waiting for payment lock on loan {loan_id}")]
    LockTimeout {
        loan_id: LoanId,
        waited_ms: u64,
    },

    #[error("invalid principal {principal}: {reason}")]
    InvalidPrincipal {
        principal: Money,
        reason: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

/// failure classification handed to the request layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ActiveLoanNotFound,
    NoPendingObligations,
    AmountMismatch,
    PersistenceFailure,
    LockTimeout,
    InvalidRequest,
}

impl BillingError {
    /// suffix used when the due-set spans more than one week
    pub const LATE_PAYMENTS: &'static str = " to cover late payments";

    pub fn kind(&self) -> FailureKind {
        match self {
            BillingError::ActiveLoanNotFound { .. } => FailureKind::ActiveLoanNotFound,
            BillingError::NoPendingObligations { .. } => FailureKind::NoPendingObligations,
            BillingError::AmountMismatch { .. } => FailureKind::AmountMismatch,
            BillingError::Persistence(_) => FailureKind::PersistenceFailure,
            BillingError::LockTimeout { .. } => FailureKind::LockTimeout,
            BillingError::InvalidPrincipal { .. } | BillingError::InvalidConfiguration { .. } => {
                FailureKind::InvalidRequest
            }
        }
    }

    /// server-side failures the caller may retry unchanged
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::PersistenceFailure | FailureKind::LockTimeout
        )
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;
