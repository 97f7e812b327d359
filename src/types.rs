use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// reference to the borrower that owns a loan
pub type BorrowerId = Uuid;

/// unique identifier for a billing schedule entry
pub type ScheduleId = Uuid;

/// unique identifier for a payment record
pub type PaymentId = Uuid;

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// repayments still outstanding
    #[serde(rename = "inprogress")]
    InProgress,
    /// outstanding balance reached zero
    Completed,
}

/// billing schedule status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingStatus {
    Pending,
    Paid,
}

/// how a due-set containing the next upcoming week may be settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    /// the overdue portion alone is accepted, deferring the upcoming week
    DeferUpcoming,
    /// the whole due-set must always be paid at once
    ExactDueSet,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        SettlementPolicy::DeferUpcoming
    }
}
