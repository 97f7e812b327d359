use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{BillingStatus, BorrowerId, LoanId, LoanStatus, PaymentId, ScheduleId};

/// loan aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: LoanId,
    #[serde(rename = "borrowerID")]
    pub borrower_id: BorrowerId,
    #[serde(rename = "principalAmount")]
    pub principal: Money,
    pub total_interest: Money,
    pub total_payable: Money,
    #[serde(rename = "outstandingAmount")]
    pub outstanding: Money,
    pub duration_weeks: u32,
    #[serde(rename = "weeklyPaymentAmount")]
    pub weekly_payment: Money,
    pub is_active: bool,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// loan still accepts repayments
    pub fn is_collectable(&self) -> bool {
        self.is_active && self.status == LoanStatus::InProgress
    }

    pub fn is_completed(&self) -> bool {
        self.status == LoanStatus::Completed
    }

    /// reduce the outstanding balance, completing the loan once it hits zero
    ///
    /// returns true if this settlement completed the loan
    pub fn apply_settlement(&mut self, amount: Money, timestamp: DateTime<Utc>) -> bool {
        self.outstanding -= amount;
        self.updated_at = timestamp;

        if self.outstanding > Money::ZERO {
            return false;
        }

        self.outstanding = Money::ZERO;
        self.is_active = false;
        self.status = LoanStatus::Completed;
        true
    }
}

/// one week's obligation against a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingSchedule {
    pub id: ScheduleId,
    #[serde(rename = "loanID")]
    pub loan_id: LoanId,
    pub week_number: u32,
    pub due_date: DateTime<Utc>,
    pub amount_due: Money,
    pub amount_paid: Money,
    pub status: BillingStatus,
}

impl BillingSchedule {
    pub fn is_pending(&self) -> bool {
        self.status == BillingStatus::Pending
    }

    pub fn due_on(&self) -> NaiveDate {
        self.due_date.date_naive()
    }

    /// due on or before the given calendar date
    pub fn is_due_by(&self, today: NaiveDate) -> bool {
        self.due_on() <= today
    }

    /// the schedule as it reads once settled
    pub fn settled(&self) -> Self {
        Self {
            status: BillingStatus::Paid,
            amount_paid: self.amount_due,
            ..self.clone()
        }
    }
}

/// append-only payment record, one per settled schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    #[serde(rename = "loanID")]
    pub loan_id: LoanId,
    #[serde(rename = "billingScheduleID")]
    pub schedule_id: ScheduleId,
    pub amount: Money,
    pub payment_date: DateTime<Utc>,
}
