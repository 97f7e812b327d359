/// serialization support for loans
use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::loan::{BillingSchedule, Loan, Payment};
use crate::payments::due_set;
use crate::types::{BorrowerId, LoanId, LoanStatus, ScheduleId};

/// serializable view of a loan's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanView {
    pub id: LoanId,
    #[serde(rename = "borrowerID")]
    pub borrower_id: BorrowerId,
    pub status: LoanStatus,
    pub is_active: bool,
    pub is_delinquent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub financial: FinancialView,
    pub repayments: RepaymentView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialView {
    #[serde(rename = "principalAmount")]
    pub principal: Money,
    pub total_interest: Money,
    pub total_payable: Money,
    #[serde(rename = "outstandingAmount")]
    pub outstanding: Money,
    #[serde(rename = "weeklyPaymentAmount")]
    pub weekly_payment: Money,
    pub total_paid: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepaymentView {
    pub duration_weeks: u32,
    pub weeks_paid: u32,
    pub weeks_pending: u32,
    pub weeks_overdue: u32,
    pub next_due_week: Option<u32>,
    pub next_due_date: Option<NaiveDate>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub payment_count: u32,
}

impl LoanView {
    pub fn build(
        loan: &Loan,
        schedules: &[BillingSchedule],
        payments: &[Payment],
        today: NaiveDate,
    ) -> Self {
        let pending: Vec<&BillingSchedule> = schedules.iter().filter(|s| s.is_pending()).collect();
        let next_due = pending.iter().min_by_key(|s| s.week_number);

        // rows left behind by a rolled-back attempt point at pending schedules
        let paid_schedules: HashSet<ScheduleId> = schedules
            .iter()
            .filter(|s| !s.is_pending())
            .map(|s| s.id)
            .collect();
        let settled: Vec<&Payment> = payments
            .iter()
            .filter(|p| paid_schedules.contains(&p.schedule_id))
            .collect();

        LoanView {
            id: loan.id,
            borrower_id: loan.borrower_id,
            status: loan.status,
            is_active: loan.is_active,
            is_delinquent: due_set::is_delinquent(schedules, today),
            created_at: loan.created_at,
            updated_at: loan.updated_at,
            financial: FinancialView {
                principal: loan.principal,
                total_interest: loan.total_interest,
                total_payable: loan.total_payable,
                outstanding: loan.outstanding,
                weekly_payment: loan.weekly_payment,
                total_paid: settled
                    .iter()
                    .map(|p| p.amount)
                    .fold(Money::ZERO, |acc, x| acc + x),
            },
            repayments: RepaymentView {
                duration_weeks: loan.duration_weeks,
                weeks_paid: (schedules.len() - pending.len()) as u32,
                weeks_pending: pending.len() as u32,
                weeks_overdue: pending.iter().filter(|s| s.due_on() < today).count() as u32,
                next_due_week: next_due.map(|s| s.week_number),
                next_due_date: next_due.map(|s| s.due_on()),
                last_payment_date: settled.iter().map(|p| p.payment_date).max(),
                payment_count: settled.len() as u32,
            },
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
