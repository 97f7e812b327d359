use std::collections::HashSet;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::decimal::Money;
use crate::loan::{BillingSchedule, Loan, Payment};
use crate::types::{BorrowerId, LoanId, ScheduleId};

use super::{InMemoryLoanStore, LoanStore, StoreError, StoreResult};

/// write step a [`FaultyStore`] can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateLoan,
    /// fail settling the schedule with this week number
    SettleWeek(u32),
    /// fail recording the payment for this week number
    PaymentForWeek(u32),
    RevertSchedule,
    PersistLoan,
}

/// wraps the in-memory store and fails selected writes
#[derive(Debug, Default)]
pub struct FaultyStore {
    pub inner: InMemoryLoanStore,
    armed: Mutex<HashSet<FailPoint>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self, point: FailPoint) {
        self.armed.lock().insert(point);
    }

    pub fn disarm_all(&self) {
        self.armed.lock().clear();
    }

    fn check(&self, point: FailPoint) -> StoreResult<()> {
        if self.armed.lock().contains(&point) {
            return Err(StoreError::Unavailable {
                message: format!("injected failure at {:?}", point),
            });
        }
        Ok(())
    }

    fn week_of(&self, loan_id: LoanId, schedule_id: ScheduleId) -> Option<u32> {
        self.inner
            .schedules(loan_id)
            .ok()?
            .into_iter()
            .find(|s| s.id == schedule_id)
            .map(|s| s.week_number)
    }
}

impl LoanStore for FaultyStore {
    fn create_loan(&self, loan: &Loan, schedules: &[BillingSchedule]) -> StoreResult<()> {
        self.check(FailPoint::CreateLoan)?;
        self.inner.create_loan(loan, schedules)
    }

    fn get_loan(&self, loan_id: LoanId) -> StoreResult<Option<Loan>> {
        self.inner.get_loan(loan_id)
    }

    fn loans_for_borrower(&self, borrower_id: BorrowerId) -> StoreResult<Vec<Loan>> {
        self.inner.loans_for_borrower(borrower_id)
    }

    fn schedules(&self, loan_id: LoanId) -> StoreResult<Vec<BillingSchedule>> {
        self.inner.schedules(loan_id)
    }

    fn mark_schedule_settled(
        &self,
        schedule_id: ScheduleId,
        previous: &BillingSchedule,
    ) -> StoreResult<()> {
        self.check(FailPoint::SettleWeek(previous.week_number))?;
        self.inner.mark_schedule_settled(schedule_id, previous)
    }

    fn revert_schedule(&self, previous: &BillingSchedule) -> StoreResult<()> {
        self.check(FailPoint::RevertSchedule)?;
        self.inner.revert_schedule(previous)
    }

    fn record_payment(
        &self,
        loan_id: LoanId,
        schedule_id: ScheduleId,
        amount: Money,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<Payment> {
        if let Some(week) = self.week_of(loan_id, schedule_id) {
            self.check(FailPoint::PaymentForWeek(week))?;
        }
        self.inner.record_payment(loan_id, schedule_id, amount, timestamp)
    }

    fn payments(&self, loan_id: LoanId) -> StoreResult<Vec<Payment>> {
        self.inner.payments(loan_id)
    }

    fn persist_loan_state(&self, loan: &Loan) -> StoreResult<()> {
        self.check(FailPoint::PersistLoan)?;
        self.inner.persist_loan_state(loan)
    }
}
