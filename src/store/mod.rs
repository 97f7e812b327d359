pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::decimal::Money;
use crate::loan::{BillingSchedule, Loan, Payment};
use crate::types::{BorrowerId, LoanId, ScheduleId};

pub use memory::InMemoryLoanStore;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    #[error("conflict: {message}")]
    Conflict {
        message: String,
    },

    #[error("store unavailable: {message}")]
    Unavailable {
        message: String,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// read/write contract the billing engine needs from persistence
///
/// Every method is a separate write; the engine compensates across them. A store
/// shared by several processes must serialize allocation per loan itself (row lock
/// or serializable transaction), the engine's lock is process-local.
pub trait LoanStore: Send + Sync {
    /// insert a loan together with its full schedule set, all or nothing
    fn create_loan(&self, loan: &Loan, schedules: &[BillingSchedule]) -> StoreResult<()>;

    fn get_loan(&self, loan_id: LoanId) -> StoreResult<Option<Loan>>;

    /// every loan of a borrower, newest first
    fn loans_for_borrower(&self, borrower_id: BorrowerId) -> StoreResult<Vec<Loan>>;

    /// the loan only if it is active and in progress
    fn get_active_loan(&self, loan_id: LoanId) -> StoreResult<Option<Loan>> {
        Ok(self.get_loan(loan_id)?.filter(Loan::is_collectable))
    }

    /// all schedules of a loan ordered by week number
    fn schedules(&self, loan_id: LoanId) -> StoreResult<Vec<BillingSchedule>>;

    /// overdue pending schedules plus the next upcoming one, ordered by week number
    fn pending_obligations(
        &self,
        loan_id: LoanId,
        today: NaiveDate,
    ) -> StoreResult<Vec<BillingSchedule>> {
        let schedules = self.schedules(loan_id)?;
        Ok(crate::payments::due_set::resolve(&schedules, today))
    }

    /// mark a schedule paid, provided it still matches `previous`
    fn mark_schedule_settled(
        &self,
        schedule_id: ScheduleId,
        previous: &BillingSchedule,
    ) -> StoreResult<()>;

    /// restore a schedule to the captured state
    fn revert_schedule(&self, previous: &BillingSchedule) -> StoreResult<()>;

    /// unique per (loan, schedule); a repeat with the same amount returns the stored row
    fn record_payment(
        &self,
        loan_id: LoanId,
        schedule_id: ScheduleId,
        amount: Money,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<Payment>;

    fn payments(&self, loan_id: LoanId) -> StoreResult<Vec<Payment>>;

    fn persist_loan_state(&self, loan: &Loan) -> StoreResult<()>;
}
