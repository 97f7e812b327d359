use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::decimal::Money;
use crate::loan::{BillingSchedule, Loan, Payment};
use crate::types::{BorrowerId, LoanId, ScheduleId};

use super::{LoanStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    loans: HashMap<LoanId, Loan>,
    schedules: HashMap<ScheduleId, BillingSchedule>,
    schedules_by_loan: HashMap<LoanId, Vec<ScheduleId>>,
    payments: Vec<Payment>,
    /// position in `payments` of the row for each (loan, schedule)
    payment_index: HashMap<(LoanId, ScheduleId), usize>,
}

/// in-process store backed by hash maps
///
/// Each call takes the table lock once, so single writes are atomic. Payments are
/// unique per (loan, schedule).
#[derive(Debug, Default)]
pub struct InMemoryLoanStore {
    tables: RwLock<Tables>,
}

impl InMemoryLoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loan_count(&self) -> usize {
        self.tables.read().loans.len()
    }

    pub fn payment_count(&self) -> usize {
        self.tables.read().payments.len()
    }
}

fn not_found(entity: &'static str, id: Uuid) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

impl LoanStore for InMemoryLoanStore {
    fn create_loan(&self, loan: &Loan, schedules: &[BillingSchedule]) -> StoreResult<()> {
        let mut tables = self.tables.write();

        if tables.loans.contains_key(&loan.id) {
            return Err(StoreError::Conflict {
                message: format!("loan {} already exists", loan.id),
            });
        }

        // validate the whole set before touching any table
        let mut weeks = HashSet::with_capacity(schedules.len());
        for schedule in schedules {
            if schedule.loan_id != loan.id {
                return Err(StoreError::Conflict {
                    message: format!("schedule {} belongs to loan {}", schedule.id, schedule.loan_id),
                });
            }
            if !weeks.insert(schedule.week_number) {
                return Err(StoreError::Conflict {
                    message: format!("duplicate week {} for loan {}", schedule.week_number, loan.id),
                });
            }
            if tables.schedules.contains_key(&schedule.id) {
                return Err(StoreError::Conflict {
                    message: format!("schedule {} already exists", schedule.id),
                });
            }
        }

        let mut ordered: Vec<&BillingSchedule> = schedules.iter().collect();
        ordered.sort_by_key(|s| s.week_number);

        let ids = ordered.iter().map(|s| s.id).collect();
        for schedule in ordered {
            tables.schedules.insert(schedule.id, schedule.clone());
        }
        tables.schedules_by_loan.insert(loan.id, ids);
        tables.loans.insert(loan.id, loan.clone());

        Ok(())
    }

    fn get_loan(&self, loan_id: LoanId) -> StoreResult<Option<Loan>> {
        Ok(self.tables.read().loans.get(&loan_id).cloned())
    }

    fn loans_for_borrower(&self, borrower_id: BorrowerId) -> StoreResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .tables
            .read()
            .loans
            .values()
            .filter(|loan| loan.borrower_id == borrower_id)
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(loans)
    }

    fn schedules(&self, loan_id: LoanId) -> StoreResult<Vec<BillingSchedule>> {
        let tables = self.tables.read();
        let ids = match tables.schedules_by_loan.get(&loan_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };

        ids.iter()
            .map(|id| {
                tables
                    .schedules
                    .get(id)
                    .cloned()
                    .ok_or_else(|| not_found("schedule", *id))
            })
            .collect()
    }

    fn mark_schedule_settled(
        &self,
        schedule_id: ScheduleId,
        previous: &BillingSchedule,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let current = tables
            .schedules
            .get_mut(&schedule_id)
            .ok_or_else(|| not_found("schedule", schedule_id))?;

        if !current.is_pending() || current.status != previous.status {
            return Err(StoreError::Conflict {
                message: format!(
                    "schedule {} (week {}) is already {:?}",
                    schedule_id, current.week_number, current.status
                ),
            });
        }

        *current = current.settled();
        Ok(())
    }

    fn revert_schedule(&self, previous: &BillingSchedule) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let current = tables
            .schedules
            .get_mut(&previous.id)
            .ok_or_else(|| not_found("schedule", previous.id))?;

        current.status = previous.status;
        current.amount_due = previous.amount_due;
        current.amount_paid = previous.amount_paid;
        Ok(())
    }

    fn record_payment(
        &self,
        loan_id: LoanId,
        schedule_id: ScheduleId,
        amount: Money,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<Payment> {
        let mut tables = self.tables.write();

        match tables.schedules.get(&schedule_id) {
            Some(schedule) if schedule.loan_id == loan_id => {}
            Some(schedule) => {
                return Err(StoreError::Conflict {
                    message: format!("schedule {} belongs to loan {}", schedule_id, schedule.loan_id),
                });
            }
            None => return Err(not_found("schedule", schedule_id)),
        }

        if let Some(position) = tables.payment_index.get(&(loan_id, schedule_id)).copied() {
            let existing = tables.payments.get(position).cloned().ok_or_else(|| {
                StoreError::Unavailable {
                    message: format!("payment index out of range for schedule {}", schedule_id),
                }
            })?;

            if existing.amount != amount {
                return Err(StoreError::Conflict {
                    message: format!(
                        "schedule {} already has payment {} of {}",
                        schedule_id, existing.id, existing.amount
                    ),
                });
            }
            return Ok(existing);
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            loan_id,
            schedule_id,
            amount,
            payment_date: timestamp,
        };
        let position = tables.payments.len();
        tables.payment_index.insert((loan_id, schedule_id), position);
        tables.payments.push(payment.clone());

        Ok(payment)
    }

    fn payments(&self, loan_id: LoanId) -> StoreResult<Vec<Payment>> {
        Ok(self
            .tables
            .read()
            .payments
            .iter()
            .filter(|p| p.loan_id == loan_id)
            .cloned()
            .collect())
    }

    fn persist_loan_state(&self, loan: &Loan) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let stored = tables
            .loans
            .get_mut(&loan.id)
            .ok_or_else(|| not_found("loan", loan.id))?;

        stored.outstanding = loan.outstanding;
        stored.is_active = loan.is_active;
        stored.status = loan.status;
        stored.updated_at = loan.updated_at;
        Ok(())
    }
}
