//! Applying one repayment to a loan's due-set.
//!
//! The store offers no transaction spanning schedules, payments and the loan, so
//! the allocator writes them one by one and undoes its own schedule and loan
//! changes when a later write fails. Payment rows written before the failure are
//! not retracted; they are reported through [`Event::AllocationRolledBack`] and the
//! store's (loan, schedule) uniqueness keeps a retry from duplicating them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::events::{Event, EventStore};
use crate::loan::{BillingSchedule, Loan, Payment};
use crate::payments::due_set;
use crate::store::{LoanStore, StoreError};
use crate::types::{LoanId, SettlementPolicy};

/// outcome of a successful allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub loan_id: LoanId,
    pub amount: Money,
    pub settled_weeks: Vec<u32>,
    pub payments: Vec<Payment>,
    pub outstanding: Money,
    pub loan_completed: bool,
    pub paid_at: DateTime<Utc>,
}

/// writes done so far in one attempt
#[derive(Debug, Default)]
struct AppliedWrites {
    /// pre-attempt state of every schedule marked paid
    settled: Vec<BillingSchedule>,
    payments: Vec<Payment>,
}

/// allocates payments against the due-set
pub struct PaymentAllocator<'a, S: LoanStore + ?Sized> {
    store: &'a S,
    policy: SettlementPolicy,
}

impl<'a, S: LoanStore + ?Sized> PaymentAllocator<'a, S> {
    pub fn new(store: &'a S, policy: SettlementPolicy) -> Self {
        Self { store, policy }
    }

    /// allocate `tendered` to the loan's current obligations
    ///
    /// The caller must hold the loan's lock for the whole call.
    pub fn allocate(
        &self,
        loan_id: LoanId,
        tendered: Money,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<PaymentReceipt> {
        let mut loan = self
            .store
            .get_active_loan(loan_id)?
            .filter(Loan::is_collectable)
            .ok_or(BillingError::ActiveLoanNotFound { loan_id })?;

        let today = now.date_naive();
        let due_set = self.store.pending_obligations(loan_id, today)?;
        if due_set.is_empty() {
            return Err(BillingError::NoPendingObligations { loan_id });
        }

        let due_set = self.settlement_scope(&loan, due_set, tendered, today);
        validate_amount(&loan, &due_set, tendered)?;

        tracing::debug!(
            %loan_id,
            weeks = ?due_set.iter().map(|s| s.week_number).collect::<Vec<_>>(),
            %tendered,
            "settling due-set"
        );

        let snapshot = loan.clone();
        let mut applied = AppliedWrites::default();

        if let Err(err) = self.apply(&mut loan, &due_set, tendered, now, &mut applied) {
            loan = self.compensate(snapshot, &applied, &err, now, events);
            tracing::debug!(%loan_id, outstanding = %loan.outstanding, "loan snapshot restored");
            return Err(err.into());
        }

        for (schedule, payment) in applied.settled.iter().zip(&applied.payments) {
            events.emit(Event::ScheduleSettled {
                loan_id,
                schedule_id: schedule.id,
                week_number: schedule.week_number,
                due_date: schedule.due_on(),
                payment_id: payment.id,
                amount: payment.amount,
            });
        }
        events.emit(Event::PaymentReceived {
            loan_id,
            amount: tendered,
            weeks_settled: applied.settled.len() as u32,
            new_outstanding: loan.outstanding,
            timestamp: now,
        });
        if loan.is_completed() {
            events.emit(Event::LoanCompleted {
                loan_id,
                final_payment: tendered,
                timestamp: now,
            });
        }

        Ok(PaymentReceipt {
            loan_id,
            amount: tendered,
            settled_weeks: applied.settled.iter().map(|s| s.week_number).collect(),
            payments: applied.payments,
            outstanding: loan.outstanding,
            loan_completed: loan.is_completed(),
            paid_at: now,
        })
    }

    /// drop the upcoming week when only the overdue portion was tendered
    fn settlement_scope(
        &self,
        loan: &Loan,
        mut due_set: Vec<BillingSchedule>,
        tendered: Money,
        today: chrono::NaiveDate,
    ) -> Vec<BillingSchedule> {
        if self.policy != SettlementPolicy::DeferUpcoming || due_set.len() < 2 {
            return due_set;
        }

        let overdue_only = due_set::total_due(&due_set) - loan.weekly_payment;
        let ends_with_upcoming = due_set.last().map_or(false, |s| !s.is_due_by(today));

        if ends_with_upcoming && tendered == overdue_only {
            due_set.pop();
        }
        due_set
    }

    fn apply(
        &self,
        loan: &mut Loan,
        due_set: &[BillingSchedule],
        tendered: Money,
        now: DateTime<Utc>,
        applied: &mut AppliedWrites,
    ) -> std::result::Result<(), StoreError> {
        for schedule in due_set {
            self.store.mark_schedule_settled(schedule.id, schedule)?;
            applied.settled.push(schedule.clone());

            let payment =
                self.store
                    .record_payment(loan.id, schedule.id, schedule.amount_due, now)?;
            applied.payments.push(payment);
        }

        loan.apply_settlement(tendered, now);
        self.store.persist_loan_state(loan)
    }

    /// undo this attempt's schedule changes and hand back the loan snapshot
    fn compensate(
        &self,
        snapshot: Loan,
        applied: &AppliedWrites,
        cause: &StoreError,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Loan {
        for previous in applied.settled.iter().rev() {
            if let Err(err) = self.store.revert_schedule(previous) {
                tracing::error!(
                    loan_id = %snapshot.id,
                    schedule_id = %previous.id,
                    week = previous.week_number,
                    error = %err,
                    "failed to revert schedule during rollback"
                );
            }
        }

        let orphaned: Vec<_> = applied.payments.iter().map(|p| p.id).collect();
        tracing::warn!(
            loan_id = %snapshot.id,
            reverted = applied.settled.len(),
            orphaned_payments = orphaned.len(),
            error = %cause,
            "payment allocation rolled back"
        );

        events.emit(Event::AllocationRolledBack {
            loan_id: snapshot.id,
            reverted_weeks: applied.settled.iter().map(|s| s.week_number).collect(),
            orphaned_payments: orphaned,
            reason: cause.to_string(),
            timestamp: now,
        });

        snapshot
    }
}

/// tendered amount must match the due-set exactly
fn validate_amount(loan: &Loan, due_set: &[BillingSchedule], tendered: Money) -> Result<()> {
    if due_set.len() > 1 {
        let total = due_set::total_due(due_set);
        if tendered != total {
            return Err(BillingError::AmountMismatch {
                expected: total,
                provided: tendered,
                reason: BillingError::LATE_PAYMENTS,
            });
        }
    } else if tendered != loan.weekly_payment {
        return Err(BillingError::AmountMismatch {
            expected: loan.weekly_payment,
            provided: tendered,
            reason: "",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{FailPoint, FaultyStore};
    use crate::store::InMemoryLoanStore;
    use crate::types::{BillingStatus, LoanStatus};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
    }

    fn weekly() -> Money {
        Money::from_major(110_000)
    }

    /// loan with weekly payment 110000 and schedules due at the given day offsets
    fn seed<S: LoanStore>(store: &S, outstanding: i64, offsets: &[i64]) -> (Loan, Vec<BillingSchedule>) {
        let created = now() - Duration::days(30);
        let loan = Loan {
            id: Uuid::new_v4(),
            borrower_id: Uuid::new_v4(),
            principal: Money::from_major(5_000_000),
            total_interest: Money::from_major(500_000),
            total_payable: Money::from_major(5_500_000),
            outstanding: Money::from_major(outstanding),
            duration_weeks: 50,
            weekly_payment: weekly(),
            is_active: true,
            status: LoanStatus::InProgress,
            created_at: created,
            updated_at: created,
        };
        let schedules: Vec<_> = offsets
            .iter()
            .enumerate()
            .map(|(idx, offset)| BillingSchedule {
                id: Uuid::new_v4(),
                loan_id: loan.id,
                week_number: idx as u32 + 1,
                due_date: now() + Duration::days(*offset),
                amount_due: weekly(),
                amount_paid: Money::ZERO,
                status: BillingStatus::Pending,
            })
            .collect();
        store.create_loan(&loan, &schedules).unwrap();
        (loan, schedules)
    }

    fn statuses<S: LoanStore>(store: &S, loan_id: LoanId) -> Vec<BillingStatus> {
        store.schedules(loan_id).unwrap().iter().map(|s| s.status).collect()
    }

    #[test]
    fn test_single_week_requires_weekly_amount() {
        let store = InMemoryLoanStore::new();
        let (loan, _) = seed(&store, 5_500_000, &[7, 14]);
        let allocator = PaymentAllocator::new(&store, SettlementPolicy::ExactDueSet);
        let mut events = EventStore::new();

        let err = allocator
            .allocate(loan.id, Money::from_major(100_000), now(), &mut events)
            .unwrap_err();
        assert!(matches!(err, BillingError::AmountMismatch { expected, .. } if expected == weekly()));
        assert_eq!(err.to_string(), "payment must be exactly 110000, provided 100000");

        let receipt = allocator.allocate(loan.id, weekly(), now(), &mut events).unwrap();
        assert_eq!(receipt.settled_weeks, vec![1]);
        assert_eq!(receipt.payments.len(), 1);
        assert_eq!(receipt.outstanding, Money::from_major(5_390_000));
        assert!(!receipt.loan_completed);
        assert_eq!(
            statuses(&store, loan.id),
            vec![BillingStatus::Paid, BillingStatus::Pending]
        );
        assert_eq!(store.payments(loan.id).unwrap().len(), 1);
        assert!(matches!(
            events.events(),
            [Event::ScheduleSettled { week_number: 1, .. }, Event::PaymentReceived { weeks_settled: 1, .. }]
        ));
    }

    #[test]
    fn test_two_overdue_weeks_need_full_total() {
        let store = InMemoryLoanStore::new();
        let (loan, _) = seed(&store, 5_500_000, &[-14, -7]);
        let allocator = PaymentAllocator::new(&store, SettlementPolicy::DeferUpcoming);
        let mut events = EventStore::new();

        let err = allocator
            .allocate(loan.id, weekly(), now(), &mut events)
            .unwrap_err();
        match &err {
            BillingError::AmountMismatch { expected, .. } => {
                assert_eq!(*expected, Money::from_major(220_000))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("220000 to cover late payments"));
        assert!(events.events().is_empty());

        let receipt = allocator
            .allocate(loan.id, Money::from_major(220_000), now(), &mut events)
            .unwrap();
        assert_eq!(receipt.settled_weeks, vec![1, 2]);
        assert_eq!(receipt.outstanding, Money::from_major(5_280_000));
        assert_eq!(statuses(&store, loan.id), vec![BillingStatus::Paid; 2]);

        let payments = store.payments(loan.id).unwrap();
        assert_eq!(payments.len(), 2);
        assert!(payments.iter().all(|p| p.amount == weekly() && p.payment_date == now()));
        assert_eq!(
            store.get_loan(loan.id).unwrap().unwrap().outstanding,
            Money::from_major(5_280_000)
        );
    }

    #[test]
    fn test_overdue_portion_defers_upcoming_week() {
        let store = InMemoryLoanStore::new();
        let (loan, _) = seed(&store, 5_500_000, &[-14, -7, 7, 14]);
        let allocator = PaymentAllocator::new(&store, SettlementPolicy::DeferUpcoming);
        let mut events = EventStore::new();

        let receipt = allocator
            .allocate(loan.id, Money::from_major(220_000), now(), &mut events)
            .unwrap();
        assert_eq!(receipt.settled_weeks, vec![1, 2]);
        assert_eq!(
            statuses(&store, loan.id),
            vec![
                BillingStatus::Paid,
                BillingStatus::Paid,
                BillingStatus::Pending,
                BillingStatus::Pending
            ]
        );
    }

    #[test]
    fn test_exact_policy_requires_whole_due_set() {
        let store = InMemoryLoanStore::new();
        let (loan, _) = seed(&store, 5_500_000, &[-14, -7, 7, 14]);
        let allocator = PaymentAllocator::new(&store, SettlementPolicy::ExactDueSet);
        let mut events = EventStore::new();

        let err = allocator
            .allocate(loan.id, Money::from_major(220_000), now(), &mut events)
            .unwrap_err();
        assert!(matches!(err, BillingError::AmountMismatch { expected, .. } if expected == Money::from_major(330_000)));

        let receipt = allocator
            .allocate(loan.id, Money::from_major(330_000), now(), &mut events)
            .unwrap();
        assert_eq!(receipt.settled_weeks, vec![1, 2, 3]);
    }

    #[test]
    fn test_overdue_plus_upcoming_single_week_paid_under_defer() {
        let store = InMemoryLoanStore::new();
        let (loan, _) = seed(&store, 5_500_000, &[-7, 7]);
        let allocator = PaymentAllocator::new(&store, SettlementPolicy::DeferUpcoming);
        let mut events = EventStore::new();

        let receipt = allocator
            .allocate(loan.id, weekly(), now(), &mut events)
            .unwrap();
        assert_eq!(receipt.settled_weeks, vec![1]);
        assert_eq!(receipt.outstanding, Money::from_major(5_390_000));
    }

    #[test]
    fn test_inactive_or_missing_loan() {
        let store = InMemoryLoanStore::new();
        let allocator = PaymentAllocator::new(&store, SettlementPolicy::DeferUpcoming);
        let mut events = EventStore::new();

        let missing = Uuid::new_v4();
        assert!(matches!(
            allocator.allocate(missing, weekly(), now(), &mut events),
            Err(BillingError::ActiveLoanNotFound { loan_id }) if loan_id == missing
        ));

        let (mut loan, _) = seed(&store, 5_500_000, &[7]);
        loan.apply_settlement(loan.outstanding, now());
        store.persist_loan_state(&loan).unwrap();
        assert!(matches!(
            allocator.allocate(loan.id, weekly(), now(), &mut events),
            Err(BillingError::ActiveLoanNotFound { .. })
        ));
    }

    #[test]
    fn test_nothing_pending() {
        let store = InMemoryLoanStore::new();
        let (loan, schedules) = seed(&store, 110_000, &[7]);
        store.mark_schedule_settled(schedules[0].id, &schedules[0]).unwrap();

        let allocator = PaymentAllocator::new(&store, SettlementPolicy::DeferUpcoming);
        let err = allocator
            .allocate(loan.id, weekly(), now(), &mut EventStore::new())
            .unwrap_err();
        assert!(matches!(err, BillingError::NoPendingObligations { .. }));
    }

    #[test]
    fn test_overpayment_clamps_and_completes() {
        let store = InMemoryLoanStore::new();
        let (loan, _) = seed(&store, 50_000, &[-1]);
        let allocator = PaymentAllocator::new(&store, SettlementPolicy::DeferUpcoming);
        let mut events = EventStore::new();

        let receipt = allocator
            .allocate(loan.id, weekly(), now(), &mut events)
            .unwrap();
        assert!(receipt.loan_completed);
        assert_eq!(receipt.outstanding, Money::ZERO);

        let stored = store.get_loan(loan.id).unwrap().unwrap();
        assert_eq!(stored.outstanding, Money::ZERO);
        assert_eq!(stored.status, LoanStatus::Completed);
        assert!(!stored.is_active);
        assert!(matches!(events.events().last(), Some(Event::LoanCompleted { .. })));
    }

    #[test]
    fn test_loan_update_failure_rolls_back_schedules() {
        let store = FaultyStore::new();
        let (loan, originals) = seed(&store, 5_500_000, &[-14, -7]);
        store.arm(FailPoint::PersistLoan);

        let allocator = PaymentAllocator::new(&store, SettlementPolicy::DeferUpcoming);
        let mut events = EventStore::new();
        let err = allocator
            .allocate(loan.id, Money::from_major(220_000), now(), &mut events)
            .unwrap_err();

        assert!(matches!(err, BillingError::Persistence(StoreError::Unavailable { .. })));
        assert!(err.is_retriable());
        assert_eq!(store.schedules(loan.id).unwrap(), originals);
        assert_eq!(store.get_loan(loan.id).unwrap().unwrap(), loan);

        // payment rows are not retracted
        let orphaned = store.payments(loan.id).unwrap();
        assert_eq!(orphaned.len(), 2);
        match events.events() {
            [Event::AllocationRolledBack { reverted_weeks, orphaned_payments, .. }] => {
                assert_eq!(reverted_weeks, &vec![1, 2]);
                assert_eq!(orphaned_payments.len(), 2);
            }
            other => panic!("unexpected events: {other:?}"),
        }

        // retry after recovery reuses the orphaned rows instead of duplicating them
        store.disarm_all();
        let receipt = allocator
            .allocate(loan.id, Money::from_major(220_000), now(), &mut events)
            .unwrap();
        assert_eq!(store.payments(loan.id).unwrap(), orphaned);
        assert_eq!(receipt.payments, orphaned);
    }

    #[test]
    fn test_mid_apply_failure_reverts_only_applied_weeks() {
        let store = FaultyStore::new();
        let (loan, originals) = seed(&store, 5_500_000, &[-21, -14, -7]);
        store.arm(FailPoint::SettleWeek(3));

        let allocator = PaymentAllocator::new(&store, SettlementPolicy::DeferUpcoming);
        let mut events = EventStore::new();
        let err = allocator
            .allocate(loan.id, Money::from_major(330_000), now(), &mut events)
            .unwrap_err();

        assert_eq!(err.kind(), crate::errors::FailureKind::PersistenceFailure);
        assert_eq!(store.schedules(loan.id).unwrap(), originals);
        assert_eq!(store.payments(loan.id).unwrap().len(), 2);
        match events.events() {
            [Event::AllocationRolledBack { reverted_weeks, .. }] => {
                assert_eq!(reverted_weeks, &vec![1, 2])
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_payment_failure_reverts_its_schedule() {
        let store = FaultyStore::new();
        let (loan, originals) = seed(&store, 5_500_000, &[-14, -7]);
        store.arm(FailPoint::PaymentForWeek(1));

        let allocator = PaymentAllocator::new(&store, SettlementPolicy::DeferUpcoming);
        assert!(allocator
            .allocate(loan.id, Money::from_major(220_000), now(), &mut EventStore::new())
            .is_err());

        assert_eq!(store.schedules(loan.id).unwrap(), originals);
        assert!(store.payments(loan.id).unwrap().is_empty());
    }

    #[test]
    fn test_failed_revert_does_not_mask_original_error() {
        let store = FaultyStore::new();
        let (loan, _) = seed(&store, 5_500_000, &[-7]);
        store.arm(FailPoint::PersistLoan);
        store.arm(FailPoint::RevertSchedule);

        let allocator = PaymentAllocator::new(&store, SettlementPolicy::DeferUpcoming);
        let err = allocator
            .allocate(loan.id, weekly(), now(), &mut EventStore::new())
            .unwrap_err();

        match err {
            BillingError::Persistence(StoreError::Unavailable { message }) => {
                assert!(message.contains("PersistLoan"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
