use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use parking_lot::Mutex;
use tracing::instrument;

use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::events::{Event, EventStore};
use crate::loan::Loan;
use crate::payments::{AmortizationSchedule, LoanLockRegistry, PaymentAllocator, PaymentReceipt};
use crate::store::LoanStore;
use crate::types::{BorrowerId, LoanId};
use crate::view::LoanView;

/// weekly billing engine over a loan store
///
/// Payments for one loan are serialized through a per-loan lock; different loans
/// proceed in parallel. Time is read from the provider handed to each call.
pub struct BillingEngine<S: LoanStore> {
    config: EngineConfig,
    store: S,
    locks: LoanLockRegistry,
    journal: Mutex<EventStore>,
}

impl<S: LoanStore> BillingEngine<S> {
    pub fn new(config: EngineConfig, store: S) -> Result<Self> {
        config.validate()?;
        let locks = LoanLockRegistry::new(config.payments.lock_registry_capacity);
        let journal = Mutex::new(EventStore::bounded(config.journal.capacity));

        Ok(Self {
            config,
            store,
            locks,
            journal,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// create a loan and its weekly schedule
    #[instrument(name = "billing.originate_loan", skip(self, time_provider), fields(%borrower_id, %principal))]
    pub fn originate_loan(
        &self,
        borrower_id: BorrowerId,
        principal: Money,
        time_provider: &SafeTimeProvider,
    ) -> Result<AmortizationSchedule> {
        let plan =
            AmortizationSchedule::generate(borrower_id, principal, &self.config.terms, time_provider)?;
        self.store.create_loan(&plan.loan, &plan.schedules)?;

        let loan = &plan.loan;
        tracing::info!(
            loan_id = %loan.id,
            total_payable = %loan.total_payable,
            weekly_payment = %loan.weekly_payment,
            weeks = loan.duration_weeks,
            "loan originated"
        );

        self.journal.lock().emit(Event::LoanOriginated {
            loan_id: loan.id,
            borrower_id,
            principal: loan.principal,
            total_payable: loan.total_payable,
            weekly_payment: loan.weekly_payment,
            duration_weeks: loan.duration_weeks,
            timestamp: loan.created_at,
        });

        Ok(plan)
    }

    /// apply one repayment to the loan's current due-set
    #[instrument(name = "billing.process_payment", skip(self, time_provider), fields(%loan_id, %amount))]
    pub fn process_payment(
        &self,
        loan_id: LoanId,
        amount: Money,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        let policy = self.config.payments.settlement_policy;
        let timeout = self.config.payments.lock_timeout();

        let result = self.locks.with_loan_lock(loan_id, timeout, || {
            let mut events = EventStore::new();
            let allocator = PaymentAllocator::new(&self.store, policy);
            let result = allocator.allocate(loan_id, amount, time_provider.now(), &mut events);
            self.journal.lock().absorb(&mut events);
            result
        });

        match &result {
            Ok(receipt) => tracing::info!(
                weeks = ?receipt.settled_weeks,
                outstanding = %receipt.outstanding,
                completed = receipt.loan_completed,
                "payment allocated"
            ),
            Err(err) if err.is_retriable() => tracing::warn!(
                kind = ?err.kind(),
                error = %err,
                "payment failed"
            ),
            Err(err) => tracing::info!(kind = ?err.kind(), error = %err, "payment rejected"),
        }

        result
    }

    /// read model of a loan as of the provider's current date
    pub fn loan_view(&self, loan_id: LoanId, time_provider: &SafeTimeProvider) -> Result<LoanView> {
        let loan = self
            .store
            .get_loan(loan_id)?
            .ok_or(BillingError::ActiveLoanNotFound { loan_id })?;
        self.view_of(&loan, time_provider.now().date_naive())
    }

    /// every loan of a borrower, newest first, with its delinquency flag
    pub fn borrower_loans(
        &self,
        borrower_id: BorrowerId,
        time_provider: &SafeTimeProvider,
    ) -> Result<Vec<LoanView>> {
        let today = time_provider.now().date_naive();
        self.store
            .loans_for_borrower(borrower_id)?
            .iter()
            .map(|loan| self.view_of(loan, today))
            .collect()
    }

    fn view_of(&self, loan: &Loan, today: NaiveDate) -> Result<LoanView> {
        let schedules = self.store.schedules(loan.id)?;
        let payments = self.store.payments(loan.id)?;
        Ok(LoanView::build(loan, &schedules, &payments, today))
    }

    /// drain the event journal
    pub fn take_events(&self) -> Vec<Event> {
        self.journal.lock().take_events()
    }

    pub fn events(&self) -> Vec<Event> {
        self.journal.lock().events().to_vec()
    }

    /// events discarded because the journal was not drained in time
    pub fn dropped_events(&self) -> u64 {
        self.journal.lock().dropped()
    }
}
