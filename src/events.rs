use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{BorrowerId, LoanId, PaymentId, ScheduleId};

/// all events that can be emitted by the billing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanOriginated {
        loan_id: LoanId,
        borrower_id: BorrowerId,
        principal: Money,
        total_payable: Money,
        weekly_payment: Money,
        duration_weeks: u32,
        timestamp: DateTime<Utc>,
    },
    LoanCompleted {
        loan_id: LoanId,
        final_payment: Money,
        timestamp: DateTime<Utc>,
    },

    // payment events
    ScheduleSettled {
        loan_id: LoanId,
        schedule_id: ScheduleId,
        week_number: u32,
        due_date: NaiveDate,
        payment_id: PaymentId,
        amount: Money,
    },
    PaymentReceived {
        loan_id: LoanId,
        amount: Money,
        weeks_settled: u32,
        new_outstanding: Money,
        timestamp: DateTime<Utc>,
    },

    // failure events
    /// schedule and loan changes were undone; payment rows listed here stay persisted
    AllocationRolledBack {
        loan_id: LoanId,
        reverted_weeks: Vec<u32>,
        orphaned_payments: Vec<PaymentId>,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
///
/// A bounded store keeps only the newest `limit` events and counts the rest as
/// dropped.
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
    limit: Option<usize>,
    dropped: u64,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(limit: usize) -> Self {
        Self {
            limit: Some(limit.max(1)),
            ..Self::default()
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
        self.enforce_limit();
    }

    /// move every event from `other` into this store
    pub fn absorb(&mut self, other: &mut EventStore) {
        self.events.append(&mut other.events);
        self.enforce_limit();
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// events discarded because the store was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn enforce_limit(&mut self) {
        if let Some(limit) = self.limit {
            if self.events.len() > limit {
                let excess = self.events.len() - limit;
                self.events.drain(..excess);
                self.dropped += excess as u64;
            }
        }
    }
}
