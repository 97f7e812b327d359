pub mod config;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod loan;
pub mod payments;
pub mod store;
pub mod types;
pub mod view;

// re-export key types
pub use config::{EngineConfig, LoanTerms, PaymentConfig};
pub use decimal::{Money, Rate};
pub use engine::BillingEngine;
pub use errors::{BillingError, FailureKind, Result};
pub use events::{Event, EventStore};
pub use loan::{BillingSchedule, Loan, Payment};
pub use payments::{AmortizationSchedule, LoanLockRegistry, PaymentReceipt};
pub use store::{InMemoryLoanStore, LoanStore, StoreError, StoreResult};
pub use types::{
    BillingStatus, BorrowerId, LoanId, LoanStatus, PaymentId, ScheduleId, SettlementPolicy,
};
pub use view::LoanView;

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
