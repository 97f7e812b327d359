pub mod allocation;
pub mod amortization;
pub mod due_set;
pub mod guard;

pub use allocation::{PaymentAllocator, PaymentReceipt};
pub use amortization::{AmortizationCalculator, AmortizationSchedule, LoanTotals};
pub use guard::LoanLockRegistry;
