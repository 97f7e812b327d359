use chrono::{DateTime, Duration, Utc};
use hourglass_rs::SafeTimeProvider;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::{LoanTerms, MAX_DURATION_WEEKS};
use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::loan::{BillingSchedule, Loan};
use crate::types::{BillingStatus, BorrowerId, LoanStatus};

/// a freshly originated loan and its weekly obligations
#[derive(Debug, Clone)]
pub struct AmortizationSchedule {
    pub loan: Loan,
    pub schedules: Vec<BillingSchedule>,
}

impl AmortizationSchedule {
    /// generate a loan and its full schedule at the provider's current instant
    pub fn generate(
        borrower_id: BorrowerId,
        principal: Money,
        terms: &LoanTerms,
        time_provider: &SafeTimeProvider,
    ) -> Result<Self> {
        let calculator = AmortizationCalculator::new(terms.clone());
        calculator.build(borrower_id, principal, time_provider.now())
    }

    /// sum of every week's amount due
    pub fn total_scheduled(&self) -> Money {
        self.schedules
            .iter()
            .map(|s| s.amount_due)
            .fold(Money::ZERO, |acc, x| acc + x)
    }

    /// get schedule for a specific week
    pub fn get_week(&self, week_number: u32) -> Option<&BillingSchedule> {
        week_number
            .checked_sub(1)
            .and_then(|idx| self.schedules.get(idx as usize))
    }
}

/// loan aggregate totals derived from the principal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanTotals {
    pub principal: Money,
    pub total_interest: Money,
    pub total_payable: Money,
    pub weekly_payment: Money,
}

/// flat-interest weekly amortization
pub struct AmortizationCalculator {
    terms: LoanTerms,
}

impl AmortizationCalculator {
    pub fn new(terms: LoanTerms) -> Self {
        Self { terms }
    }

    /// interest is rounded half-up to the minor unit, the weekly payment is
    /// rounded up so the final settlement always clears the balance
    pub fn totals(&self, principal: Money) -> Result<LoanTotals> {
        let scale = self.terms.minor_unit_scale;

        if !(1..=MAX_DURATION_WEEKS).contains(&self.terms.duration_weeks) {
            return Err(BillingError::InvalidConfiguration {
                message: format!(
                    "duration_weeks must be between 1 and {}: {}",
                    MAX_DURATION_WEEKS, self.terms.duration_weeks
                ),
            });
        }
        if !principal.is_positive() {
            return Err(BillingError::InvalidPrincipal {
                principal,
                reason: "must be positive".to_string(),
            });
        }
        if !principal.fits_minor_unit(scale) {
            return Err(BillingError::InvalidPrincipal {
                principal,
                reason: format!("more precise than {} decimal places", scale),
            });
        }

        let too_large = || BillingError::InvalidPrincipal {
            principal,
            reason: "too large".to_string(),
        };

        let weeks = Decimal::from(self.terms.duration_weeks);
        let total_interest = principal
            .checked_flat_rate(self.terms.interest_rate)
            .ok_or_else(too_large)?
            .round_to_minor(scale);
        let total_payable = principal.checked_add(total_interest).ok_or_else(too_large)?;
        let weekly_payment = total_payable
            .checked_div(weeks)
            .ok_or_else(too_large)?
            .ceil_to_minor(scale);

        // rounding up must not let the loan settle before its last week
        let all_but_last = weekly_payment
            .checked_mul(Decimal::from(self.terms.duration_weeks - 1))
            .ok_or_else(too_large)?;
        if self.terms.duration_weeks > 1 && all_but_last >= total_payable {
            return Err(BillingError::InvalidPrincipal {
                principal,
                reason: format!(
                    "too small to spread over {} weekly payments",
                    self.terms.duration_weeks
                ),
            });
        }

        Ok(LoanTotals {
            principal,
            total_interest,
            total_payable,
            weekly_payment,
        })
    }

    /// build the loan and its schedule as of `created_at`
    pub fn build(
        &self,
        borrower_id: BorrowerId,
        principal: Money,
        created_at: DateTime<Utc>,
    ) -> Result<AmortizationSchedule> {
        let totals = self.totals(principal)?;
        let loan_id = Uuid::new_v4();

        let loan = Loan {
            id: loan_id,
            borrower_id,
            principal: totals.principal,
            total_interest: totals.total_interest,
            total_payable: totals.total_payable,
            outstanding: totals.total_payable,
            duration_weeks: self.terms.duration_weeks,
            weekly_payment: totals.weekly_payment,
            is_active: true,
            status: LoanStatus::InProgress,
            created_at,
            updated_at: created_at,
        };

        let schedules = (1..=self.terms.duration_weeks)
            .map(|week| BillingSchedule {
                id: Uuid::new_v4(),
                loan_id,
                week_number: week,
                due_date: created_at + Duration::days(7 * week as i64),
                amount_due: totals.weekly_payment,
                amount_paid: Money::ZERO,
                status: BillingStatus::Pending,
            })
            .collect();

        Ok(AmortizationSchedule { loan, schedules })
    }
}
