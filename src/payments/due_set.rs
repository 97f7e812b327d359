//! Selection of the obligations a payment has to settle.
//!
//! A borrower always clears every overdue week in one go and is only ever asked
//! to add the single next upcoming week, never anything further out. Dates are
//! compared as UTC calendar days.

use chrono::NaiveDate;

use crate::decimal::Money;
use crate::loan::BillingSchedule;

/// overdue pending schedules plus the earliest pending one due after `today`,
/// ordered by week number
pub fn resolve(schedules: &[BillingSchedule], today: NaiveDate) -> Vec<BillingSchedule> {
    let pending = schedules.iter().filter(|s| s.is_pending());

    let mut due: Vec<BillingSchedule> = pending
        .clone()
        .filter(|s| s.is_due_by(today))
        .cloned()
        .collect();

    let next_upcoming = pending
        .filter(|s| !s.is_due_by(today))
        .min_by_key(|s| (s.due_date, s.week_number));

    if let Some(next) = next_upcoming {
        due.push(next.clone());
    }

    due.sort_by_key(|s| s.week_number);
    due
}

/// sum of amounts due
pub fn total_due(due_set: &[BillingSchedule]) -> Money {
    due_set
        .iter()
        .map(|s| s.amount_due)
        .fold(Money::ZERO, |acc, x| acc + x)
}

/// two or more pending weeks strictly past their due date
pub fn is_delinquent(schedules: &[BillingSchedule], today: NaiveDate) -> bool {
    schedules
        .iter()
        .filter(|s| s.is_pending() && s.due_on() < today)
        .count()
        >= 2
}
