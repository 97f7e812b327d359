/// weekly repayments - missed weeks, catch-up payments and completion under controlled time
use loan_billing_rs::{
    BillingEngine, EngineConfig, InMemoryLoanStore, Money, SafeTimeProvider, TimeSource, Uuid,
};
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== weekly repayments example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
    ));
    let controller = time.test_control().unwrap();

    let config = EngineConfig::from_json_str(r#"{ "payments": { "lock_timeout_ms": 1000 } }"#)?;
    let engine = BillingEngine::new(config, InMemoryLoanStore::new())?;

    let plan = engine.originate_loan(Uuid::new_v4(), Money::from_major(1_000_000), &time)?;
    let loan_id = plan.loan.id;
    let weekly = plan.loan.weekly_payment;
    println!("loan {} originated on {}", loan_id, time.now().format("%Y-%m-%d"));
    println!("total payable {}, weekly {}", plan.loan.total_payable, weekly);

    // borrower misses two weeks
    controller.advance(Duration::days(15));
    let view = engine.loan_view(loan_id, &time)?;
    println!(
        "\n{}: delinquent = {}, overdue weeks = {}",
        time.now().format("%Y-%m-%d"),
        view.is_delinquent,
        view.repayments.weeks_overdue
    );

    // a single weekly amount no longer covers the late weeks
    if let Err(err) = engine.process_payment(loan_id, weekly, &time) {
        println!("rejected: {}", err);
    }

    // the overdue portion alone is accepted, the upcoming week stays open
    let catch_up = weekly * Decimal::from(2);
    let receipt = engine.process_payment(loan_id, catch_up, &time)?;
    println!("caught up weeks {:?}, outstanding {}", receipt.settled_weeks, receipt.outstanding);

    // pay the remaining weeks on time
    let mut completed = false;
    while !completed {
        controller.advance(Duration::days(7));
        let receipt = engine.process_payment(loan_id, weekly, &time)?;
        completed = receipt.loan_completed;
    }

    let view = engine.loan_view(loan_id, &time)?;
    println!(
        "\ncompleted on {}: status {:?}, paid {} over {} payments",
        time.now().format("%Y-%m-%d"),
        view.status,
        view.financial.total_paid,
        view.repayments.payment_count
    );

    for event in engine.take_events().iter().rev().take(3) {
        println!("event: {:?}", event);
    }

    Ok(())
}
