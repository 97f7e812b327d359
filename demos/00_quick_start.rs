/// quick start - originate a loan and pay the first week
use loan_billing_rs::{
    BillingEngine, EngineConfig, InMemoryLoanStore, Money, SafeTimeProvider, TimeSource, Uuid,
};
use chrono::Utc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let engine = BillingEngine::new(EngineConfig::default(), InMemoryLoanStore::new())?;
    let time = SafeTimeProvider::new(TimeSource::Test(Utc::now()));

    // 5,000,000 at 10% flat over 50 weeks
    let plan = engine.originate_loan(Uuid::new_v4(), Money::from_major(5_000_000), &time)?;
    println!("weekly payment: {}", plan.loan.weekly_payment);

    // pay the first week
    let receipt = engine.process_payment(plan.loan.id, plan.loan.weekly_payment, &time)?;
    println!("settled weeks {:?}, outstanding {}", receipt.settled_weeks, receipt.outstanding);

    // print current state
    println!("{}", engine.loan_view(plan.loan.id, &time)?.to_json_pretty()?);

    Ok(())
}
