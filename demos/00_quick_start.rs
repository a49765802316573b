/// quick start - record income, skim the fee, pay a provider
use cash_ledger_rs::{
    CashLedger, Currency, LedgerConfig, Money, SafeTimeProvider, TimeSource, Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = CashLedger::in_memory(LedgerConfig::new(Uuid::new_v4()));
    let time = SafeTimeProvider::new(TimeSource::System);
    let project = Uuid::new_v4();

    // client pays an installment; master mirrors the income
    ledger.record_project_income(
        project,
        Money::from_major(250_000),
        Currency::ARS,
        "installment 1",
        Some("demo-income-1"),
        &time,
    )?;

    // skim the configured admin fee share from master
    ledger.collect_fee(
        Money::from_major(250_000),
        Currency::ARS,
        ledger.default_fee_basis(),
        Some(project),
        Some("demo-fee-1"),
        &time,
    )?;

    // pay a provider from the project and its master mirror
    ledger.record_provider_payment(
        project,
        Money::from_major(80_000),
        Currency::ARS,
        "concrete supplier",
        Some("demo-pay-1"),
        &time,
    )?;

    let now = time.now();
    let project_account = ledger.project_account(project, now)?;
    let master = ledger.master_account(now)?;
    let admin = ledger.admin_account(now)?;

    println!("project: {} ARS", project_account.balance(Currency::ARS));
    println!("master:  {} ARS", master.balance(Currency::ARS));
    println!("admin:   {} ARS", admin.balance(Currency::ARS));

    Ok(())
}
