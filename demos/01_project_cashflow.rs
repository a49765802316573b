/// project cashflow - mirroring, investor capital and the movement log
use cash_ledger_rs::{
    CashLedger, Currency, LedgerConfig, Money, MovementFilter, Page, SafeTimeProvider, TimeSource,
    Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = CashLedger::in_memory(LedgerConfig::new(Uuid::new_v4()));
    let time = SafeTimeProvider::new(TimeSource::System);
    let project = Uuid::new_v4();

    // client revenue mirrors into master
    for (n, amount) in [120_000i64, 95_000, 140_000].iter().enumerate() {
        let key = format!("cashflow-income-{n}");
        ledger.record_project_income(
            project,
            Money::from_major(*amount),
            Currency::ARS,
            format!("installment {}", n + 1),
            Some(key.as_str()),
            &time,
        )?;
    }

    // investor capital goes to the project only: no mirror, no fee
    ledger.register_investor_contribution(
        project,
        Money::from_major(200_000),
        Currency::ARS,
        "partner capital injection",
        Some("cashflow-capital-1"),
        &time,
    )?;

    let now = time.now();
    let project_account = ledger.project_account(project, now)?;
    let master = ledger.master_account(now)?;
    println!("project: {} ARS", project_account.balance(Currency::ARS));
    println!("master:  {} ARS (mirror excludes investor capital)", master.balance(Currency::ARS));

    // the movement log is the audit trail
    let movements = ledger.list_movements(
        &MovementFilter::for_account(project_account.id),
        Page::default(),
    );
    println!("\n{} movements for the project account:", movements.len());
    for movement in movements {
        println!("{}", serde_json::to_string(&movement)?);
    }

    Ok(())
}
