/// inter-project loan - disbursement, schedule, repayments
use cash_ledger_rs::{
    CashLedger, Currency, LedgerConfig, Money, Rate, SafeTimeProvider, TimeSource, Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = CashLedger::in_memory(LedgerConfig::new(Uuid::new_v4()));
    let time = SafeTimeProvider::new(TimeSource::System);
    let lender = Uuid::new_v4();
    let borrower = Uuid::new_v4();

    // fund the lending project
    ledger.record_project_income(
        lender,
        Money::from_major(1_000),
        Currency::USD,
        "surplus income",
        Some("loan-demo-income"),
        &time,
    )?;

    // 1000 USD at 10% over 4 monthly installments
    let loan = ledger.disburse_loan(
        lender,
        borrower,
        Money::from_major(1_000),
        Currency::USD,
        Rate::from_percentage(10),
        4,
        time.now(),
        Some("loan-demo-disburse"),
        &time,
    )?;

    println!("loan outstanding: {} USD", loan.outstanding_balance);
    for installment in &loan.installments {
        println!(
            "  installment {} due {}: {} USD",
            installment.number,
            installment.due_date.date_naive(),
            installment.amount
        );
    }

    // borrower earns and repays installment by installment
    ledger.record_project_income(
        borrower,
        Money::from_major(100),
        Currency::USD,
        "borrower income",
        Some("loan-demo-borrower-income"),
        &time,
    )?;
    for n in 1..=4u32 {
        let key = format!("loan-demo-repay-{n}");
        let loan = ledger.repay_loan(
            loan.id,
            Money::from_major(275),
            Some(key.as_str()),
            &time,
        )?;
        println!(
            "after repayment {n}: outstanding {} USD, status {:?}",
            loan.outstanding_balance, loan.status
        );
    }

    Ok(())
}
