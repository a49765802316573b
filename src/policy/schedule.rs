use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};

/// one scheduled repayment of a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub number: u32,
    pub due_date: DateTime<Utc>,
    pub amount: Money,
    /// repayment progress against this installment
    pub paid: Money,
}

impl Installment {
    pub fn outstanding(&self) -> Money {
        (self.amount - self.paid).max(Money::ZERO)
    }

    pub fn is_settled(&self) -> bool {
        self.paid >= self.amount
    }
}

/// build an equal-amount schedule over principal plus flat interest
///
/// Total due is `principal * (1 + rate)` split evenly across monthly
/// installments starting at `first_due`; the last installment absorbs the
/// rounding remainder. Schedules are immutable after creation; rescheduling
/// is cancel-and-recreate.
pub fn build_installment_schedule(
    principal: Money,
    rate: Rate,
    count: u32,
    first_due: DateTime<Utc>,
) -> Result<Vec<Installment>> {
    if count == 0 {
        return Err(LedgerError::InvalidInstallmentCount { count });
    }
    if !principal.is_positive() {
        return Err(LedgerError::InvalidAmount { amount: principal });
    }
    let pct = rate.as_percentage();
    if pct < Decimal::ZERO || pct > Decimal::from(100) {
        return Err(LedgerError::InvalidPercentage { value: pct });
    }

    let total_due = principal * rate.gross_factor();
    let base = total_due / Decimal::from(count);

    let mut installments = Vec::with_capacity(count as usize);
    let mut scheduled = Money::ZERO;

    for number in 1..=count {
        let is_last = number == count;
        let amount = if is_last { total_due - scheduled } else { base };
        scheduled += amount;

        installments.push(Installment {
            number,
            due_date: add_months(first_due, number - 1),
            amount,
            paid: Money::ZERO,
        });
    }

    Ok(installments)
}

/// add months to date
fn add_months(date: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let mut result = date;
    for _ in 0..months {
        let days_in_month = days_in_month(result.year(), result.month());
        result = result + Duration::days(days_in_month as i64);
    }
    result
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn first_due() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_equal_amount_schedule() {
        let schedule = build_installment_schedule(
            Money::from_major(1_000),
            Rate::from_percentage(10),
            4,
            first_due(),
        )
        .unwrap();

        assert_eq!(schedule.len(), 4);
        for installment in &schedule {
            assert_eq!(installment.amount, Money::from_major(275));
            assert_eq!(installment.paid, Money::ZERO);
        }

        let total: Money = schedule
            .iter()
            .map(|i| i.amount)
            .fold(Money::ZERO, |acc, x| acc + x);
        assert_eq!(total, Money::from_major(1_100));
    }

    #[test]
    fn test_last_installment_absorbs_remainder() {
        let schedule =
            build_installment_schedule(Money::from_major(1_000), Rate::ZERO, 3, first_due())
                .unwrap();

        assert_eq!(schedule[0].amount, Money::from_str_exact("333.33").unwrap());
        assert_eq!(schedule[1].amount, Money::from_str_exact("333.33").unwrap());
        assert_eq!(schedule[2].amount, Money::from_str_exact("333.34").unwrap());

        let total: Money = schedule
            .iter()
            .map(|i| i.amount)
            .fold(Money::ZERO, |acc, x| acc + x);
        assert_eq!(total, Money::from_major(1_000));
    }

    #[test]
    fn test_due_dates_advance_monthly() {
        let schedule =
            build_installment_schedule(Money::from_major(900), Rate::ZERO, 3, first_due())
                .unwrap();

        assert_eq!(schedule[0].due_date, first_due());
        for pair in schedule.windows(2) {
            assert!(pair[1].due_date > pair[0].due_date);
            let gap = pair[1].due_date - pair[0].due_date;
            assert!(gap.num_days() >= 28 && gap.num_days() <= 31);
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            build_installment_schedule(Money::from_major(100), Rate::ZERO, 0, first_due()),
            Err(LedgerError::InvalidInstallmentCount { .. })
        ));
        assert!(matches!(
            build_installment_schedule(Money::ZERO, Rate::ZERO, 2, first_due()),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(matches!(
            build_installment_schedule(
                Money::from_major(100),
                Rate::from_percentage(150),
                2,
                first_due()
            ),
            Err(LedgerError::InvalidPercentage { .. })
        ));
    }

    #[test]
    fn test_installment_progress() {
        let mut installment = Installment {
            number: 1,
            due_date: first_due(),
            amount: Money::from_major(275),
            paid: Money::ZERO,
        };
        assert_eq!(installment.outstanding(), Money::from_major(275));
        assert!(!installment.is_settled());

        installment.paid = Money::from_major(275);
        assert_eq!(installment.outstanding(), Money::ZERO);
        assert!(installment.is_settled());
    }
}
