use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::types::{Currency, MovementId, ProjectId};

/// how an admin fee is computed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FeeBasis {
    /// revenue share of the basis amount
    Percentage(Rate),
    /// flat amount regardless of basis
    Fixed(Money),
}

/// compute the fee to skim for a given basis amount
pub fn compute_fee(basis_amount: Money, basis: FeeBasis) -> Result<Money> {
    if basis_amount.is_negative() {
        return Err(LedgerError::InvalidAmount {
            amount: basis_amount,
        });
    }

    match basis {
        FeeBasis::Percentage(rate) => {
            let pct = rate.as_percentage();
            if pct < Decimal::ZERO || pct > Decimal::from(100) {
                return Err(LedgerError::InvalidPercentage { value: pct });
            }
            Ok(basis_amount.percentage(pct))
        }
        FeeBasis::Fixed(amount) => {
            if amount.is_negative() {
                return Err(LedgerError::InvalidAmount { amount });
            }
            Ok(amount)
        }
    }
}

/// record of one master-to-admin fee skim, tied to the movement that
/// performed it
///
/// Fee state is queried by the existence of these rows, never by a flag on
/// the installment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeCollection {
    pub id: Uuid,
    pub project_id: Option<ProjectId>,
    pub amount: Money,
    pub currency: Currency,
    pub basis_amount: Money,
    pub percentage_applied: Option<Rate>,
    pub movement_id: MovementId,
    pub collected_at: DateTime<Utc>,
}
