use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::decimal::Rate;
use crate::errors::{LedgerError, Result};
use crate::types::Currency;

/// exchange-rate source for cross-currency legs; the ledger never infers
/// rates on its own
pub trait RateLookup: Send + Sync {
    /// units of `to` bought by one unit of `from`
    fn rate(&self, from: Currency, to: Currency) -> Result<Rate>;
}

/// identity source for audit metadata on movements
pub trait ActorLookup: Send + Sync {
    /// acting user or service of the current request
    fn current_actor(&self) -> Uuid;
}

/// fixed rate table for testing and offline use
pub struct StaticRates {
    rates: RwLock<HashMap<(Currency, Currency), Rate>>,
}

impl StaticRates {
    pub fn new() -> Self {
        Self {
            rates: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, from: Currency, to: Currency, rate: Rate) {
        let mut rates = self.rates.write().unwrap();
        rates.insert((from, to), rate);
    }
}

impl Default for StaticRates {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLookup for StaticRates {
    fn rate(&self, from: Currency, to: Currency) -> Result<Rate> {
        if from == to {
            return Ok(Rate::from_decimal(Decimal::ONE));
        }
        let rates = self.rates.read().unwrap();
        rates
            .get(&(from, to))
            .copied()
            .ok_or(LedgerError::RateUnavailable { from, to })
    }
}

/// single fixed actor, for tests and batch jobs
pub struct StaticActor {
    actor: Uuid,
}

impl StaticActor {
    pub fn new(actor: Uuid) -> Self {
        Self { actor }
    }
}

impl ActorLookup for StaticActor {
    fn current_actor(&self) -> Uuid {
        self.actor
    }
}
