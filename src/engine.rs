use hourglass_rs::SafeTimeProvider;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::account::AccountStore;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::movement::{meta, Movement, MovementLog};
use crate::types::{AccountId, Currency, GroupId, MovementKind};

/// one debit/credit pair of a transfer group
///
/// `None` on either side marks the external world: a client payment has no
/// internal source, a provider payment has no internal destination.
#[derive(Debug, Clone)]
pub struct Leg {
    pub source: Option<AccountId>,
    pub destination: Option<AccountId>,
    pub currency: Currency,
    /// always positive; direction is carried by source/destination
    pub amount: Money,
    pub kind: MovementKind,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

impl Leg {
    /// internal-to-internal transfer
    pub fn transfer(
        source: AccountId,
        destination: AccountId,
        currency: Currency,
        amount: Money,
        kind: MovementKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            source: Some(source),
            destination: Some(destination),
            currency,
            amount,
            kind,
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// money entering from outside
    pub fn inbound(
        destination: AccountId,
        currency: Currency,
        amount: Money,
        kind: MovementKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            source: None,
            destination: Some(destination),
            currency,
            amount,
            kind,
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// money leaving to outside
    pub fn outbound(
        source: AccountId,
        currency: Currency,
        amount: Money,
        kind: MovementKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            source: Some(source),
            destination: None,
            currency,
            amount,
            kind,
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// set of legs committed atomically as one operation
#[derive(Debug, Clone)]
pub struct TransferGroup {
    pub group_id: GroupId,
    pub legs: Vec<Leg>,
}

impl TransferGroup {
    pub fn new(legs: Vec<Leg>) -> Self {
        Self {
            group_id: Uuid::new_v4(),
            legs,
        }
    }

    /// signed balance effect per (account, currency); one CAS write per entry
    fn net_deltas(&self) -> BTreeMap<(AccountId, Currency), Money> {
        let mut deltas: BTreeMap<(AccountId, Currency), Money> = BTreeMap::new();
        for leg in &self.legs {
            if let Some(source) = leg.source {
                let entry = deltas.entry((source, leg.currency)).or_insert(Money::ZERO);
                *entry -= leg.amount;
            }
            if let Some(destination) = leg.destination {
                let entry = deltas
                    .entry((destination, leg.currency))
                    .or_insert(Money::ZERO);
                *entry += leg.amount;
            }
        }
        deltas.retain(|_, delta| !delta.is_zero());
        deltas
    }

    /// total debit per (account, currency), leg by leg
    fn debit_totals(&self) -> BTreeMap<(AccountId, Currency), Money> {
        let mut totals: BTreeMap<(AccountId, Currency), Money> = BTreeMap::new();
        for leg in &self.legs {
            if let Some(source) = leg.source {
                let entry = totals.entry((source, leg.currency)).or_insert(Money::ZERO);
                *entry += leg.amount;
            }
        }
        totals
    }
}

/// executes transfer groups atomically against the account store and the
/// movement log
pub struct LedgerEngine {
    accounts: Arc<dyn AccountStore>,
    movements: Arc<dyn MovementLog>,
    max_attempts: u32,
}

impl LedgerEngine {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        movements: Arc<dyn MovementLog>,
        max_attempts: u32,
    ) -> Self {
        Self {
            accounts,
            movements,
            max_attempts: max_attempts.max(1),
        }
    }

    /// execute a transfer group: all legs commit, or none do
    ///
    /// Version conflicts are retried up to the configured attempt budget;
    /// insufficient funds are surfaced immediately without retry.
    pub fn execute(
        &self,
        group: TransferGroup,
        time: &SafeTimeProvider,
    ) -> Result<Vec<Movement>> {
        self.validate(&group)?;

        let deltas = group.net_deltas();
        let debit_totals = group.debit_totals();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_commit(&deltas, &debit_totals) {
                Ok(()) => break,
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    debug!(group = %group.group_id, attempt, "version conflict, retrying group");
                    continue;
                }
                Err(err) if err.is_retryable() => {
                    warn!(group = %group.group_id, attempts = attempt, "transfer group exhausted retry budget");
                    return Err(LedgerError::Contention { attempts: attempt });
                }
                Err(err) => return Err(err),
            }
        }

        let now = time.now();
        let movements: Vec<Movement> = group
            .legs
            .into_iter()
            .map(|leg| Movement {
                id: Uuid::new_v4(),
                group_id: group.group_id,
                kind: leg.kind,
                currency: leg.currency,
                amount: leg.amount,
                source_account_id: leg.source,
                destination_account_id: leg.destination,
                created_at: now,
                description: leg.description,
                metadata: leg.metadata,
            })
            .collect();

        self.movements.append_group(movements.clone())?;
        debug!(group = %group.group_id, legs = movements.len(), "transfer group committed");
        Ok(movements)
    }

    /// structural validation; performed before any mutation and never retried
    fn validate(&self, group: &TransferGroup) -> Result<()> {
        if group.legs.is_empty() {
            return Err(self.invalid(group, "group has no legs"));
        }

        for leg in &group.legs {
            if !leg.amount.is_positive() {
                return Err(self.invalid(group, "leg amount must be positive"));
            }
            match (leg.source, leg.destination) {
                (None, None) => {
                    return Err(self.invalid(group, "leg must touch at least one internal account"))
                }
                (Some(s), Some(d)) if s == d => {
                    return Err(self.invalid(group, "leg source and destination must differ"))
                }
                _ => {}
            }
        }

        // a group spanning currencies must carry its conversion rate; the
        // engine never infers rates
        let mut currencies: Vec<Currency> = group.legs.iter().map(|l| l.currency).collect();
        currencies.sort();
        currencies.dedup();
        if currencies.len() > 1 {
            let missing_rate = group
                .legs
                .iter()
                .any(|leg| !leg.metadata.contains_key(meta::FX_RATE));
            if missing_rate {
                return Err(self.invalid(group, "cross-currency group missing conversion rate"));
            }
        }

        Ok(())
    }

    fn invalid(&self, group: &TransferGroup, reason: &str) -> LedgerError {
        warn!(group = %group.group_id, reason, "rejected invalid transfer group");
        LedgerError::InvalidTransferGroup {
            reason: reason.to_string(),
        }
    }

    /// one commit attempt: snapshot versions, check funds, apply debits then
    /// credits, roll back on failure
    fn try_commit(
        &self,
        deltas: &BTreeMap<(AccountId, Currency), Money>,
        debit_totals: &BTreeMap<(AccountId, Currency), Money>,
    ) -> Result<()> {
        // snapshot in account order; BTreeMap iteration fixes the lock and
        // application order across all concurrent groups. Debit totals are
        // included so legs that net out still get their funds check.
        let mut versions: HashMap<AccountId, u64> = HashMap::new();
        let mut balances: HashMap<(AccountId, Currency), Money> = HashMap::new();
        for (account_id, currency) in deltas.keys().chain(debit_totals.keys()) {
            let account = self
                .accounts
                .get(*account_id)
                .ok_or(LedgerError::AccountNotFound { id: *account_id })?;
            if account.closed {
                return Err(LedgerError::AccountClosed { id: *account_id });
            }
            versions.insert(*account_id, account.version);
            balances.insert((*account_id, *currency), account.balance(*currency));
        }

        // optimistic per-leg funds check; re-validated by the CAS at commit
        for ((account_id, currency), total_debit) in debit_totals {
            let available = balances
                .get(&(*account_id, *currency))
                .copied()
                .unwrap_or(Money::ZERO);
            if *total_debit > available {
                return Err(LedgerError::InsufficientFunds {
                    account: *account_id,
                    currency: *currency,
                    available,
                    requested: *total_debit,
                });
            }
        }

        // debits before credits: an in-flight group may briefly show money
        // removed, never money that was not there, so balances stay >= 0 and
        // rollback only ever re-credits
        let mut applied: Vec<(AccountId, Currency, Money)> = Vec::new();

        let debits = deltas.iter().filter(|(_, d)| d.is_negative());
        let credits = deltas.iter().filter(|(_, d)| d.is_positive());

        for ((account_id, currency), delta) in debits.chain(credits) {
            let expected = versions[account_id];
            let result = if delta.is_positive() {
                self.apply_with_conflict_retry(*account_id, *currency, *delta, expected)
            } else {
                self.accounts
                    .apply_delta(*account_id, *currency, *delta, expected)
            };

            match result {
                Ok((_, new_version)) => {
                    versions.insert(*account_id, new_version);
                    applied.push((*account_id, *currency, *delta));
                }
                Err(err) => {
                    self.rollback(&applied);
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// credits cannot fail the funds check, so a version conflict is absorbed
    /// here instead of restarting the whole group
    fn apply_with_conflict_retry(
        &self,
        account_id: AccountId,
        currency: Currency,
        delta: Money,
        mut expected: u64,
    ) -> Result<(Money, u64)> {
        loop {
            match self.accounts.apply_delta(account_id, currency, delta, expected) {
                Err(LedgerError::VersionConflict { actual, .. }) => {
                    expected = actual;
                }
                other => return other,
            }
        }
    }

    /// undo already-applied deltas in reverse order
    ///
    /// Reversing a debit is a credit, so only version conflicts can occur and
    /// they are absorbed. Reversing a credit can race a concurrent spend of
    /// the same funds; that path is reachable only when an account is closed
    /// between snapshot and apply, and is reported for manual reconciliation.
    fn rollback(&self, applied: &[(AccountId, Currency, Money)]) {
        for (account_id, currency, delta) in applied.iter().rev() {
            let reverse = Money::ZERO - *delta;
            let expected = match self.accounts.get(*account_id) {
                Some(account) => account.version,
                None => {
                    warn!(account = %account_id, "rollback target disappeared; manual reconciliation required");
                    continue;
                }
            };
            if let Err(err) = self.apply_with_conflict_retry(*account_id, *currency, reverse, expected)
            {
                warn!(account = %account_id, %err, "rollback failed; manual reconciliation required");
            }
        }
    }
}
