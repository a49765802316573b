use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{AccountId, AccountKind, Currency, OwnerRef};

/// cash account with per-currency balances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashAccount {
    pub id: AccountId,
    pub kind: AccountKind,
    pub owner: OwnerRef,
    /// non-negative balance per currency; missing entry means zero
    pub balances: BTreeMap<Currency, Money>,
    /// optimistic concurrency token, bumped on every balance mutation
    pub version: u64,
    pub closed: bool,
    pub created_at: DateTime<Utc>,
}

impl CashAccount {
    pub fn balance(&self, currency: Currency) -> Money {
        self.balances.get(&currency).copied().unwrap_or(Money::ZERO)
    }

    /// all balances zero
    pub fn is_empty(&self) -> bool {
        self.balances.values().all(|b| b.is_zero())
    }
}

/// durable storage contract for cash accounts
pub trait AccountStore: Send + Sync {
    fn get(&self, id: AccountId) -> Option<CashAccount>;

    fn find_by_owner(&self, kind: AccountKind, owner: OwnerRef) -> Option<CashAccount>;

    /// fetch the unique account for (kind, owner), creating it lazily
    fn get_or_create(
        &self,
        kind: AccountKind,
        owner: OwnerRef,
        now: DateTime<Utc>,
    ) -> Result<CashAccount>;

    /// compare-and-swap balance update: the version check, balance write and
    /// version bump happen under one write lock or not at all
    fn apply_delta(
        &self,
        id: AccountId,
        currency: Currency,
        delta: Money,
        expected_version: u64,
    ) -> Result<(Money, u64)>;

    /// soft-close; refused while any balance is non-zero
    fn close(&self, id: AccountId) -> Result<()>;

    fn list(&self) -> Vec<CashAccount>;
}

struct Inner {
    accounts: HashMap<AccountId, CashAccount>,
    by_owner: HashMap<(AccountKind, OwnerRef), AccountId>,
}

/// thread-safe in-memory account store
pub struct MemoryAccountStore {
    inner: RwLock<Inner>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                accounts: HashMap::new(),
                by_owner: HashMap::new(),
            }),
        }
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for MemoryAccountStore {
    fn get(&self, id: AccountId) -> Option<CashAccount> {
        let inner = self.inner.read().unwrap();
        inner.accounts.get(&id).cloned()
    }

    fn find_by_owner(&self, kind: AccountKind, owner: OwnerRef) -> Option<CashAccount> {
        let inner = self.inner.read().unwrap();
        inner
            .by_owner
            .get(&(kind, owner))
            .and_then(|id| inner.accounts.get(id))
            .cloned()
    }

    fn get_or_create(
        &self,
        kind: AccountKind,
        owner: OwnerRef,
        now: DateTime<Utc>,
    ) -> Result<CashAccount> {
        let mut inner = self.inner.write().unwrap();

        if let Some(id) = inner.by_owner.get(&(kind, owner)) {
            return Ok(inner.accounts[id].clone());
        }

        let account = CashAccount {
            id: Uuid::new_v4(),
            kind,
            owner,
            balances: BTreeMap::new(),
            version: 0,
            closed: false,
            created_at: now,
        };

        inner.by_owner.insert((kind, owner), account.id);
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    fn apply_delta(
        &self,
        id: AccountId,
        currency: Currency,
        delta: Money,
        expected_version: u64,
    ) -> Result<(Money, u64)> {
        let mut inner = self.inner.write().unwrap();

        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or(LedgerError::AccountNotFound { id })?;

        if account.closed {
            return Err(LedgerError::AccountClosed { id });
        }

        if account.version != expected_version {
            return Err(LedgerError::VersionConflict {
                account: id,
                expected: expected_version,
                actual: account.version,
            });
        }

        let current = account.balance(currency);
        let next = current + delta;
        if next.is_negative() {
            return Err(LedgerError::InsufficientFunds {
                account: id,
                currency,
                available: current,
                requested: delta.abs(),
            });
        }

        account.balances.insert(currency, next);
        account.version += 1;
        Ok((next, account.version))
    }

    fn close(&self, id: AccountId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or(LedgerError::AccountNotFound { id })?;

        if !account.is_empty() {
            return Err(LedgerError::AccountNotEmpty { id });
        }

        account.closed = true;
        Ok(())
    }

    fn list(&self) -> Vec<CashAccount> {
        let inner = self.inner.read().unwrap();
        inner.accounts.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_account(kind: AccountKind) -> (MemoryAccountStore, CashAccount) {
        let store = MemoryAccountStore::new();
        let owner = match kind {
            AccountKind::Project => OwnerRef::Project(Uuid::new_v4()),
            _ => OwnerRef::Organization(Uuid::new_v4()),
        };
        let account = store.get_or_create(kind, owner, Utc::now()).unwrap();
        (store, account)
    }

    #[test]
    fn test_get_or_create_is_singleton_per_owner() {
        let store = MemoryAccountStore::new();
        let org = OwnerRef::Organization(Uuid::new_v4());

        let first = store.get_or_create(AccountKind::Master, org, Utc::now()).unwrap();
        let second = store.get_or_create(AccountKind::Master, org, Utc::now()).unwrap();
        assert_eq!(first.id, second.id);

        // admin for the same organization is a different account
        let admin = store.get_or_create(AccountKind::Admin, org, Utc::now()).unwrap();
        assert_ne!(admin.id, first.id);
    }

    #[test]
    fn test_apply_delta_credits_and_debits() {
        let (store, account) = store_with_account(AccountKind::Project);

        let (balance, version) = store
            .apply_delta(account.id, Currency::ARS, Money::from_major(500), 0)
            .unwrap();
        assert_eq!(balance, Money::from_major(500));
        assert_eq!(version, 1);

        let (balance, version) = store
            .apply_delta(account.id, Currency::ARS, Money::ZERO - Money::from_major(200), 1)
            .unwrap();
        assert_eq!(balance, Money::from_major(300));
        assert_eq!(version, 2);
    }

    #[test]
    fn test_apply_delta_rejects_overdraw_without_mutation() {
        let (store, account) = store_with_account(AccountKind::Project);
        store
            .apply_delta(account.id, Currency::ARS, Money::from_major(100), 0)
            .unwrap();

        let err = store
            .apply_delta(account.id, Currency::ARS, Money::ZERO - Money::from_major(150), 1)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        // no mutation: balance and version unchanged
        let account = store.get(account.id).unwrap();
        assert_eq!(account.balance(Currency::ARS), Money::from_major(100));
        assert_eq!(account.version, 1);
    }

    #[test]
    fn test_apply_delta_rejects_stale_version() {
        let (store, account) = store_with_account(AccountKind::Project);
        store
            .apply_delta(account.id, Currency::USD, Money::from_major(50), 0)
            .unwrap();

        let err = store
            .apply_delta(account.id, Currency::USD, Money::from_major(10), 0)
            .unwrap_err();
        match err {
            LedgerError::VersionConflict { expected, actual, .. } => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("expected VersionConflict, got {other:?}"),
        }
    }

    #[test]
    fn test_currencies_are_independent() {
        let (store, account) = store_with_account(AccountKind::Project);
        store
            .apply_delta(account.id, Currency::ARS, Money::from_major(100), 0)
            .unwrap();
        store
            .apply_delta(account.id, Currency::USD, Money::from_major(40), 1)
            .unwrap();

        let account = store.get(account.id).unwrap();
        assert_eq!(account.balance(Currency::ARS), Money::from_major(100));
        assert_eq!(account.balance(Currency::USD), Money::from_major(40));
    }

    #[test]
    fn test_close_requires_zero_balances() {
        let (store, account) = store_with_account(AccountKind::Project);
        store
            .apply_delta(account.id, Currency::ARS, Money::from_major(10), 0)
            .unwrap();

        assert!(matches!(
            store.close(account.id),
            Err(LedgerError::AccountNotEmpty { .. })
        ));

        store
            .apply_delta(account.id, Currency::ARS, Money::ZERO - Money::from_major(10), 1)
            .unwrap();
        store.close(account.id).unwrap();

        // closed accounts refuse further deltas
        assert!(matches!(
            store.apply_delta(account.id, Currency::ARS, Money::from_major(1), 2),
            Err(LedgerError::AccountClosed { .. })
        ));
    }
}
