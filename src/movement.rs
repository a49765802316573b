use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::decimal::Money;
use crate::errors::Result;
use crate::types::{AccountId, Currency, GroupId, MovementFilter, MovementId, MovementKind, Page};

/// well-known metadata keys stamped on movements
pub mod meta {
    /// acting user recorded for audit
    pub const ACTOR_ID: &str = "actor_id";
    /// exchange rate used for a conversion leg
    pub const FX_RATE: &str = "fx_rate";
    /// caller-supplied idempotency key of the originating operation
    pub const IDEMPOTENCY_KEY: &str = "idempotency_key";
    /// group id this movement reverses
    pub const REVERSES_GROUP: &str = "reverses_group";
    /// loan the movement disburses or repays
    pub const LOAN_ID: &str = "loan_id";
}

/// immutable ledger entry recording one leg of a balance change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    /// shared by all movements committed in one transfer group
    pub group_id: GroupId,
    pub kind: MovementKind,
    pub currency: Currency,
    /// always positive; direction is carried by source/destination
    pub amount: Money,
    /// None marks the external world (client payments in, provider payments out)
    pub source_account_id: Option<AccountId>,
    pub destination_account_id: Option<AccountId>,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

impl Movement {
    /// whether the movement touches the given account on either side
    pub fn touches(&self, account_id: AccountId) -> bool {
        self.source_account_id == Some(account_id)
            || self.destination_account_id == Some(account_id)
    }
}

/// append-only storage contract for the movement log
pub trait MovementLog: Send + Sync {
    /// append every movement of a committed group in one call; rows are
    /// immutable once written
    fn append_group(&self, movements: Vec<Movement>) -> Result<()>;

    fn list(&self, filter: &MovementFilter, page: Page) -> Vec<Movement>;

    fn by_group(&self, group_id: GroupId) -> Vec<Movement>;

    /// recovery path for "operation status unknown": look the group up by the
    /// idempotency key stamped in its metadata
    fn find_by_idempotency_key(&self, key: &str) -> Vec<Movement>;

    fn count(&self, filter: &MovementFilter) -> usize;
}

struct StoredMovement {
    seq: u64,
    movement: Movement,
}

/// thread-safe in-memory movement log
pub struct MemoryMovementLog {
    rows: RwLock<Vec<StoredMovement>>,
    seq: AtomicU64,
}

impl MemoryMovementLog {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            seq: AtomicU64::new(0),
        }
    }

    fn matches(filter: &MovementFilter, movement: &Movement) -> bool {
        if let Some(account_id) = filter.account_id {
            if !movement.touches(account_id) {
                return false;
            }
        }
        if let Some(kind) = filter.kind {
            if movement.kind != kind {
                return false;
            }
        }
        if let Some(currency) = filter.currency {
            if movement.currency != currency {
                return false;
            }
        }
        if let Some(group_id) = filter.group_id {
            if movement.group_id != group_id {
                return false;
            }
        }
        if let Some(since) = filter.since {
            if movement.created_at < since {
                return false;
            }
        }
        if let Some(until) = filter.until {
            if movement.created_at > until {
                return false;
            }
        }
        true
    }
}

impl Default for MemoryMovementLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MovementLog for MemoryMovementLog {
    fn append_group(&self, movements: Vec<Movement>) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        for movement in movements {
            let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
            rows.push(StoredMovement { seq, movement });
        }
        Ok(())
    }

    fn list(&self, filter: &MovementFilter, page: Page) -> Vec<Movement> {
        let rows = self.rows.read().unwrap();
        rows.iter()
            .filter(|r| Self::matches(filter, &r.movement))
            .skip(page.offset)
            .take(page.limit)
            .map(|r| r.movement.clone())
            .collect()
    }

    fn by_group(&self, group_id: GroupId) -> Vec<Movement> {
        let rows = self.rows.read().unwrap();
        rows.iter()
            .filter(|r| r.movement.group_id == group_id)
            .map(|r| r.movement.clone())
            .collect()
    }

    fn find_by_idempotency_key(&self, key: &str) -> Vec<Movement> {
        let rows = self.rows.read().unwrap();
        rows.iter()
            .filter(|r| {
                r.movement
                    .metadata
                    .get(meta::IDEMPOTENCY_KEY)
                    .is_some_and(|k| k == key)
            })
            .map(|r| r.movement.clone())
            .collect()
    }

    fn count(&self, filter: &MovementFilter) -> usize {
        let rows = self.rows.read().unwrap();
        rows.iter()
            .filter(|r| Self::matches(filter, &r.movement))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn movement(kind: MovementKind, group_id: GroupId, destination: Option<AccountId>) -> Movement {
        Movement {
            id: Uuid::new_v4(),
            group_id,
            kind,
            currency: Currency::ARS,
            amount: Money::from_major(100),
            source_account_id: None,
            destination_account_id: destination,
            created_at: Utc::now(),
            description: "test".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_append_and_group_query() {
        let log = MemoryMovementLog::new();
        let group = Uuid::new_v4();
        let account = Uuid::new_v4();

        log.append_group(vec![
            movement(MovementKind::ProjectIncome, group, Some(account)),
            movement(MovementKind::MasterMirror, group, Some(Uuid::new_v4())),
        ])
        .unwrap();
        log.append_group(vec![movement(
            MovementKind::InvestorContribution,
            Uuid::new_v4(),
            Some(account),
        )])
        .unwrap();

        assert_eq!(log.by_group(group).len(), 2);
        assert_eq!(log.count(&MovementFilter::default()), 3);
    }

    #[test]
    fn test_account_filter_matches_either_side() {
        let log = MemoryMovementLog::new();
        let account = Uuid::new_v4();

        let mut outgoing = movement(MovementKind::ProviderExpense, Uuid::new_v4(), None);
        outgoing.source_account_id = Some(account);
        log.append_group(vec![
            outgoing,
            movement(MovementKind::ProjectIncome, Uuid::new_v4(), Some(account)),
            movement(MovementKind::ProjectIncome, Uuid::new_v4(), Some(Uuid::new_v4())),
        ])
        .unwrap();

        let found = log.list(&MovementFilter::for_account(account), Page::default());
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_kind_filter_and_pagination() {
        let log = MemoryMovementLog::new();
        let account = Uuid::new_v4();
        for _ in 0..5 {
            log.append_group(vec![movement(
                MovementKind::ProjectIncome,
                Uuid::new_v4(),
                Some(account),
            )])
            .unwrap();
        }

        let filter = MovementFilter {
            kind: Some(MovementKind::ProjectIncome),
            ..MovementFilter::default()
        };
        let page = Page { offset: 3, limit: 10 };
        assert_eq!(log.list(&filter, page).len(), 2);

        let none = MovementFilter {
            kind: Some(MovementKind::FeeCollection),
            ..MovementFilter::default()
        };
        assert!(log.list(&none, Page::default()).is_empty());
    }

    #[test]
    fn test_find_by_idempotency_key() {
        let log = MemoryMovementLog::new();
        let mut m = movement(MovementKind::ProjectIncome, Uuid::new_v4(), Some(Uuid::new_v4()));
        m.metadata
            .insert(meta::IDEMPOTENCY_KEY.to_string(), "income-42".to_string());
        log.append_group(vec![m]).unwrap();

        assert_eq!(log.find_by_idempotency_key("income-42").len(), 1);
        assert!(log.find_by_idempotency_key("income-43").is_empty());
    }
}
