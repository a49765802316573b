use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Rate;
use crate::types::OrganizationId;

/// ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// organization owning the master and admin accounts
    pub organization_id: OrganizationId,
    /// bounded retry count for optimistic-version conflicts
    pub max_commit_attempts: u32,
    /// default revenue share skimmed into the admin account
    pub default_fee_percentage: Rate,
}

impl LedgerConfig {
    /// configuration with the standard retry budget and fee share
    pub fn new(organization_id: OrganizationId) -> Self {
        Self {
            organization_id,
            max_commit_attempts: 5,
            default_fee_percentage: Rate::from_decimal(dec!(0.10)),
        }
    }

    pub fn with_fee_percentage(mut self, fee: Rate) -> Self {
        self.default_fee_percentage = fee;
        self
    }

    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new(Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::new(Uuid::new_v4());
        assert_eq!(config.max_commit_attempts, 5);
        assert_eq!(config.default_fee_percentage.as_percentage(), dec!(10));
    }

    #[test]
    fn test_attempts_floor() {
        let config = LedgerConfig::default().with_max_commit_attempts(0);
        assert_eq!(config.max_commit_attempts, 1);
    }
}
