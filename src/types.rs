use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for a cash account
pub type AccountId = Uuid;

/// unique identifier for a movement row
pub type MovementId = Uuid;

/// correlates the movements of one atomic transfer group
pub type GroupId = Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a project
pub type ProjectId = Uuid;

/// unique identifier for the owning organization
pub type OrganizationId = Uuid;

/// currencies tracked per account
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Currency {
    ARS,
    USD,
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Currency::ARS => write!(f, "ARS"),
            Currency::USD => write!(f, "USD"),
        }
    }
}

/// cash account kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    /// organization-wide account mirroring all project revenue
    Master,
    /// administrative account receiving skimmed fees
    Admin,
    /// per-project working account
    Project,
}

/// who an account belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerRef {
    Organization(OrganizationId),
    Project(ProjectId),
}

/// what a movement documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    ProjectIncome,
    MasterMirror,
    FeeCollection,
    LoanDisbursement,
    LoanRepayment,
    ProviderExpense,
    InvestorContribution,
    CurrencyConversion,
    InternalTransfer,
}

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// disbursed and accepting repayments
    Active,
    /// outstanding balance reached zero
    Paid,
    /// past due date with balance remaining; repayments still accepted
    Overdue,
    /// closed by an explicit reversal group
    Cancelled,
}

/// filter for movement log queries
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub account_id: Option<AccountId>,
    pub kind: Option<MovementKind>,
    pub currency: Option<Currency>,
    pub group_id: Option<GroupId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn for_account(account_id: AccountId) -> Self {
        Self {
            account_id: Some(account_id),
            ..Self::default()
        }
    }

    pub fn for_group(group_id: GroupId) -> Self {
        Self {
            group_id: Some(group_id),
            ..Self::default()
        }
    }
}

/// offset/limit pagination for read queries
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

/// filter for loan queries
#[derive(Debug, Clone, Default)]
pub struct LoanFilter {
    pub status: Option<LoanStatus>,
    pub lender_project_id: Option<ProjectId>,
    pub borrower_project_id: Option<ProjectId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_display() {
        assert_eq!(Currency::ARS.to_string(), "ARS");
        assert_eq!(Currency::USD.to_string(), "USD");
    }

    #[test]
    fn test_movement_filter_builders() {
        let account = Uuid::new_v4();
        let filter = MovementFilter::for_account(account);
        assert_eq!(filter.account_id, Some(account));
        assert!(filter.kind.is_none());

        let group = Uuid::new_v4();
        let filter = MovementFilter::for_group(group);
        assert_eq!(filter.group_id, Some(group));
    }
}
