use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::policy::Installment;
use crate::types::{Currency, GroupId, LoanFilter, LoanId, LoanStatus, ProjectId};

/// inter-project loan, layered on ledger movements
///
/// The loan row itself never moves money; it tracks the obligation created by
/// a LoanDisbursement group and is mutated only when repayment or reversal
/// movements are recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub lender_project_id: ProjectId,
    pub borrower_project_id: ProjectId,
    pub principal: Money,
    pub currency: Currency,
    pub interest_rate: Rate,
    pub installments: Vec<Installment>,
    /// principal * (1 + rate) minus recorded repayments; never negative
    pub outstanding_balance: Money,
    pub status: LoanStatus,
    /// transfer group that disbursed the principal
    pub disbursement_group_id: GroupId,
    pub created_at: DateTime<Utc>,
}

impl Loan {
    pub fn total_due(&self) -> Money {
        self.principal * self.interest_rate.gross_factor()
    }

    pub fn repaid(&self) -> Money {
        self.total_due() - self.outstanding_balance
    }

    /// whether the loan currently accepts repayments
    pub fn is_repayable(&self) -> bool {
        matches!(self.status, LoanStatus::Active | LoanStatus::Overdue)
    }

    /// apply a recorded repayment movement to the obligation
    ///
    /// Fills installments in order and flips status to Paid exactly when the
    /// outstanding balance reaches zero. Overdue loans keep accepting
    /// repayments.
    pub fn record_repayment(&mut self, amount: Money) -> Result<()> {
        if !self.is_repayable() {
            return Err(LedgerError::LoanNotRepayable {
                id: self.id,
                status: self.status,
            });
        }
        if !amount.is_positive() || amount > self.outstanding_balance {
            return Err(LedgerError::InvalidAmount { amount });
        }

        self.outstanding_balance -= amount;

        let mut remaining = amount;
        for installment in &mut self.installments {
            if remaining.is_zero() {
                break;
            }
            let applied = installment.outstanding().min(remaining);
            installment.paid += applied;
            remaining -= applied;
        }

        if self.outstanding_balance.is_zero() {
            self.status = LoanStatus::Paid;
        }
        Ok(())
    }

    /// scheduler hook: past due date with balance remaining
    ///
    /// Display/policy state only, not a ledger freeze.
    pub fn mark_overdue(&mut self) {
        if self.status == LoanStatus::Active && self.outstanding_balance.is_positive() {
            self.status = LoanStatus::Overdue;
        }
    }

    /// close the loan through an explicit reversal; returns the amount the
    /// reversal group must move back
    pub fn apply_cancellation(&mut self) -> Result<Money> {
        if !self.is_repayable() {
            return Err(LedgerError::LoanNotRepayable {
                id: self.id,
                status: self.status,
            });
        }
        let reversal = self.outstanding_balance;
        self.outstanding_balance = Money::ZERO;
        self.status = LoanStatus::Cancelled;
        Ok(reversal)
    }
}

/// durable storage contract for loans
pub trait LoanStore: Send + Sync {
    fn insert(&self, loan: Loan) -> Result<()>;

    fn get(&self, id: LoanId) -> Option<Loan>;

    fn update(&self, loan: Loan) -> Result<()>;

    fn list(&self, filter: &LoanFilter) -> Vec<Loan>;
}

/// thread-safe in-memory loan store
pub struct MemoryLoanStore {
    loans: RwLock<HashMap<LoanId, Loan>>,
}

impl MemoryLoanStore {
    pub fn new() -> Self {
        Self {
            loans: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryLoanStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LoanStore for MemoryLoanStore {
    fn insert(&self, loan: Loan) -> Result<()> {
        let mut loans = self.loans.write().unwrap();
        loans.insert(loan.id, loan);
        Ok(())
    }

    fn get(&self, id: LoanId) -> Option<Loan> {
        let loans = self.loans.read().unwrap();
        loans.get(&id).cloned()
    }

    fn update(&self, loan: Loan) -> Result<()> {
        let mut loans = self.loans.write().unwrap();
        if !loans.contains_key(&loan.id) {
            return Err(LedgerError::LoanNotFound { id: loan.id });
        }
        loans.insert(loan.id, loan);
        Ok(())
    }

    fn list(&self, filter: &LoanFilter) -> Vec<Loan> {
        let loans = self.loans.read().unwrap();
        loans
            .values()
            .filter(|loan| {
                filter.status.map_or(true, |s| loan.status == s)
                    && filter
                        .lender_project_id
                        .map_or(true, |p| loan.lender_project_id == p)
                    && filter
                        .borrower_project_id
                        .map_or(true, |p| loan.borrower_project_id == p)
            })
            .cloned()
            .collect()
    }
}
