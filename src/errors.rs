use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{Currency, LoanStatus};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("insufficient funds in account {account} ({currency}): available {available}, requested {requested}")]
    InsufficientFunds {
        account: Uuid,
        currency: Currency,
        available: Money,
        requested: Money,
    },

    #[error("version conflict on account {account}: expected {expected}, found {actual}")]
    VersionConflict {
        account: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("transfer group could not commit after {attempts} attempts")]
    Contention {
        attempts: u32,
    },

    #[error("invalid transfer group: {reason}")]
    InvalidTransferGroup {
        reason: String,
    },

    #[error("duplicate operation for idempotency key {key}")]
    DuplicateOperation {
        key: String,
    },

    #[error("account not found: {id}")]
    AccountNotFound {
        id: Uuid,
    },

    #[error("account {id} is closed")]
    AccountClosed {
        id: Uuid,
    },

    #[error("account {id} still holds funds and cannot be closed")]
    AccountNotEmpty {
        id: Uuid,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: Uuid,
    },

    #[error("loan {id} cannot accept repayments: current status is {status:?}")]
    LoanNotRepayable {
        id: Uuid,
        status: LoanStatus,
    },

    #[error("invalid percentage: {value}")]
    InvalidPercentage {
        value: rust_decimal::Decimal,
    },

    #[error("invalid installment count: {count}")]
    InvalidInstallmentCount {
        count: u32,
    },

    #[error("invalid amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("no exchange rate available from {from} to {to}")]
    RateUnavailable {
        from: Currency,
        to: Currency,
    },
}

impl LedgerError {
    /// whether the engine may retry the failed attempt internally
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::VersionConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
