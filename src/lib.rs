pub mod account;
pub mod config;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod facade;
pub mod loan;
pub mod lookup;
pub mod movement;
pub mod policy;
pub mod types;

// re-export key types
pub use account::{AccountStore, CashAccount, MemoryAccountStore};
pub use config::LedgerConfig;
pub use decimal::{Money, Rate};
pub use engine::{LedgerEngine, Leg, TransferGroup};
pub use errors::{LedgerError, Result};
pub use facade::CashLedger;
pub use loan::{Loan, LoanStore, MemoryLoanStore};
pub use lookup::{ActorLookup, RateLookup, StaticActor, StaticRates};
pub use movement::{MemoryMovementLog, Movement, MovementLog};
pub use policy::{
    build_installment_schedule, compute_fee, FeeBasis, FeeCollection, Installment,
};
pub use types::{
    AccountId, AccountKind, Currency, GroupId, LoanFilter, LoanId, LoanStatus, MovementFilter,
    MovementId, MovementKind, OwnerRef, Page, ProjectId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
