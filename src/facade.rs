use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::account::{AccountStore, CashAccount, MemoryAccountStore};
use crate::config::LedgerConfig;
use crate::decimal::{Money, Rate};
use crate::engine::{Leg, LedgerEngine, TransferGroup};
use crate::errors::{LedgerError, Result};
use crate::loan::{Loan, LoanStore, MemoryLoanStore};
use crate::lookup::{ActorLookup, RateLookup, StaticActor, StaticRates};
use crate::movement::{meta, MemoryMovementLog, Movement, MovementLog};
use crate::policy::{build_installment_schedule, compute_fee, FeeBasis, FeeCollection};
use crate::types::{
    AccountId, AccountKind, Currency, LoanFilter, LoanId, MovementFilter, MovementKind, OwnerRef,
    Page, ProjectId,
};

enum IdempotencyEntry {
    InFlight,
    Completed(Vec<Movement>),
}

/// public surface of the ledger core
///
/// Explicitly constructed with injected store handles so every caller (and
/// every test) gets an isolated instance; there is no module-level singleton.
/// The facade owns no balance state and performs no retries beyond what the
/// engine already does.
pub struct CashLedger {
    accounts: Arc<dyn AccountStore>,
    movements: Arc<dyn MovementLog>,
    loans: Arc<dyn LoanStore>,
    rates: Arc<dyn RateLookup>,
    actors: Arc<dyn ActorLookup>,
    engine: LedgerEngine,
    config: LedgerConfig,
    fees: RwLock<Vec<FeeCollection>>,
    idempotency: Mutex<HashMap<String, IdempotencyEntry>>,
}

impl CashLedger {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        movements: Arc<dyn MovementLog>,
        loans: Arc<dyn LoanStore>,
        rates: Arc<dyn RateLookup>,
        actors: Arc<dyn ActorLookup>,
        config: LedgerConfig,
    ) -> Self {
        let engine = LedgerEngine::new(
            accounts.clone(),
            movements.clone(),
            config.max_commit_attempts,
        );
        Self {
            accounts,
            movements,
            loans,
            rates,
            actors,
            engine,
            config,
            fees: RwLock::new(Vec::new()),
            idempotency: Mutex::new(HashMap::new()),
        }
    }

    /// ledger backed by in-memory stores, for tests and local tooling
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::new(
            Arc::new(MemoryAccountStore::new()),
            Arc::new(MemoryMovementLog::new()),
            Arc::new(MemoryLoanStore::new()),
            Arc::new(StaticRates::new()),
            Arc::new(StaticActor::new(Uuid::new_v4())),
            config,
        )
    }

    // ---- account resolution -------------------------------------------------

    pub fn master_account(&self, now: DateTime<Utc>) -> Result<CashAccount> {
        self.accounts.get_or_create(
            AccountKind::Master,
            OwnerRef::Organization(self.config.organization_id),
            now,
        )
    }

    pub fn admin_account(&self, now: DateTime<Utc>) -> Result<CashAccount> {
        self.accounts.get_or_create(
            AccountKind::Admin,
            OwnerRef::Organization(self.config.organization_id),
            now,
        )
    }

    pub fn project_account(&self, project_id: ProjectId, now: DateTime<Utc>) -> Result<CashAccount> {
        self.accounts
            .get_or_create(AccountKind::Project, OwnerRef::Project(project_id), now)
    }

    /// soft-close an account once its owner is archived; all balances must be
    /// zero
    pub fn close_account(&self, account_id: AccountId) -> Result<()> {
        self.accounts.close(account_id)
    }

    /// fee basis from the configured organization revenue share
    pub fn default_fee_basis(&self) -> FeeBasis {
        FeeBasis::Percentage(self.config.default_fee_percentage)
    }

    // ---- balance-affecting operations ---------------------------------------

    /// record client revenue for a project
    ///
    /// The income is credited to the project account and additively mirrored
    /// into Master as its own external-sourced leg; the project is not
    /// debited for the mirror. Both movements commit in one group.
    pub fn record_project_income(
        &self,
        project_id: ProjectId,
        amount: Money,
        currency: Currency,
        description: impl Into<String>,
        idempotency_key: Option<&str>,
        time: &SafeTimeProvider,
    ) -> Result<Vec<Movement>> {
        let description = description.into();
        self.with_idempotency(idempotency_key, || {
            self.check_amount(amount)?;
            let now = time.now();
            let project = self.project_account(project_id, now)?;
            let master = self.master_account(now)?;

            let legs = vec![
                self.stamp(
                    Leg::inbound(project.id, currency, amount, MovementKind::ProjectIncome, description.clone()),
                    idempotency_key,
                ),
                self.stamp(
                    Leg::inbound(
                        master.id,
                        currency,
                        amount,
                        MovementKind::MasterMirror,
                        format!("{description} (master mirror)"),
                    ),
                    idempotency_key,
                ),
            ];
            self.engine.execute(TransferGroup::new(legs), time)
        })
    }

    /// skim the organization's revenue share from Master into Admin
    ///
    /// Refused whole, never partially applied, when Master lacks funds.
    pub fn collect_fee(
        &self,
        basis_amount: Money,
        currency: Currency,
        basis: FeeBasis,
        project_id: Option<ProjectId>,
        idempotency_key: Option<&str>,
        time: &SafeTimeProvider,
    ) -> Result<Vec<Movement>> {
        let fee = compute_fee(basis_amount, basis)?;
        if fee.is_zero() {
            debug!("zero fee computed, nothing to collect");
            return Ok(Vec::new());
        }

        let movements = self.with_idempotency(idempotency_key, || {
            let now = time.now();
            let master = self.master_account(now)?;
            let admin = self.admin_account(now)?;

            let leg = self.stamp(
                Leg::transfer(
                    master.id,
                    admin.id,
                    currency,
                    fee,
                    MovementKind::FeeCollection,
                    "admin fee collection",
                ),
                idempotency_key,
            );
            self.engine.execute(TransferGroup::new(vec![leg]), time)
        })?;

        let percentage_applied = match basis {
            FeeBasis::Percentage(rate) => Some(rate),
            FeeBasis::Fixed(_) => None,
        };
        let record = FeeCollection {
            id: Uuid::new_v4(),
            project_id,
            amount: fee,
            currency,
            basis_amount,
            percentage_applied,
            movement_id: movements[0].id,
            collected_at: movements[0].created_at,
        };
        let mut fees = self.fees.write().unwrap();
        if !fees.iter().any(|f| f.movement_id == record.movement_id) {
            fees.push(record);
        }

        Ok(movements)
    }

    /// pay a provider or contractor from a project
    ///
    /// Drains the project account and its Master mirror in one group; both
    /// debits must individually clear or the whole payment fails.
    pub fn record_provider_payment(
        &self,
        project_id: ProjectId,
        amount: Money,
        currency: Currency,
        description: impl Into<String>,
        idempotency_key: Option<&str>,
        time: &SafeTimeProvider,
    ) -> Result<Vec<Movement>> {
        let description = description.into();
        self.with_idempotency(idempotency_key, || {
            self.check_amount(amount)?;
            let now = time.now();
            let project = self.project_account(project_id, now)?;
            let master = self.master_account(now)?;

            let legs = vec![
                self.stamp(
                    Leg::outbound(project.id, currency, amount, MovementKind::ProviderExpense, description.clone()),
                    idempotency_key,
                ),
                self.stamp(
                    Leg::outbound(
                        master.id,
                        currency,
                        amount,
                        MovementKind::ProviderExpense,
                        format!("{description} (master mirror)"),
                    ),
                    idempotency_key,
                ),
            ];
            self.engine.execute(TransferGroup::new(legs), time)
        })
    }

    /// move funds between two existing accounts
    pub fn transfer_between_accounts(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Money,
        currency: Currency,
        description: impl Into<String>,
        idempotency_key: Option<&str>,
        time: &SafeTimeProvider,
    ) -> Result<Vec<Movement>> {
        let description = description.into();
        self.with_idempotency(idempotency_key, || {
            self.check_amount(amount)?;
            self.require_account(from)?;
            self.require_account(to)?;

            let leg = self.stamp(
                Leg::transfer(from, to, currency, amount, MovementKind::InternalTransfer, description.clone()),
                idempotency_key,
            );
            self.engine.execute(TransferGroup::new(vec![leg]), time)
        })
    }

    /// record an investor's capital injection into a project
    ///
    /// Deliberately asymmetric to client revenue: the contribution is NOT
    /// mirrored into Master and never bears an admin fee. Confirmed business
    /// rule, not an omission.
    pub fn register_investor_contribution(
        &self,
        project_id: ProjectId,
        amount: Money,
        currency: Currency,
        description: impl Into<String>,
        idempotency_key: Option<&str>,
        time: &SafeTimeProvider,
    ) -> Result<Vec<Movement>> {
        let description = description.into();
        self.with_idempotency(idempotency_key, || {
            self.check_amount(amount)?;
            let now = time.now();
            let project = self.project_account(project_id, now)?;

            let leg = self.stamp(
                Leg::inbound(project.id, currency, amount, MovementKind::InvestorContribution, description.clone()),
                idempotency_key,
            );
            self.engine.execute(TransferGroup::new(vec![leg]), time)
        })
    }

    /// exchange part of an account's balance into the other currency
    ///
    /// The rate comes from the injected lookup and is stored in the movement
    /// metadata for audit; the ledger never infers rates.
    pub fn convert_currency(
        &self,
        account_id: AccountId,
        from: Currency,
        to: Currency,
        amount: Money,
        idempotency_key: Option<&str>,
        time: &SafeTimeProvider,
    ) -> Result<Vec<Movement>> {
        if from == to {
            return Err(LedgerError::InvalidTransferGroup {
                reason: "conversion requires two distinct currencies".to_string(),
            });
        }
        let rate = self.rates.rate(from, to)?;
        let converted = amount * rate.as_decimal();

        self.with_idempotency(idempotency_key, || {
            self.check_amount(amount)?;
            self.check_amount(converted)?;
            self.require_account(account_id)?;
            let rate_str = rate.as_decimal().to_string();

            let legs = vec![
                self.stamp(
                    Leg::outbound(account_id, from, amount, MovementKind::CurrencyConversion, format!("sell {from}"))
                        .with_metadata(meta::FX_RATE, rate_str.clone()),
                    idempotency_key,
                ),
                self.stamp(
                    Leg::inbound(account_id, to, converted, MovementKind::CurrencyConversion, format!("buy {to}"))
                        .with_metadata(meta::FX_RATE, rate_str.clone()),
                    idempotency_key,
                ),
            ];
            self.engine.execute(TransferGroup::new(legs), time)
        })
    }

    /// disburse an inter-project loan and create its obligation row
    pub fn disburse_loan(
        &self,
        lender_project_id: ProjectId,
        borrower_project_id: ProjectId,
        principal: Money,
        currency: Currency,
        interest_rate: Rate,
        installment_count: u32,
        first_due: DateTime<Utc>,
        idempotency_key: Option<&str>,
        time: &SafeTimeProvider,
    ) -> Result<Loan> {
        let installments =
            build_installment_schedule(principal, interest_rate, installment_count, first_due)?;

        let loan_id = Uuid::new_v4();
        let movements = self.with_idempotency(idempotency_key, || {
            let now = time.now();
            let lender = self.project_account(lender_project_id, now)?;
            let borrower = self.project_account(borrower_project_id, now)?;

            let leg = self.stamp(
                Leg::transfer(
                    lender.id,
                    borrower.id,
                    currency,
                    principal,
                    MovementKind::LoanDisbursement,
                    "inter-project loan disbursement",
                )
                .with_metadata(meta::LOAN_ID, loan_id.to_string()),
                idempotency_key,
            );
            let movements = self.engine.execute(TransferGroup::new(vec![leg]), time)?;

            self.loans.insert(Loan {
                id: loan_id,
                lender_project_id,
                borrower_project_id,
                principal,
                currency,
                interest_rate,
                installments: installments.clone(),
                outstanding_balance: principal * interest_rate.gross_factor(),
                status: crate::types::LoanStatus::Active,
                disbursement_group_id: movements[0].group_id,
                created_at: movements[0].created_at,
            })?;
            Ok(movements)
        })?;

        // a replayed key carries the original loan id in its metadata
        let recorded_id = movements[0]
            .metadata
            .get(meta::LOAN_ID)
            .and_then(|id| id.parse::<Uuid>().ok())
            .unwrap_or(loan_id);
        self.loans
            .get(recorded_id)
            .ok_or(LedgerError::LoanNotFound { id: recorded_id })
    }

    /// repay part of a loan from the borrower back to the lender
    pub fn repay_loan(
        &self,
        loan_id: LoanId,
        amount: Money,
        idempotency_key: Option<&str>,
        time: &SafeTimeProvider,
    ) -> Result<Loan> {
        let loan = self
            .loans
            .get(loan_id)
            .ok_or(LedgerError::LoanNotFound { id: loan_id })?;

        // the transfer and the loan-row update share the idempotency
        // envelope, so a replayed key re-applies neither
        self.with_idempotency(idempotency_key, || {
            // validate against the obligation before moving any money
            let mut updated = loan.clone();
            updated.record_repayment(amount)?;

            let now = time.now();
            let borrower = self.project_account(loan.borrower_project_id, now)?;
            let lender = self.project_account(loan.lender_project_id, now)?;

            let leg = self.stamp(
                Leg::transfer(
                    borrower.id,
                    lender.id,
                    loan.currency,
                    amount,
                    MovementKind::LoanRepayment,
                    format!("loan repayment {}/{}", updated.repaid(), updated.total_due()),
                )
                .with_metadata(meta::LOAN_ID, loan_id.to_string()),
                idempotency_key,
            );
            let movements = self.engine.execute(TransferGroup::new(vec![leg]), time)?;
            self.loans.update(updated)?;
            Ok(movements)
        })?;

        self.loans
            .get(loan_id)
            .ok_or(LedgerError::LoanNotFound { id: loan_id })
    }

    /// cancel a loan through an explicit reversal group
    ///
    /// The remaining outstanding moves back borrower→lender, metadata-tagged
    /// with the disbursement group it reverses. The outstanding balance is
    /// never reset by a bare field edit.
    pub fn cancel_loan(
        &self,
        loan_id: LoanId,
        idempotency_key: Option<&str>,
        time: &SafeTimeProvider,
    ) -> Result<Loan> {
        let loan = self
            .loans
            .get(loan_id)
            .ok_or(LedgerError::LoanNotFound { id: loan_id })?;

        self.with_idempotency(idempotency_key, || {
            let mut updated = loan.clone();
            let reversal = updated.apply_cancellation()?;

            let movements = if reversal.is_positive() {
                let now = time.now();
                let borrower = self.project_account(loan.borrower_project_id, now)?;
                let lender = self.project_account(loan.lender_project_id, now)?;

                let leg = self.stamp(
                    Leg::transfer(
                        borrower.id,
                        lender.id,
                        loan.currency,
                        reversal,
                        MovementKind::LoanRepayment,
                        "loan cancellation reversal",
                    )
                    .with_metadata(meta::LOAN_ID, loan_id.to_string())
                    .with_metadata(meta::REVERSES_GROUP, loan.disbursement_group_id.to_string()),
                    idempotency_key,
                );
                self.engine.execute(TransferGroup::new(vec![leg]), time)?
            } else {
                Vec::new()
            };

            self.loans.update(updated)?;
            Ok(movements)
        })?;

        self.loans
            .get(loan_id)
            .ok_or(LedgerError::LoanNotFound { id: loan_id })
    }

    /// scheduler hook: flag a loan past its due date
    pub fn mark_loan_overdue(&self, loan_id: LoanId) -> Result<Loan> {
        let mut loan = self
            .loans
            .get(loan_id)
            .ok_or(LedgerError::LoanNotFound { id: loan_id })?;
        loan.mark_overdue();
        self.loans.update(loan.clone())?;
        Ok(loan)
    }

    // ---- read queries -------------------------------------------------------

    pub fn get_balance(&self, account_id: AccountId, currency: Currency) -> Result<Money> {
        self.accounts
            .get(account_id)
            .map(|account| account.balance(currency))
            .ok_or(LedgerError::AccountNotFound { id: account_id })
    }

    pub fn list_movements(&self, filter: &MovementFilter, page: Page) -> Vec<Movement> {
        self.movements.list(filter, page)
    }

    pub fn get_loan(&self, loan_id: LoanId) -> Option<Loan> {
        self.loans.get(loan_id)
    }

    pub fn list_loans(&self, filter: &LoanFilter) -> Vec<Loan> {
        self.loans.list(filter)
    }

    pub fn list_fee_collections(&self) -> Vec<FeeCollection> {
        self.fees.read().unwrap().clone()
    }

    /// recovery path after a caller-side timeout: look the operation up by
    /// its idempotency key instead of blindly retrying
    pub fn find_by_idempotency_key(&self, key: &str) -> Vec<Movement> {
        self.movements.find_by_idempotency_key(key)
    }

    // ---- internals ----------------------------------------------------------

    fn check_amount(&self, amount: Money) -> Result<()> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount { amount });
        }
        Ok(())
    }

    fn require_account(&self, id: AccountId) -> Result<CashAccount> {
        self.accounts
            .get(id)
            .ok_or(LedgerError::AccountNotFound { id })
    }

    /// audit metadata stamped on every leg the facade assembles
    fn stamp(&self, leg: Leg, idempotency_key: Option<&str>) -> Leg {
        let leg = leg.with_metadata(meta::ACTOR_ID, self.actors.current_actor().to_string());
        match idempotency_key {
            Some(key) => leg.with_metadata(meta::IDEMPOTENCY_KEY, key),
            None => leg,
        }
    }

    /// run an operation once per idempotency key
    ///
    /// A completed key replays the stored movements without touching any
    /// balance; a key still in flight is rejected; a failed attempt clears
    /// the key so the caller can retry with the same one.
    fn with_idempotency<F>(&self, key: Option<&str>, op: F) -> Result<Vec<Movement>>
    where
        F: FnOnce() -> Result<Vec<Movement>>,
    {
        let Some(key) = key else {
            return op();
        };

        {
            let mut registry = self.idempotency.lock().unwrap();
            match registry.get(key) {
                Some(IdempotencyEntry::Completed(movements)) => {
                    debug!(key, "replaying completed operation for repeated idempotency key");
                    return Ok(movements.clone());
                }
                Some(IdempotencyEntry::InFlight) => {
                    return Err(LedgerError::DuplicateOperation {
                        key: key.to_string(),
                    });
                }
                None => {
                    registry.insert(key.to_string(), IdempotencyEntry::InFlight);
                }
            }
        }

        let result = op();

        let mut registry = self.idempotency.lock().unwrap();
        match &result {
            Ok(movements) => {
                registry.insert(key.to_string(), IdempotencyEntry::Completed(movements.clone()));
            }
            Err(_) => {
                registry.remove(key);
            }
        }
        result
    }
}
