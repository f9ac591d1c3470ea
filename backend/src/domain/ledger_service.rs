//! Ledger service: the [`Ledger`] bound to a persistent store.
//!
//! The service starts in the loading phase with default collections standing
//! in for persisted ones. [`LedgerService::load`] reads the store once and
//! moves it to ready, whether or not the reads succeed. From then on every
//! mutation ends with an awaited write of all three collections.
//!
//! Store failures never surface from mutations. They are logged, memory stays
//! authoritative and [`LedgerService::is_synced`] reports false until the
//! next successful write.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use shared::{
    Backup, Balance, CompanyDebtStatus, CreateLoanRequest, CreateTransactionRequest, LedgerSummary,
    Loan, LoanBookResponse, LoanMovementResponse, NewLoan, NewTransaction, RepayLoanRequest,
    Transaction, TransactionListRequest, TransactionListResponse, TransactionType,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::ledger::{normalize_loan, Ledger};
use super::validation::{
    validate_amounts, validate_description, validate_lender_name, validate_repayment,
    ValidationError,
};
use crate::storage::{KeyValueStore, BACKUPS_KEY, INITIAL_BALANCE_KEY, LOANS_KEY, TRANSACTIONS_KEY};

/// How many transactions the summary carries for the dashboard
pub const RECENT_TRANSACTION_COUNT: usize = 5;

/// Default size of the backup history
pub const DEFAULT_MAX_BACKUPS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSettings {
    /// Initial balance for a fresh or cleared ledger
    pub default_initial_balance: Balance,
    /// Number of backups kept, newest first
    pub max_backups: usize,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            default_initial_balance: Balance::seed(),
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Loading,
    Ready,
}

struct LedgerState {
    ledger: Ledger,
    phase: LoadPhase,
    synced: bool,
}

pub struct LedgerService<S: KeyValueStore> {
    store: Arc<S>,
    state: Arc<Mutex<LedgerState>>,
    settings: LedgerSettings,
}

impl<S: KeyValueStore> Clone for LedgerService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            state: Arc::clone(&self.state),
            settings: self.settings.clone(),
        }
    }
}

impl<S: KeyValueStore> LedgerService<S> {
    /// Create a service in the loading phase. Nothing is read until [`Self::load`].
    pub fn new(store: S, settings: LedgerSettings) -> Self {
        let ledger = Ledger::new(settings.default_initial_balance);
        Self {
            store: Arc::new(store),
            state: Arc::new(Mutex::new(LedgerState {
                ledger,
                phase: LoadPhase::Loading,
                synced: true,
            })),
            settings,
        }
    }

    /// Create a service and load it from the store
    pub async fn open(store: S, settings: LedgerSettings) -> Self {
        let service = Self::new(store, settings);
        service.load().await;
        service
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Read the three collections from the store and enter the ready phase.
    ///
    /// Keys that are absent keep their current values. A failed read keeps
    /// every collection as it is; an unreadable payload only affects its own
    /// key. Calling this again once ready does nothing.
    pub async fn load(&self) {
        let mut state = self.state.lock().await;
        if state.phase == LoadPhase::Ready {
            debug!("Ledger already loaded, skipping");
            return;
        }

        info!("Loading ledger from store");
        let reads = tokio::try_join!(
            self.store.get_item(TRANSACTIONS_KEY),
            self.store.get_item(INITIAL_BALANCE_KEY),
            self.store.get_item(LOANS_KEY),
        );

        match reads {
            Ok((transactions_raw, initial_balance_raw, loans_raw)) => {
                let ledger = &state.ledger;
                let transactions = decode::<Vec<Transaction>>(TRANSACTIONS_KEY, transactions_raw)
                    .unwrap_or_else(|| ledger.transactions().to_vec());
                let initial_balance = decode::<Balance>(INITIAL_BALANCE_KEY, initial_balance_raw)
                    .unwrap_or_else(|| ledger.initial_balance());
                let loans = decode::<Vec<Loan>>(LOANS_KEY, loans_raw)
                    .unwrap_or_else(|| ledger.loans().to_vec());

                state.ledger.replace(transactions, initial_balance, loans);
            }
            Err(e) => {
                error!("Error loading data, using defaults: {:?}", e);
            }
        }

        state.phase = LoadPhase::Ready;
        info!(
            "Ledger ready with {} transactions and {} loans",
            state.ledger.transactions().len(),
            state.ledger.loans().len()
        );
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.phase == LoadPhase::Loading
    }

    /// False when the most recent write to the store failed
    pub async fn is_synced(&self) -> bool {
        self.state.lock().await.synced
    }

    /// Write all three collections to the store now.
    ///
    /// Mutations already do this; it is exposed for callers that want an
    /// explicit completion signal, e.g. to retry after a failed write. Does
    /// nothing while loading.
    pub async fn save(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.persist(&mut state).await
    }

    async fn persist(&self, state: &mut LedgerState) -> Result<()> {
        if state.phase == LoadPhase::Loading {
            debug!("Store still loading, change kept in memory only");
            return Ok(());
        }

        match self.write_collections(&state.ledger).await {
            Ok(()) => {
                state.synced = true;
                Ok(())
            }
            Err(e) => {
                error!("Error saving data: {:?}", e);
                state.synced = false;
                Err(e)
            }
        }
    }

    async fn write_collections(&self, ledger: &Ledger) -> Result<()> {
        let transactions = serde_json::to_string(ledger.transactions())?;
        let initial_balance = serde_json::to_string(&ledger.initial_balance())?;
        let loans = serde_json::to_string(ledger.loans())?;

        tokio::try_join!(
            self.store.set_item(TRANSACTIONS_KEY, &transactions),
            self.store.set_item(INITIAL_BALANCE_KEY, &initial_balance),
            self.store.set_item(LOANS_KEY, &loans),
        )?;

        debug!(
            "Persisted {} transactions and {} loans",
            ledger.transactions().len(),
            ledger.loans().len()
        );
        Ok(())
    }

    /// Apply a change and persist the result
    async fn mutate<T, F>(&self, apply: F) -> T
    where
        F: FnOnce(&mut Ledger) -> T + Send,
        T: Send,
    {
        let mut state = self.state.lock().await;
        let result = apply(&mut state.ledger);
        // Failure is logged and reflected in `is_synced`
        let _ = self.persist(&mut state).await;
        result
    }

    /// Apply a change that may be rejected; only accepted changes persist
    async fn try_mutate<T, F>(&self, apply: F) -> Result<T, ValidationError>
    where
        F: FnOnce(&mut Ledger) -> Result<T, ValidationError> + Send,
        T: Send,
    {
        let mut state = self.state.lock().await;
        let result = apply(&mut state.ledger)?;
        let _ = self.persist(&mut state).await;
        Ok(result)
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().await.ledger.transactions().to_vec()
    }

    pub async fn loans(&self) -> Vec<Loan> {
        self.state.lock().await.ledger.loans().to_vec()
    }

    pub async fn initial_balance(&self) -> Balance {
        self.state.lock().await.ledger.initial_balance()
    }

    pub async fn current_balance(&self) -> Balance {
        self.state.lock().await.ledger.current_balance()
    }

    pub async fn debt_status(&self) -> CompanyDebtStatus {
        self.state.lock().await.ledger.debt_status()
    }

    /// Remaining amounts across active loans
    pub async fn active_loans(&self) -> Balance {
        self.state.lock().await.ledger.active_loan_totals()
    }

    /// Everything the dashboard shows, computed from one consistent snapshot
    pub async fn summary(&self) -> LedgerSummary {
        let state = self.state.lock().await;
        let ledger = &state.ledger;
        let status = ledger.debt_status();

        LedgerSummary {
            initial_balance: ledger.initial_balance(),
            current_balance: ledger.current_balance(),
            company_owes_you: status.company_owes_you,
            you_owe_company: status.you_owe_company,
            is_settled: status.is_settled,
            active_loans: ledger.active_loan_totals(),
            transaction_count: ledger.transactions().len(),
            recent_transactions: ledger.recent_transactions(RECENT_TRANSACTION_COUNT),
            is_loading: state.phase == LoadPhase::Loading,
            is_synced: state.synced,
        }
    }

    pub async fn list_transactions(&self, request: &TransactionListRequest) -> TransactionListResponse {
        self.state.lock().await.ledger.list_transactions(request)
    }

    pub async fn loan_book(&self) -> LoanBookResponse {
        self.state.lock().await.ledger.loan_book()
    }

    /// Record a transaction as given. No validation.
    pub async fn add_transaction(&self, input: NewTransaction) -> Transaction {
        let now = now_millis();
        let transaction = self.mutate(|ledger| ledger.add_transaction(input, now)).await;
        info!(
            "Added {} transaction {} ({} USD, {} LBP)",
            transaction.transaction_type, transaction.id, transaction.amount_usd, transaction.amount_lbp
        );
        transaction
    }

    /// Remove a transaction; unknown ids are not an error
    pub async fn delete_transaction(&self, transaction_id: &str) -> bool {
        let removed = self.mutate(|ledger| ledger.delete_transaction(transaction_id)).await;
        if removed {
            info!("Deleted transaction {}", transaction_id);
        } else {
            debug!("No transaction {} to delete", transaction_id);
        }
        removed
    }

    pub async fn update_initial_balance(&self, balance: Balance) {
        self.mutate(|ledger| ledger.update_initial_balance(balance)).await;
        info!("Initial balance set to {} USD, {} LBP", balance.usd, balance.lbp);
    }

    /// Drop every transaction and restart from `balance`. There is no undo.
    pub async fn set_current_balance(&self, balance: Balance) {
        self.mutate(|ledger| ledger.set_current_balance(balance)).await;
        warn!(
            "Ledger rebased to {} USD, {} LBP; transaction history cleared",
            balance.usd, balance.lbp
        );
    }

    /// Open a loan as given. No validation and no wallet transaction.
    pub async fn add_loan(&self, input: NewLoan) -> Loan {
        let now = now_millis();
        let loan = self.mutate(|ledger| ledger.add_loan(input, now)).await;
        info!("Added loan {} from {}", loan.id, loan.lender_name);
        loan
    }

    /// Reduce a loan's remaining amounts, clamping at zero. Unknown ids are
    /// ignored and no overpayment check is made.
    pub async fn repay_loan(
        &self,
        loan_id: &str,
        amount_usd: Decimal,
        amount_lbp: Decimal,
    ) -> Option<Loan> {
        let today = today();
        let loan = self
            .mutate(|ledger| ledger.repay_loan(loan_id, amount_usd, amount_lbp, today))
            .await;

        match &loan {
            Some(loan) => info!(
                "Repaid loan {}: {} USD, {} LBP remaining ({:?})",
                loan.id, loan.remaining_usd, loan.remaining_lbp, loan.status
            ),
            None => debug!("No loan {} to repay", loan_id),
        }
        loan
    }

    /// Record a transaction after checking its description and amounts
    pub async fn record_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> Result<Transaction, ValidationError> {
        let description = validate_description(&request.description)?;
        validate_amounts(Balance::new(request.amount_usd, request.amount_lbp))?;

        let input = NewTransaction {
            transaction_type: request.transaction_type,
            amount_usd: request.amount_usd,
            amount_lbp: request.amount_lbp,
            description,
            date: request.date.unwrap_or_else(today),
        };
        Ok(self.add_transaction(input).await)
    }

    /// Borrow from an outside lender: opens the loan and records the cash
    /// coming into the wallet, in one write
    pub async fn borrow(&self, request: CreateLoanRequest) -> Result<LoanMovementResponse, ValidationError> {
        let lender_name = validate_lender_name(&request.lender_name)?;
        validate_amounts(Balance::new(request.amount_usd, request.amount_lbp))?;

        let now = now_millis();
        let date = request.date_borrowed.unwrap_or_else(today);
        let movement = self
            .mutate(|ledger| {
                let loan = ledger.add_loan(
                    NewLoan {
                        lender_name: lender_name.clone(),
                        amount_usd: request.amount_usd,
                        amount_lbp: request.amount_lbp,
                        date_borrowed: date,
                    },
                    now,
                );
                let transaction = ledger.add_transaction(
                    NewTransaction {
                        transaction_type: TransactionType::ExternalLoanReceived,
                        amount_usd: request.amount_usd,
                        amount_lbp: request.amount_lbp,
                        description: format!("Borrowed from {}", lender_name),
                        date,
                    },
                    now,
                );
                LoanMovementResponse { loan, transaction }
            })
            .await;

        info!("Borrowed from {} as loan {}", movement.loan.lender_name, movement.loan.id);
        Ok(movement)
    }

    /// Pay back part or all of a loan and record the cash leaving the wallet.
    /// Rejects unknown or repaid loans and payments above what is owed.
    pub async fn repay(
        &self,
        loan_id: &str,
        request: RepayLoanRequest,
    ) -> Result<LoanMovementResponse, ValidationError> {
        let payment = Balance::new(request.amount_usd, request.amount_lbp);
        let now = now_millis();
        let today = today();

        let movement = self
            .try_mutate(|ledger| {
                let loan = ledger
                    .find_loan(loan_id)
                    .ok_or_else(|| ValidationError::LoanNotFound(loan_id.to_string()))?;
                validate_repayment(loan, payment)?;
                let description = format!("Repaid to {}", loan.lender_name);

                let loan = ledger
                    .repay_loan(loan_id, payment.usd, payment.lbp, today)
                    .ok_or_else(|| ValidationError::LoanNotFound(loan_id.to_string()))?;
                let transaction = ledger.add_transaction(
                    NewTransaction {
                        transaction_type: TransactionType::ExternalLoanRepayment,
                        amount_usd: payment.usd,
                        amount_lbp: payment.lbp,
                        description,
                        date: today,
                    },
                    now,
                );
                Ok(LoanMovementResponse { loan, transaction })
            })
            .await?;

        info!(
            "Repayment on loan {}: {} USD, {} LBP remaining",
            movement.loan.id, movement.loan.remaining_usd, movement.loan.remaining_lbp
        );
        Ok(movement)
    }

    /// Remove the three collections from the store and reset memory to
    /// defaults. Backups are kept. On a store failure memory is left as is.
    pub async fn clear_all_data(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Err(e) = self
            .store
            .remove_items(&[TRANSACTIONS_KEY, INITIAL_BALANCE_KEY, LOANS_KEY])
            .await
        {
            error!("Error clearing data: {:?}", e);
            return Err(e);
        }

        state.ledger = Ledger::new(self.settings.default_initial_balance);
        state.synced = true;
        warn!("All ledger data cleared");
        Ok(())
    }

    /// Snapshot the ledger into the backup history, newest first, keeping
    /// at most `max_backups` entries
    pub async fn create_backup(&self) -> Result<Backup> {
        let state = self.state.lock().await;
        let now = Utc::now();

        let backup = Backup {
            transactions: Some(state.ledger.transactions().to_vec()),
            initial_balance: Some(state.ledger.initial_balance()),
            loans: Some(state.ledger.loans().to_vec()),
            timestamp: now.timestamp_millis(),
            date: Some(now),
        };

        match self.push_backup(backup.clone()).await {
            Ok(count) => {
                info!("Created backup at {} ({} stored)", now.to_rfc3339(), count);
                Ok(backup)
            }
            Err(e) => {
                error!("Error creating backup: {:?}", e);
                Err(e)
            }
        }
    }

    async fn push_backup(&self, backup: Backup) -> Result<usize> {
        let mut backups: Vec<Backup> = match self.store.get_item(BACKUPS_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).context("Stored backup list is unreadable")?,
            None => Vec::new(),
        };

        backups.insert(0, backup);
        backups.truncate(self.settings.max_backups);

        let encoded = serde_json::to_string(&backups)?;
        self.store.set_item(BACKUPS_KEY, &encoded).await?;
        Ok(backups.len())
    }

    /// Replace the ledger with a backup's contents. Missing parts fall back to
    /// an empty list or the default initial balance. Loans that break their
    /// invariants are repaired rather than rejected.
    pub async fn restore_backup(&self, backup: Backup) {
        let default_balance = self.settings.default_initial_balance;
        let timestamp = backup.timestamp;

        let stored_loans = backup.loans.unwrap_or_default();
        let loans: Vec<Loan> = stored_loans.iter().cloned().map(normalize_loan).collect();
        let repaired = stored_loans
            .iter()
            .zip(&loans)
            .filter(|(before, after)| before != after)
            .count();
        if repaired > 0 {
            warn!("Repaired {} inconsistent loans from backup {}", repaired, timestamp);
        }

        self.mutate(|ledger| {
            ledger.replace(
                backup.transactions.unwrap_or_default(),
                backup.initial_balance.unwrap_or(default_balance),
                loans,
            )
        })
        .await;

        info!("Restored backup taken at {}", timestamp);
    }

    /// The stored backup history, or nothing if it cannot be read
    pub async fn get_backups(&self) -> Vec<Backup> {
        match self.store.get_item(BACKUPS_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Error reading backups: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Error getting backups: {:?}", e);
                Vec::new()
            }
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw.filter(|raw| !raw.is_empty())?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring unreadable payload under {}: {}", key, e);
            None
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
