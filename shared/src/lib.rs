use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// A pair of amounts, one per currency the agent handles.
///
/// Used for the initial balance, the derived current balance, debt figures
/// and loan totals alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub usd: Decimal,
    pub lbp: Decimal,
}

impl Balance {
    pub const ZERO: Balance = Balance {
        usd: Decimal::ZERO,
        lbp: Decimal::ZERO,
    };

    pub fn new(usd: Decimal, lbp: Decimal) -> Self {
        Self { usd, lbp }
    }

    /// The balance a fresh ledger starts from.
    pub fn seed() -> Self {
        Self::new(Decimal::from(2000), Decimal::from(4_450_000))
    }

    pub fn is_zero(&self) -> bool {
        self.usd.is_zero() && self.lbp.is_zero()
    }

    pub fn is_negative_in_any(&self) -> bool {
        self.usd < Decimal::ZERO || self.lbp < Decimal::ZERO
    }

    /// Clamp each currency at zero independently.
    pub fn floor_at_zero(self) -> Self {
        Self {
            usd: self.usd.max(Decimal::ZERO),
            lbp: self.lbp.max(Decimal::ZERO),
        }
    }
}

impl Add for Balance {
    type Output = Balance;

    fn add(self, rhs: Balance) -> Balance {
        Balance::new(self.usd + rhs.usd, self.lbp + rhs.lbp)
    }
}

impl Sub for Balance {
    type Output = Balance;

    fn sub(self, rhs: Balance) -> Balance {
        Balance::new(self.usd - rhs.usd, self.lbp - rhs.lbp)
    }
}

impl Neg for Balance {
    type Output = Balance;

    fn neg(self) -> Balance {
        Balance::new(-self.usd, -self.lbp)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Balance) {
        *self = *self + rhs;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Balance) {
        *self = *self - rhs;
    }
}

/// Whether a transaction category adds to or subtracts from the wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    Credit,
    Debit,
}

/// The eight fixed transaction categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Cash received from a customer
    ReceiveCustomer,
    /// Cash paid out to a customer
    PayCustomer,
    /// Monthly commission
    Commission,
    PersonalWithdrawal,
    CapitalDeposit,
    /// Promotional receipt from the company
    PromoReceipt,
    /// Money borrowed from an outside lender
    ExternalLoanReceived,
    /// Money paid back to an outside lender
    ExternalLoanRepayment,
}

impl TransactionType {
    pub const ALL: [TransactionType; 8] = [
        TransactionType::ReceiveCustomer,
        TransactionType::PayCustomer,
        TransactionType::Commission,
        TransactionType::PersonalWithdrawal,
        TransactionType::CapitalDeposit,
        TransactionType::PromoReceipt,
        TransactionType::ExternalLoanReceived,
        TransactionType::ExternalLoanRepayment,
    ];

    pub fn effect(self) -> BalanceEffect {
        match self {
            TransactionType::ReceiveCustomer
            | TransactionType::Commission
            | TransactionType::PromoReceipt
            | TransactionType::ExternalLoanReceived => BalanceEffect::Credit,
            TransactionType::PayCustomer
            | TransactionType::PersonalWithdrawal
            | TransactionType::CapitalDeposit
            | TransactionType::ExternalLoanRepayment => BalanceEffect::Debit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::ReceiveCustomer => "receive_customer",
            TransactionType::PayCustomer => "pay_customer",
            TransactionType::Commission => "commission",
            TransactionType::PersonalWithdrawal => "personal_withdrawal",
            TransactionType::CapitalDeposit => "capital_deposit",
            TransactionType::PromoReceipt => "promo_receipt",
            TransactionType::ExternalLoanReceived => "external_loan_received",
            TransactionType::ExternalLoanRepayment => "external_loan_repayment",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction ID in format: "transaction::<epoch_millis>::<suffix>"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Always stored non-negative; the category decides the sign
    #[serde(rename = "amountUSD")]
    pub amount_usd: Decimal,
    #[serde(rename = "amountLBP")]
    pub amount_lbp: Decimal,
    pub description: String,
    /// Calendar day the money moved
    pub date: NaiveDate,
    /// Creation time in epoch milliseconds
    pub timestamp: i64,
}

/// Everything a caller supplies for a new transaction; the ledger assigns
/// the id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub transaction_type: TransactionType,
    pub amount_usd: Decimal,
    pub amount_lbp: Decimal,
    pub description: String,
    pub date: NaiveDate,
}

impl Transaction {
    pub fn generate_id(epoch_millis: i64) -> String {
        format!("transaction::{}::{}", epoch_millis, random_suffix())
    }

    /// Extract the creation millis from a transaction ID
    pub fn parse_id(id: &str) -> Result<i64, IdError> {
        parse_prefixed_id("transaction", id)
    }

    pub fn amounts(&self) -> Balance {
        Balance::new(self.amount_usd, self.amount_lbp)
    }

    /// Amounts with the category sign applied
    pub fn signed_amounts(&self) -> Balance {
        match self.transaction_type.effect() {
            BalanceEffect::Credit => self.amounts(),
            BalanceEffect::Debit => -self.amounts(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Repaid,
}

/// Loan ID in format: "loan::<epoch_millis>::<suffix>"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: String,
    pub lender_name: String,
    #[serde(rename = "amountUSD")]
    pub amount_usd: Decimal,
    #[serde(rename = "amountLBP")]
    pub amount_lbp: Decimal,
    #[serde(rename = "remainingUSD")]
    pub remaining_usd: Decimal,
    #[serde(rename = "remainingLBP")]
    pub remaining_lbp: Decimal,
    pub status: LoanStatus,
    pub date_borrowed: NaiveDate,
    /// Stamped once, when both remaining amounts first reach zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_repaid: Option<NaiveDate>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLoan {
    pub lender_name: String,
    pub amount_usd: Decimal,
    pub amount_lbp: Decimal,
    pub date_borrowed: NaiveDate,
}

impl Loan {
    pub fn generate_id(epoch_millis: i64) -> String {
        format!("loan::{}::{}", epoch_millis, random_suffix())
    }

    pub fn parse_id(id: &str) -> Result<i64, IdError> {
        parse_prefixed_id("loan", id)
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    pub fn remaining(&self) -> Balance {
        Balance::new(self.remaining_usd, self.remaining_lbp)
    }
}

/// Who owes whom, per currency, relative to the initial balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDebtStatus {
    pub company_owes_you: Balance,
    pub you_owe_company: Balance,
    pub is_settled: bool,
}

/// A point-in-time copy of the ledger.
///
/// Every field is optional on the way in so that partial or hand-edited
/// backups still restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    #[serde(default)]
    pub transactions: Option<Vec<Transaction>>,
    #[serde(default)]
    pub initial_balance: Option<Balance>,
    #[serde(default)]
    pub loans: Option<Vec<Loan>>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(rename = "amountUSD", default)]
    pub amount_usd: Decimal,
    #[serde(rename = "amountLBP", default)]
    pub amount_lbp: Decimal,
    pub description: String,
    /// Defaults to today when omitted
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionListRequest {
    /// Only return transactions of this category
    #[serde(rename = "type", default)]
    pub transaction_type: Option<TransactionType>,
    /// Maximum number of transactions to return, most recent first
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListResponse {
    pub transactions: Vec<Transaction>,
    /// Number of transactions matching the filter, before the limit
    pub matching_count: usize,
    /// Number of transactions in the ledger
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoanRequest {
    pub lender_name: String,
    #[serde(rename = "amountUSD", default)]
    pub amount_usd: Decimal,
    #[serde(rename = "amountLBP", default)]
    pub amount_lbp: Decimal,
    #[serde(default)]
    pub date_borrowed: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepayLoanRequest {
    #[serde(rename = "amountUSD", default)]
    pub amount_usd: Decimal,
    #[serde(rename = "amountLBP", default)]
    pub amount_lbp: Decimal,
}

/// A loan together with the wallet transaction recorded alongside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanMovementResponse {
    pub loan: Loan,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanBookResponse {
    pub active: Vec<Loan>,
    pub repaid: Vec<Loan>,
    /// Remaining amounts across active loans
    pub active_totals: Balance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub initial_balance: Balance,
    pub current_balance: Balance,
    pub company_owes_you: Balance,
    pub you_owe_company: Balance,
    pub is_settled: bool,
    pub active_loans: Balance,
    pub transaction_count: usize,
    pub recent_transactions: Vec<Transaction>,
    pub is_loading: bool,
    /// False when the last write to the store failed
    pub is_synced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupListResponse {
    pub backups: Vec<Backup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    InvalidFormat,
    InvalidTimestamp,
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IdError::InvalidFormat => write!(f, "Invalid ID format"),
            IdError::InvalidTimestamp => write!(f, "Invalid timestamp in ID"),
        }
    }
}

impl std::error::Error for IdError {}

fn random_suffix() -> String {
    let mut suffix = uuid::Uuid::new_v4().simple().to_string();
    suffix.truncate(8);
    suffix
}

fn parse_prefixed_id(prefix: &str, id: &str) -> Result<i64, IdError> {
    let parts: Vec<&str> = id.split("::").collect();
    if parts.len() != 3 || parts[0] != prefix || parts[2].is_empty() {
        return Err(IdError::InvalidFormat);
    }

    parts[1]
        .parse::<i64>()
        .map_err(|_| IdError::InvalidTimestamp)
}
