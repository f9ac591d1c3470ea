//! Balance derivation for the ledger.
//!
//! Nothing here is stored. Current balance, company debt status and active
//! loan totals are recomputed from the collections every time they are read,
//! so they can never drift from the transactions and loans they summarize.

use rust_decimal::Decimal;
use shared::{Balance, CompanyDebtStatus, Loan, Transaction};

/// Fold every transaction into the initial balance, applying each category's
/// fixed sign. Both currencies are summed independently and the result does
/// not depend on list order.
pub fn derive_current_balance(initial_balance: Balance, transactions: &[Transaction]) -> Balance {
    transactions
        .iter()
        .fold(initial_balance, |running, transaction| running + transaction.signed_amounts())
}

/// Compare the current balance against the initial one.
///
/// `debt = initial - current` per currency. A positive debt is owed to the
/// agent by the company, a negative one is owed by the agent. Settled means
/// zero debt in both currencies.
pub fn derive_debt_status(initial_balance: Balance, current_balance: Balance) -> CompanyDebtStatus {
    let debt = initial_balance - current_balance;

    CompanyDebtStatus {
        company_owes_you: debt.floor_at_zero(),
        you_owe_company: (-debt).floor_at_zero(),
        is_settled: debt.is_zero(),
    }
}

/// Sum the remaining amounts of loans that are still active
pub fn derive_active_loan_totals(loans: &[Loan]) -> Balance {
    loans
        .iter()
        .filter(|loan| loan.is_active())
        .fold(Balance::ZERO, |total, loan| total + loan.remaining())
}

/// Subtract a repayment from a remaining amount, never going below zero.
/// A negative payment counts as nothing paid, so the result never exceeds
/// `remaining`.
pub fn clamp_subtract(remaining: Decimal, payment: Decimal) -> Decimal {
    (remaining - payment.max(Decimal::ZERO)).max(Decimal::ZERO)
}
