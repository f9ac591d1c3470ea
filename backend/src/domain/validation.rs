//! Input rules for the validated ledger operations.
//!
//! The primitive [`super::Ledger`] mutations accept anything. These checks
//! guard the entry points used by the HTTP layer: descriptions and lender
//! names must be present, amounts non-negative with at least one currency
//! non-zero, and a repayment may not exceed what is still owed.

use rust_decimal::Decimal;
use shared::{Balance, Loan};

/// Maximum length of a transaction description or lender name, in characters
pub const MAX_TEXT_LENGTH: usize = 256;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a description")]
    EmptyDescription,
    #[error("Please enter lender name")]
    EmptyLenderName,
    #[error("Text is too long ({0} characters). Maximum is 256.")]
    TextTooLong(usize),
    #[error("Please enter at least one amount")]
    NoAmount,
    #[error("Amounts cannot be negative")]
    NegativeAmount,
    #[error("Loan not found: {0}")]
    LoanNotFound(String),
    #[error("Loan {0} is already repaid")]
    LoanAlreadyRepaid(String),
    #[error("Repayment amount exceeds remaining loan balance (remaining {remaining_usd} USD, {remaining_lbp} LBP)")]
    RepaymentExceedsRemaining {
        remaining_usd: Decimal,
        remaining_lbp: Decimal,
    },
}

/// Trim a description and reject it when empty or too long
pub fn validate_description(description: &str) -> Result<String, ValidationError> {
    validate_text(description, ValidationError::EmptyDescription)
}

/// Trim a lender name and reject it when empty or too long
pub fn validate_lender_name(lender_name: &str) -> Result<String, ValidationError> {
    validate_text(lender_name, ValidationError::EmptyLenderName)
}

fn validate_text(text: &str, when_empty: ValidationError) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(when_empty);
    }

    let length = trimmed.chars().count();
    if length > MAX_TEXT_LENGTH {
        return Err(ValidationError::TextTooLong(length));
    }

    Ok(trimmed.to_string())
}

/// Both amounts non-negative and at least one of them non-zero
pub fn validate_amounts(amounts: Balance) -> Result<(), ValidationError> {
    if amounts.is_negative_in_any() {
        return Err(ValidationError::NegativeAmount);
    }
    if amounts.is_zero() {
        return Err(ValidationError::NoAmount);
    }
    Ok(())
}

/// Check a repayment against the loan it targets
pub fn validate_repayment(loan: &Loan, payment: Balance) -> Result<(), ValidationError> {
    validate_amounts(payment)?;

    if !loan.is_active() {
        return Err(ValidationError::LoanAlreadyRepaid(loan.id.clone()));
    }

    if payment.usd > loan.remaining_usd || payment.lbp > loan.remaining_lbp {
        return Err(ValidationError::RepaymentExceedsRemaining {
            remaining_usd: loan.remaining_usd,
            remaining_lbp: loan.remaining_lbp,
        });
    }

    Ok(())
}
