//! Ledger domain: pure state and derivation in [`Ledger`], input rules in
//! [`validation`], and [`LedgerService`] binding the ledger to a store.

pub mod balance;
pub mod ledger;
pub mod ledger_service;
pub mod validation;

pub use ledger::Ledger;
pub use ledger_service::{LedgerService, LedgerSettings, LoadPhase, DEFAULT_MAX_BACKUPS, RECENT_TRANSACTION_COUNT};
pub use validation::ValidationError;
