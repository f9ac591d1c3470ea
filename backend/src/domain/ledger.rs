//! In-memory ledger state and its primitive mutations.
//!
//! The [`Ledger`] owns the three collections and applies state transitions
//! synchronously. It performs no domain validation and knows nothing about
//! persistence; [`super::LedgerService`] layers both on top.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::{
    Balance, CompanyDebtStatus, Loan, LoanBookResponse, LoanStatus, NewLoan, NewTransaction,
    Transaction, TransactionListRequest, TransactionListResponse,
};

use super::balance::{
    clamp_subtract, derive_active_loan_totals, derive_current_balance, derive_debt_status,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    /// Most recent first
    transactions: Vec<Transaction>,
    /// Most recent first
    loans: Vec<Loan>,
    initial_balance: Balance,
}

impl Ledger {
    pub fn new(initial_balance: Balance) -> Self {
        Self {
            transactions: Vec::new(),
            loans: Vec::new(),
            initial_balance,
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn loans(&self) -> &[Loan] {
        &self.loans
    }

    pub fn initial_balance(&self) -> Balance {
        self.initial_balance
    }

    pub fn current_balance(&self) -> Balance {
        derive_current_balance(self.initial_balance, &self.transactions)
    }

    pub fn debt_status(&self) -> CompanyDebtStatus {
        derive_debt_status(self.initial_balance, self.current_balance())
    }

    pub fn active_loan_totals(&self) -> Balance {
        derive_active_loan_totals(&self.loans)
    }

    pub fn find_loan(&self, loan_id: &str) -> Option<&Loan> {
        self.loans.iter().find(|loan| loan.id == loan_id)
    }

    /// Record a transaction at the head of the list
    pub fn add_transaction(&mut self, input: NewTransaction, now_millis: i64) -> Transaction {
        let transaction = Transaction {
            id: Transaction::generate_id(now_millis),
            transaction_type: input.transaction_type,
            amount_usd: input.amount_usd,
            amount_lbp: input.amount_lbp,
            description: input.description,
            date: input.date,
            timestamp: now_millis,
        };

        self.transactions.insert(0, transaction.clone());
        transaction
    }

    /// Remove a transaction by id. Returns false when nothing matched.
    pub fn delete_transaction(&mut self, transaction_id: &str) -> bool {
        let before = self.transactions.len();
        self.transactions.retain(|t| t.id != transaction_id);
        self.transactions.len() != before
    }

    pub fn update_initial_balance(&mut self, balance: Balance) {
        self.initial_balance = balance;
    }

    /// Rebase the ledger: drop every transaction and start over from `balance`.
    /// Loans are untouched.
    pub fn set_current_balance(&mut self, balance: Balance) {
        self.transactions.clear();
        self.initial_balance = balance;
    }

    /// Open a loan at the head of the list with nothing repaid yet.
    /// Negative amounts count as zero; a loan of nothing is born repaid.
    pub fn add_loan(&mut self, input: NewLoan, now_millis: i64) -> Loan {
        let loan = normalize_loan(Loan {
            id: Loan::generate_id(now_millis),
            lender_name: input.lender_name,
            amount_usd: input.amount_usd,
            amount_lbp: input.amount_lbp,
            remaining_usd: input.amount_usd,
            remaining_lbp: input.amount_lbp,
            status: LoanStatus::Active,
            date_borrowed: input.date_borrowed,
            date_repaid: None,
            timestamp: now_millis,
        });

        self.loans.insert(0, loan.clone());
        loan
    }

    /// Apply a repayment to a loan, clamping each currency at zero.
    ///
    /// The loan flips to repaid once both remaining amounts are zero; the
    /// repaid date is stamped the first time that happens. Unknown ids are
    /// ignored and return `None`.
    pub fn repay_loan(
        &mut self,
        loan_id: &str,
        amount_usd: Decimal,
        amount_lbp: Decimal,
        today: NaiveDate,
    ) -> Option<Loan> {
        let loan = self.loans.iter_mut().find(|loan| loan.id == loan_id)?;

        loan.remaining_usd = clamp_subtract(loan.remaining_usd, amount_usd);
        loan.remaining_lbp = clamp_subtract(loan.remaining_lbp, amount_lbp);

        if loan.remaining().is_zero() {
            loan.status = LoanStatus::Repaid;
            loan.date_repaid = loan.date_repaid.or(Some(today));
        }

        Some(loan.clone())
    }

    /// Replace all three collections at once
    pub fn replace(&mut self, transactions: Vec<Transaction>, initial_balance: Balance, loans: Vec<Loan>) {
        self.transactions = transactions;
        self.initial_balance = initial_balance;
        self.loans = loans;
    }

    /// Transactions matching the request's category filter, most recent first
    pub fn list_transactions(&self, request: &TransactionListRequest) -> TransactionListResponse {
        let matching: Vec<&Transaction> = self
            .transactions
            .iter()
            .filter(|t| request.transaction_type.map_or(true, |kind| t.transaction_type == kind))
            .collect();
        let matching_count = matching.len();

        let transactions = matching
            .into_iter()
            .take(request.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        TransactionListResponse {
            transactions,
            matching_count,
            total_count: self.transactions.len(),
        }
    }

    /// The most recent `count` transactions
    pub fn recent_transactions(&self, count: usize) -> Vec<Transaction> {
        self.transactions.iter().take(count).cloned().collect()
    }

    /// Loans split by status, each part keeping list order
    pub fn loan_book(&self) -> LoanBookResponse {
        let (active, repaid): (Vec<Loan>, Vec<Loan>) =
            self.loans.iter().cloned().partition(|loan| loan.is_active());

        LoanBookResponse {
            active,
            repaid,
            active_totals: self.active_loan_totals(),
        }
    }
}

/// Bring a loan within its invariants: amounts non-negative, remaining
/// amounts within `0..=amount`, and status repaid exactly when nothing is
/// owed. A repaid loan without a repaid date takes its borrow date.
pub fn normalize_loan(mut loan: Loan) -> Loan {
    loan.amount_usd = loan.amount_usd.max(Decimal::ZERO);
    loan.amount_lbp = loan.amount_lbp.max(Decimal::ZERO);
    loan.remaining_usd = loan.remaining_usd.max(Decimal::ZERO).min(loan.amount_usd);
    loan.remaining_lbp = loan.remaining_lbp.max(Decimal::ZERO).min(loan.amount_lbp);

    if loan.remaining().is_zero() {
        loan.status = LoanStatus::Repaid;
        loan.date_repaid = loan.date_repaid.or(Some(loan.date_borrowed));
    } else {
        loan.status = LoanStatus::Active;
        loan.date_repaid = None;
    }
    loan
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared::TransactionType;

    const NOW: i64 = 1_736_500_000_000;

    fn d(amount: i64) -> Decimal {
        Decimal::from(amount)
    }

    fn day(month: u32, dom: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, dom).unwrap()
    }

    fn new_transaction(transaction_type: TransactionType, usd: i64, lbp: i64) -> NewTransaction {
        NewTransaction {
            transaction_type,
            amount_usd: d(usd),
            amount_lbp: d(lbp),
            description: "test".to_string(),
            date: day(1, 10),
        }
    }

    fn new_loan(lender: &str, usd: i64, lbp: i64) -> NewLoan {
        NewLoan {
            lender_name: lender.to_string(),
            amount_usd: d(usd),
            amount_lbp: d(lbp),
            date_borrowed: day(1, 5),
        }
    }

    #[test]
    fn test_add_transaction_assigns_id_and_prepends() {
        let mut ledger = Ledger::new(Balance::seed());

        let first = ledger.add_transaction(new_transaction(TransactionType::Commission, 10, 0), NOW);
        let second = ledger.add_transaction(new_transaction(TransactionType::PayCustomer, 5, 0), NOW + 1);

        assert_eq!(Transaction::parse_id(&first.id).unwrap(), NOW);
        assert_eq!(first.timestamp, NOW);
        assert_ne!(first.id, second.id);
        assert_eq!(ledger.transactions()[0].id, second.id);
        assert_eq!(ledger.transactions()[1].id, first.id);
    }

    #[test]
    fn test_scenario_receive_from_customer() {
        let mut ledger = Ledger::new(Balance::new(d(2000), d(4_450_000)));
        ledger.add_transaction(new_transaction(TransactionType::ReceiveCustomer, 500, 0), NOW);

        assert_eq!(ledger.current_balance(), Balance::new(d(2500), d(4_450_000)));
        let status = ledger.debt_status();
        assert!(!status.is_settled);
        assert_eq!(status.you_owe_company, Balance::new(d(500), Decimal::ZERO));
        assert_eq!(status.company_owes_you, Balance::ZERO);
    }

    #[test]
    fn test_delete_transaction() {
        let mut ledger = Ledger::new(Balance::seed());
        let t = ledger.add_transaction(new_transaction(TransactionType::PayCustomer, 100, 0), NOW);
        assert!(!ledger.debt_status().is_settled);

        assert!(!ledger.delete_transaction("transaction::0::missing"));
        assert_eq!(ledger.transactions().len(), 1);

        assert!(ledger.delete_transaction(&t.id));
        assert!(ledger.transactions().is_empty());
        assert!(ledger.debt_status().is_settled);
    }

    #[test]
    fn test_set_current_balance_rebases_history() {
        let mut ledger = Ledger::new(Balance::seed());
        ledger.add_transaction(new_transaction(TransactionType::Commission, 100, 0), NOW);
        ledger.add_loan(new_loan("Sam", 300, 0), NOW);

        let rebased = Balance::new(d(750), d(1_000_000));
        ledger.set_current_balance(rebased);

        assert!(ledger.transactions().is_empty());
        assert_eq!(ledger.initial_balance(), rebased);
        assert_eq!(ledger.current_balance(), rebased);
        assert_eq!(ledger.loans().len(), 1);
    }

    #[test]
    fn test_update_initial_balance_keeps_transactions() {
        let mut ledger = Ledger::new(Balance::seed());
        ledger.add_transaction(new_transaction(TransactionType::Commission, 100, 0), NOW);

        ledger.update_initial_balance(Balance::new(d(0), d(0)));
        assert_eq!(ledger.transactions().len(), 1);
        assert_eq!(ledger.current_balance(), Balance::new(d(100), d(0)));
    }

    #[test]
    fn test_scenario_loan_repaid_in_full() {
        let mut ledger = Ledger::new(Balance::seed());
        let loan = ledger.add_loan(new_loan("Sam", 300, 0), NOW);

        assert_eq!(loan.remaining(), Balance::new(d(300), d(0)));
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(ledger.active_loan_totals().usd, d(300));

        let repaid = ledger.repay_loan(&loan.id, d(300), d(0), day(2, 1)).unwrap();
        assert_eq!(repaid.status, LoanStatus::Repaid);
        assert_eq!(repaid.date_repaid, Some(day(2, 1)));
        assert_eq!(ledger.active_loan_totals().usd, d(0));
    }

    #[test]
    fn test_partial_repayment_stays_active() {
        let mut ledger = Ledger::new(Balance::seed());
        let loan = ledger.add_loan(new_loan("Rami", 300, 1_000_000), NOW);

        let after = ledger.repay_loan(&loan.id, d(300), d(400_000), day(2, 1)).unwrap();
        assert_eq!(after.remaining(), Balance::new(d(0), d(600_000)));
        assert_eq!(after.status, LoanStatus::Active);
        assert!(after.date_repaid.is_none());
        assert_eq!(ledger.active_loan_totals(), Balance::new(d(0), d(600_000)));
    }

    #[test]
    fn test_overpayment_clamps_to_zero() {
        let mut ledger = Ledger::new(Balance::seed());
        let loan = ledger.add_loan(new_loan("Sam", 300, 0), NOW);

        let after = ledger.repay_loan(&loan.id, d(1000), d(5), day(2, 1)).unwrap();
        assert_eq!(after.remaining_usd, d(0));
        assert_eq!(after.remaining_lbp, d(0));
        assert_eq!(after.status, LoanStatus::Repaid);
    }

    #[test]
    fn test_repaid_date_never_changes() {
        let mut ledger = Ledger::new(Balance::seed());
        let loan = ledger.add_loan(new_loan("Sam", 300, 0), NOW);

        ledger.repay_loan(&loan.id, d(300), d(0), day(2, 1));
        let again = ledger.repay_loan(&loan.id, d(10), d(0), day(3, 1)).unwrap();
        assert_eq!(again.date_repaid, Some(day(2, 1)));
        assert_eq!(again.status, LoanStatus::Repaid);
    }

    #[test]
    fn test_repay_unknown_loan_is_noop() {
        let mut ledger = Ledger::new(Balance::seed());
        ledger.add_loan(new_loan("Sam", 300, 0), NOW);
        let before = ledger.clone();

        assert!(ledger.repay_loan("loan::0::nothing", d(10), d(0), day(2, 1)).is_none());
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_remaining_never_exceeds_original() {
        let mut ledger = Ledger::new(Balance::seed());
        let loan = ledger.add_loan(new_loan("Sam", 300, 2_000), NOW);

        for payment in [50, 75, 400] {
            let after = ledger.repay_loan(&loan.id, d(payment), d(payment), day(2, 1)).unwrap();
            assert!(after.remaining_usd <= after.amount_usd);
            assert!(after.remaining_lbp <= after.amount_lbp);
            assert!(after.remaining_usd >= Decimal::ZERO);
            assert_eq!(after.status == LoanStatus::Repaid, after.remaining().is_zero());
        }
    }

    #[test]
    fn test_list_transactions_filters_and_limits() {
        let mut ledger = Ledger::new(Balance::seed());
        for i in 0..4 {
            ledger.add_transaction(new_transaction(TransactionType::Commission, 10, 0), NOW + i);
        }
        ledger.add_transaction(new_transaction(TransactionType::PayCustomer, 5, 0), NOW + 10);

        let all = ledger.list_transactions(&TransactionListRequest::default());
        assert_eq!(all.transactions.len(), 5);
        assert_eq!(all.total_count, 5);

        let commissions = ledger.list_transactions(&TransactionListRequest {
            transaction_type: Some(TransactionType::Commission),
            limit: Some(2),
        });
        assert_eq!(commissions.transactions.len(), 2);
        assert_eq!(commissions.matching_count, 4);
        assert_eq!(commissions.total_count, 5);
        assert_eq!(commissions.transactions[0].timestamp, NOW + 3);

        assert_eq!(ledger.recent_transactions(3).len(), 3);
        assert_eq!(ledger.recent_transactions(3)[0].timestamp, NOW + 10);
    }

    #[test]
    fn test_loan_book_partitions_by_status() {
        let mut ledger = Ledger::new(Balance::seed());
        let paid = ledger.add_loan(new_loan("Sam", 300, 0), NOW);
        ledger.add_loan(new_loan("Rami", 100, 0), NOW + 1);
        ledger.repay_loan(&paid.id, d(300), d(0), day(2, 1));

        let book = ledger.loan_book();
        assert_eq!(book.active.len(), 1);
        assert_eq!(book.active[0].lender_name, "Rami");
        assert_eq!(book.repaid.len(), 1);
        assert_eq!(book.active_totals, Balance::new(d(100), d(0)));
    }

    #[test]
    fn test_negative_repayment_never_raises_remaining() {
        let mut ledger = Ledger::new(Balance::seed());
        let loan = ledger.add_loan(new_loan("Sam", 300, 0), NOW);

        let after = ledger.repay_loan(&loan.id, d(-100), d(0), day(2, 1)).unwrap();
        assert!(after.remaining_usd <= after.amount_usd);
        assert_eq!(after.remaining_usd, d(300));
        assert_eq!(after.status, LoanStatus::Active);
        assert_eq!(ledger.active_loan_totals().usd, d(300));
    }

    #[test]
    fn test_zero_loan_is_created_repaid() {
        let mut ledger = Ledger::new(Balance::seed());
        let loan = ledger.add_loan(new_loan("Sam", 0, 0), NOW);

        assert_eq!(loan.status, LoanStatus::Repaid);
        assert_eq!(loan.date_repaid, Some(day(1, 5)));
        assert!(ledger.active_loan_totals().is_zero());
        assert_eq!(ledger.loan_book().repaid.len(), 1);
    }

    #[test]
    fn test_negative_loan_amounts_count_as_zero() {
        let mut ledger = Ledger::new(Balance::seed());
        let loan = ledger.add_loan(new_loan("Sam", -50, 2_000), NOW);

        assert_eq!(loan.amount_usd, d(0));
        assert_eq!(loan.remaining_usd, d(0));
        assert_eq!(loan.remaining_lbp, d(2_000));
        assert_eq!(loan.status, LoanStatus::Active);
    }

    #[test]
    fn test_normalize_loan_repairs_inconsistent_records() {
        let mut ledger = Ledger::new(Balance::seed());
        let base = ledger.add_loan(new_loan("Sam", 300, 1_000), NOW);

        let overdrawn = normalize_loan(Loan {
            remaining_usd: d(400),
            remaining_lbp: d(-5),
            ..base.clone()
        });
        assert_eq!(overdrawn.remaining(), Balance::new(d(300), d(0)));
        assert_eq!(overdrawn.status, LoanStatus::Active);

        let falsely_repaid = normalize_loan(Loan {
            status: LoanStatus::Repaid,
            date_repaid: Some(day(3, 1)),
            ..base.clone()
        });
        assert_eq!(falsely_repaid.status, LoanStatus::Active);
        assert!(falsely_repaid.date_repaid.is_none());

        let falsely_active = normalize_loan(Loan {
            remaining_usd: d(0),
            remaining_lbp: d(0),
            ..base.clone()
        });
        assert_eq!(falsely_active.status, LoanStatus::Repaid);
        assert_eq!(falsely_active.date_repaid, Some(base.date_borrowed));

        assert_eq!(normalize_loan(base.clone()), base);
    }

    fn arb_transaction_type() -> impl Strategy<Value = TransactionType> {
        (0usize..8).prop_map(|i| TransactionType::ALL[i])
    }

    fn arb_ledger() -> impl Strategy<Value = Ledger> {
        let transactions = prop::collection::vec(
            (arb_transaction_type(), 0i64..100_000, 0i64..100_000_000),
            0..20,
        );
        let loans = prop::collection::vec(
            (0i64..10_000, 0i64..10_000_000, 0i64..12_000, 0i64..12_000_000),
            0..8,
        );
        (0i64..10_000, 0i64..10_000_000, transactions, loans).prop_map(
            |(initial_usd, initial_lbp, transactions, loans)| {
                let mut ledger = Ledger::new(Balance::new(d(initial_usd), d(initial_lbp)));
                for (i, (kind, usd, lbp)) in transactions.into_iter().enumerate() {
                    ledger.add_transaction(new_transaction(kind, usd, lbp), NOW + i as i64);
                }
                for (i, (usd, lbp, pay_usd, pay_lbp)) in loans.into_iter().enumerate() {
                    let loan = ledger.add_loan(new_loan("Lender", usd, lbp), NOW + i as i64);
                    ledger.repay_loan(&loan.id, d(pay_usd), d(pay_lbp), day(2, 1));
                }
                ledger
            },
        )
    }

    proptest! {
        #[test]
        fn prop_serialized_ledger_keeps_derived_values(ledger in arb_ledger()) {
            let transactions = serde_json::to_string(ledger.transactions()).unwrap();
            let initial_balance = serde_json::to_string(&ledger.initial_balance()).unwrap();
            let loans = serde_json::to_string(ledger.loans()).unwrap();

            let mut restored = Ledger::new(Balance::ZERO);
            restored.replace(
                serde_json::from_str(&transactions).unwrap(),
                serde_json::from_str(&initial_balance).unwrap(),
                serde_json::from_str(&loans).unwrap(),
            );

            prop_assert_eq!(restored.current_balance(), ledger.current_balance());
            prop_assert_eq!(restored.debt_status(), ledger.debt_status());
            prop_assert_eq!(restored.active_loan_totals(), ledger.active_loan_totals());
            prop_assert_eq!(restored.loan_book().repaid.len(), ledger.loan_book().repaid.len());
        }

        #[test]
        fn prop_loans_stay_within_invariants(ledger in arb_ledger()) {
            for loan in ledger.loans() {
                prop_assert!(loan.remaining_usd <= loan.amount_usd);
                prop_assert!(loan.remaining_lbp <= loan.amount_lbp);
                prop_assert!(loan.remaining_usd >= Decimal::ZERO);
                prop_assert!(loan.remaining_lbp >= Decimal::ZERO);
                prop_assert_eq!(loan.status == LoanStatus::Repaid, loan.remaining().is_zero());
            }
        }
    }
}
