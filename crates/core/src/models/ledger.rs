use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::errors::CoreError;
use super::transaction::{Transaction, TransactionKind};

/// Derived totals for one account. Never stored; always recomputed from
/// the full transaction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Balance {
    pub income: Decimal,
    pub expense: Decimal,
}

impl Balance {
    /// Sum a transaction set from scratch. Order does not matter.
    ///
    /// Fails with `BalanceOverflow` when a total or the net amount leaves
    /// the `Decimal` range.
    pub fn from_transactions<'a, I>(transactions: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut balance = Balance::default();
        for t in transactions {
            let total = match t.kind {
                TransactionKind::Income => &mut balance.income,
                TransactionKind::Expense => &mut balance.expense,
            };
            *total = total
                .checked_add(t.amount)
                .ok_or(CoreError::BalanceOverflow)?;
        }
        balance
            .income
            .checked_sub(balance.expense)
            .ok_or(CoreError::BalanceOverflow)?;
        Ok(balance)
    }

    /// Income minus expense. Never overflows for a balance built by
    /// [`from_transactions`](Self::from_transactions).
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.income - self.expense
    }
}

/// Fixed two-decimal rendering used for every amount shown to the user.
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    format!(
        "{:.2}",
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

/// The engine's cached copy of one account's ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerSnapshot {
    pub account_id: String,

    /// Newest first; ties broken by id so repeated loads compare equal.
    pub transactions: Vec<Transaction>,

    pub balance: Balance,
}

impl LedgerSnapshot {
    /// Build a snapshot from whatever order the store returned.
    pub fn new(
        account_id: impl Into<String>,
        mut transactions: Vec<Transaction>,
    ) -> Result<Self, CoreError> {
        transactions.sort_by(|a, b| {
            b.occurred_on
                .cmp(&a.occurred_on)
                .then_with(|| a.id.cmp(&b.id))
        });
        let balance = Balance::from_transactions(&transactions)?;
        Ok(Self {
            account_id: account_id.into(),
            transactions,
            balance,
        })
    }

    #[must_use]
    pub fn get(&self, transaction_id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.id == transaction_id)
    }

    #[must_use]
    pub fn contains(&self, transaction_id: &str) -> bool {
        self.get(transaction_id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
