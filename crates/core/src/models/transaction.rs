use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a ledger entry. The amount itself is never negative;
/// the sign lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money coming in (salary, refunds, ...)
    Income,
    /// Money going out
    Expense,
}

impl TransactionKind {
    /// The amount with this kind's sign applied.
    #[must_use]
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self {
            TransactionKind::Income => amount,
            TransactionKind::Expense => -amount,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Income => write!(f, "Income"),
            TransactionKind::Expense => write!(f, "Expense"),
        }
    }
}

/// Field path every transaction query filters on.
pub const OWNER_FIELD: &str = "owner.uid";

/// Reference to the owning account, stored as a nested map so the store
/// can filter on `owner.uid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub uid: String,
}

/// Document body of a transaction, exactly as it is written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub kind: TransactionKind,

    /// Always non-negative. Written as a decimal string; a plain JSON number
    /// written by another client is also accepted on read.
    pub amount: Decimal,

    /// Calendar date, `YYYY-MM-DD`
    pub occurred_on: NaiveDate,

    pub memo: String,

    pub owner: OwnerRef,
}

/// A single income/expense entry belonging to one account.
///
/// Transactions are created and deleted, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Store-assigned document id
    pub id: String,

    /// Account id of the owner
    pub owner_id: String,

    pub kind: TransactionKind,

    /// Amount (always non-negative)
    pub amount: Decimal,

    /// Date of the transaction (daily granularity)
    pub occurred_on: NaiveDate,

    /// Free-text description
    pub memo: String,
}

impl Transaction {
    /// Combine a stored record with the id the store assigned to it.
    pub fn from_record(id: impl Into<String>, record: TransactionRecord) -> Self {
        Self {
            id: id.into(),
            owner_id: record.owner.uid,
            kind: record.kind,
            amount: record.amount,
            occurred_on: record.occurred_on,
            memo: record.memo,
        }
    }

    /// Contribution of this transaction to the balance.
    #[must_use]
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }
}

/// Raw form input for a new transaction, before validation.
///
/// Fields are kept as the strings the user typed so that validation can
/// report every empty field at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub kind: TransactionKind,
    pub amount: String,
    pub occurred_on: String,
    pub memo: String,
}

impl TransactionDraft {
    pub fn new(
        kind: TransactionKind,
        amount: impl Into<String>,
        occurred_on: impl Into<String>,
        memo: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            amount: amount.into(),
            occurred_on: occurred_on.into(),
            memo: memo.into(),
        }
    }
}
