use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::document::to_fields;
use crate::models::ledger::{Balance, LedgerSnapshot};
use crate::models::session::Session;
use crate::models::settings::Settings;
use crate::models::transaction::{
    OwnerRef, Transaction, TransactionDraft, TransactionRecord, OWNER_FIELD,
};
use crate::providers::traits::DocumentStore;
use super::deadline;

/// Date format accepted for `occurred_on`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Largest amount a single transaction may carry (one trillion).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Lifecycle of a ledger view.
///
/// `Unloaded → Loading → Ready → (Mutating → Ready)*`; `reset` returns
/// to `Unloaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    Unloaded,
    Loading,
    Ready,
    Mutating,
}

/// Owns one account's cached transaction set and keeps it consistent with
/// the store.
///
/// Every mutation is a write followed by a full reload: the snapshot is
/// only ever replaced by what the store returned, never patched locally.
/// Mutating methods take `&mut self`, so a single engine cannot have two
/// changes in flight. Wrap it in an async mutex to share it between tasks.
pub struct LedgerEngine {
    store: Arc<dyn DocumentStore>,
    collection: String,
    timeout: Duration,
    state: LedgerState,
    snapshot: Option<LedgerSnapshot>,
}

impl std::fmt::Debug for LedgerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEngine")
            .field("store", &self.store.name())
            .field("state", &self.state)
            .field("transactions", &self.snapshot.as_ref().map(LedgerSnapshot::len))
            .finish()
    }
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn DocumentStore>, settings: &Settings) -> Self {
        Self {
            store,
            collection: settings.transactions_collection.clone(),
            timeout: settings.request_timeout(),
            state: LedgerState::Unloaded,
            snapshot: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> LedgerState {
        self.state
    }

    /// The last successfully loaded ledger.
    #[must_use]
    pub fn snapshot(&self) -> Option<&LedgerSnapshot> {
        self.snapshot.as_ref()
    }

    #[must_use]
    pub fn balance(&self) -> Option<Balance> {
        self.snapshot.as_ref().map(|s| s.balance)
    }

    /// Drop the cached ledger (logout, navigating away).
    pub fn reset(&mut self) {
        self.state = LedgerState::Unloaded;
        self.snapshot = None;
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// Fetch every transaction of the session's account and recompute the
    /// balance from scratch.
    ///
    /// On failure the previous snapshot and state stay in place. A successful
    /// load also clears a `Mutating` state left behind by a cancelled mutation.
    pub async fn load(&mut self, session: &Session) -> Result<&LedgerSnapshot, CoreError> {
        if self
            .snapshot
            .as_ref()
            .is_some_and(|s| s.account_id != session.account_id)
        {
            self.reset();
        }

        let previous = self.state;
        self.state = LedgerState::Loading;
        match self.fetch(session).await {
            Ok(snapshot) => {
                tracing::debug!(
                    account_id = %session.account_id,
                    transactions = snapshot.len(),
                    balance = %snapshot.balance.net(),
                    "ledger loaded"
                );
                self.state = LedgerState::Ready;
                Ok(&*self.snapshot.insert(snapshot))
            }
            Err(e) => {
                tracing::warn!(account_id = %session.account_id, error = %e, "ledger load failed");
                self.state = previous;
                Err(e)
            }
        }
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Validate and store a new transaction, then reload.
    ///
    /// Validation runs before anything touches the store. Returns the id
    /// the store assigned.
    pub async fn add_transaction(
        &mut self,
        session: &Session,
        draft: &TransactionDraft,
    ) -> Result<String, CoreError> {
        let record = validate_draft(draft, &session.account_id)?;
        let fields = to_fields(&record)?;

        self.begin_mutation()?;
        let written = deadline::within(
            self.timeout,
            "transaction insert",
            self.store.insert(Some(session), &self.collection, fields),
        )
        .await;

        let id = match written {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(account_id = %session.account_id, error = %e, "transaction insert failed");
                self.settle();
                return Err(e);
            }
        };

        tracing::info!(
            account_id = %session.account_id,
            transaction_id = %id,
            kind = %record.kind,
            amount = %record.amount,
            "transaction added"
        );
        self.reload_after_mutation(session).await?;
        Ok(id)
    }

    /// Delete one of the account's transactions, then reload.
    ///
    /// The id must belong to the account's ledger. Without a loaded
    /// snapshot for the account the store is asked directly, so an entry
    /// that keeps the ledger from loading can still be removed. Deletion is
    /// immediate and final.
    pub async fn delete_transaction(
        &mut self,
        session: &Session,
        transaction_id: &str,
    ) -> Result<(), CoreError> {
        let cached = self
            .snapshot
            .as_ref()
            .filter(|s| s.account_id == session.account_id)
            .map(|s| s.contains(transaction_id));
        let owned = match cached {
            Some(owned) => owned,
            None => {
                if self.snapshot.is_some() {
                    self.reset();
                }
                self.fetch_transactions(session)
                    .await?
                    .iter()
                    .any(|t| t.id == transaction_id)
            }
        };
        if !owned {
            return Err(CoreError::TransactionNotFound(transaction_id.to_string()));
        }

        self.begin_mutation()?;
        let deleted = deadline::within(
            self.timeout,
            "transaction delete",
            self.store
                .delete(Some(session), &self.collection, transaction_id),
        )
        .await;

        if let Err(e) = deleted {
            tracing::warn!(account_id = %session.account_id, transaction_id, error = %e, "transaction delete failed");
            self.settle();
            return Err(e);
        }

        tracing::info!(account_id = %session.account_id, transaction_id, "transaction deleted");
        self.reload_after_mutation(session).await
    }

    // ── Internal ────────────────────────────────────────────────────

    async fn fetch(&self, session: &Session) -> Result<LedgerSnapshot, CoreError> {
        let transactions = self.fetch_transactions(session).await?;
        LedgerSnapshot::new(session.account_id.clone(), transactions)
    }

    async fn fetch_transactions(&self, session: &Session) -> Result<Vec<Transaction>, CoreError> {
        let owner = Value::String(session.account_id.clone());
        let docs = deadline::within(
            self.timeout,
            "ledger query",
            self.store
                .query(Some(session), &self.collection, OWNER_FIELD, &owner),
        )
        .await?;

        docs.iter()
            .map(|doc| {
                doc.decode::<TransactionRecord>()
                    .map(|record| Transaction::from_record(doc.id.clone(), record))
            })
            .collect()
    }

    /// A mutation left in `Mutating` by a dropped future has an unknown
    /// outcome; refuse further mutations until a load re-synchronizes.
    fn begin_mutation(&mut self) -> Result<(), CoreError> {
        if self.state == LedgerState::Mutating {
            return Err(CoreError::MutationInProgress);
        }
        self.state = LedgerState::Mutating;
        Ok(())
    }

    async fn reload_after_mutation(&mut self, session: &Session) -> Result<(), CoreError> {
        match self.fetch(session).await {
            Ok(snapshot) => {
                self.snapshot = Some(snapshot);
                self.state = LedgerState::Ready;
                Ok(())
            }
            Err(e) => {
                // The write went through; the view keeps showing the last
                // confirmed ledger until the user refreshes.
                tracing::warn!(account_id = %session.account_id, error = %e, "reload after mutation failed");
                self.settle();
                Err(e)
            }
        }
    }

    /// Fall back to whatever the existing snapshot supports.
    fn settle(&mut self) {
        self.state = if self.snapshot.is_some() {
            LedgerState::Ready
        } else {
            LedgerState::Unloaded
        };
    }
}

/// Check a draft and turn it into the record that will be stored.
///
/// Every empty field (whitespace counts as empty) is reported in a single
/// error. Otherwise the amount must be a decimal between zero and
/// [`MAX_AMOUNT`] and the date must be `YYYY-MM-DD`; both parse failures are
/// reported together. `-0` is stored as `0`.
pub fn validate_draft(
    draft: &TransactionDraft,
    owner_id: &str,
) -> Result<TransactionRecord, CoreError> {
    let amount = draft.amount.trim();
    let occurred_on = draft.occurred_on.trim();
    let memo = draft.memo.trim();

    let missing: Vec<&str> = [
        ("amount", amount),
        ("occurred_on", occurred_on),
        ("memo", memo),
    ]
    .iter()
    .filter(|(_, value)| value.is_empty())
    .map(|(field, _)| *field)
    .collect();
    if !missing.is_empty() {
        return Err(CoreError::missing_fields(&missing));
    }

    let mut fields = Vec::new();
    let mut problems = Vec::new();

    let parsed_amount = match Decimal::from_str(amount) {
        Ok(value) if value.is_sign_negative() && !value.is_zero() => {
            fields.push("amount".to_string());
            problems.push(format!("amount must not be negative, got {amount}"));
            None
        }
        Ok(value) if value > MAX_AMOUNT => {
            fields.push("amount".to_string());
            problems.push(format!("amount must not exceed {MAX_AMOUNT}, got {amount}"));
            None
        }
        Ok(value) if value.is_zero() => Some(Decimal::ZERO),
        Ok(value) => Some(value),
        Err(_) => {
            fields.push("amount".to_string());
            problems.push(format!("amount '{amount}' is not a number"));
            None
        }
    };

    let parsed_date = match NaiveDate::parse_from_str(occurred_on, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            fields.push("occurred_on".to_string());
            problems.push(format!("date '{occurred_on}' is not a valid YYYY-MM-DD date"));
            None
        }
    };

    match (parsed_amount, parsed_date) {
        (Some(amount), Some(occurred_on)) => Ok(TransactionRecord {
            kind: draft.kind,
            amount,
            occurred_on,
            memo: memo.to_string(),
            owner: OwnerRef {
                uid: owner_id.to_string(),
            },
        }),
        _ => Err(CoreError::ValidationError {
            fields,
            message: problems.join("; "),
        }),
    }
}
