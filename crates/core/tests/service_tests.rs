// ═══════════════════════════════════════════════════════════════════
// Service Tests: AccountDirectory, LedgerEngine, SessionGate
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pocket_ledger_core::errors::CoreError;
use pocket_ledger_core::models::document::{Document, Fields};
use pocket_ledger_core::models::ledger::format_amount;
use pocket_ledger_core::models::session::Session;
use pocket_ledger_core::models::settings::Settings;
use pocket_ledger_core::models::transaction::{TransactionDraft, TransactionKind};
use pocket_ledger_core::providers::memory::{MemoryDocumentStore, MemoryIdentityGateway};
use pocket_ledger_core::providers::traits::{DocumentStore, IdentityGateway};
use pocket_ledger_core::services::directory_service::AccountDirectory;
use pocket_ledger_core::services::ledger_service::{
    validate_draft, LedgerEngine, LedgerState, MAX_AMOUNT,
};
use pocket_ledger_core::services::session_gate::{RouteDecision, SessionGate, View};

// ═══════════════════════════════════════════════════════════════════
// Mock Store
// ═══════════════════════════════════════════════════════════════════

/// Wraps the in-memory store and lets a test script failures and hangs.
struct ScriptedStore {
    inner: MemoryDocumentStore,
    /// Number of upcoming queries that fail with `StoreUnavailable`
    failing_queries: AtomicUsize,
    hang_queries: AtomicBool,
    hang_inserts: AtomicBool,
}

impl ScriptedStore {
    fn new(settings: &Settings) -> Self {
        Self {
            inner: MemoryDocumentStore::with_rules(settings),
            failing_queries: AtomicUsize::new(0),
            hang_queries: AtomicBool::new(false),
            hang_inserts: AtomicBool::new(false),
        }
    }

    fn fail_next_queries(&self, n: usize) {
        self.failing_queries.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    fn name(&self) -> &str {
        "ScriptedStore"
    }

    async fn query(
        &self,
        session: Option<&Session>,
        collection: &str,
        field_path: &str,
        equals: &Value,
    ) -> Result<Vec<Document>, CoreError> {
        if self.hang_queries.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let pending = self.failing_queries.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_queries.store(pending - 1, Ordering::SeqCst);
            return Err(CoreError::StoreUnavailable("scripted query failure".into()));
        }
        self.inner.query(session, collection, field_path, equals).await
    }

    async fn insert(
        &self,
        session: Option<&Session>,
        collection: &str,
        fields: Fields,
    ) -> Result<String, CoreError> {
        if self.hang_inserts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.insert(session, collection, fields).await
    }

    async fn set(
        &self,
        session: Option<&Session>,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), CoreError> {
        self.inner.set(session, collection, id, fields).await
    }

    async fn delete(
        &self,
        session: Option<&Session>,
        collection: &str,
        id: &str,
    ) -> Result<(), CoreError> {
        self.inner.delete(session, collection, id).await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn alice() -> Session {
    Session::new("alice-id", "alice@example.com", "")
}

fn bob() -> Session {
    Session::new("bob-id", "bob@example.com", "")
}

fn income(amount: &str, on: &str, memo: &str) -> TransactionDraft {
    TransactionDraft::new(TransactionKind::Income, amount, on, memo)
}

fn expense(amount: &str, on: &str, memo: &str) -> TransactionDraft {
    TransactionDraft::new(TransactionKind::Expense, amount, on, memo)
}

fn ruled_engine() -> (Arc<MemoryDocumentStore>, LedgerEngine) {
    let settings = Settings::default();
    let store = Arc::new(MemoryDocumentStore::with_rules(&settings));
    let engine = LedgerEngine::new(store.clone(), &settings);
    (store, engine)
}

fn scripted_engine(settings: &Settings) -> (Arc<ScriptedStore>, LedgerEngine) {
    let store = Arc::new(ScriptedStore::new(settings));
    let engine = LedgerEngine::new(store.clone(), settings);
    (store, engine)
}

/// Largest value a `Decimal` can hold.
const DECIMAL_MAX: &str = "79228162514264337593543950335";

fn validation_fields(err: CoreError) -> Vec<String> {
    match err {
        CoreError::ValidationError { fields, .. } => fields,
        other => panic!("expected ValidationError, got {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════════
// AccountDirectory
// ═══════════════════════════════════════════════════════════════════

mod directory {
    use super::*;

    fn directory() -> (Arc<MemoryDocumentStore>, AccountDirectory) {
        let settings = Settings::default();
        let store = Arc::new(MemoryDocumentStore::with_rules(&settings));
        let directory = AccountDirectory::new(store.clone(), &settings);
        (store, directory)
    }

    fn entry(name: &str, email: &str) -> Fields {
        json!({ "display_name": name, "email": email })
            .as_object()
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn unknown_name_is_not_found() {
        let (_, directory) = directory();
        let err = directory.resolve("nobody").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(ref n) if n == "nobody"));
    }

    #[tokio::test]
    async fn register_then_resolve() {
        let (store, directory) = directory();
        let account = directory
            .register(&alice(), "alice", "alice@example.com")
            .await
            .unwrap();
        assert_eq!(account.id, "alice-id");
        assert_eq!(account.display_name, "alice");

        assert_eq!(directory.resolve("alice").await.unwrap(), "alice@example.com");
        assert_eq!(
            store.peek("users", "alice-id"),
            Some(entry("alice", "alice@example.com"))
        );
    }

    #[tokio::test]
    async fn names_are_case_sensitive() {
        let (_, directory) = directory();
        directory
            .register(&alice(), "Alice", "alice@example.com")
            .await
            .unwrap();
        assert!(matches!(
            directory.resolve("alice").await,
            Err(CoreError::NotFound(_))
        ));
        assert!(directory.resolve("Alice").await.is_ok());
    }

    #[tokio::test]
    async fn taken_name_rejected_for_another_account() {
        let (store, directory) = directory();
        directory
            .register(&alice(), "alice", "alice@example.com")
            .await
            .unwrap();

        let err = directory
            .register(&bob(), "alice", "bob@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateDisplayName(ref n) if n == "alice"));
        assert!(store.peek("users", "bob-id").is_none());

        assert!(matches!(
            directory.ensure_available("alice").await,
            Err(CoreError::DuplicateDisplayName(_))
        ));
        assert!(directory.ensure_available("carol").await.is_ok());
    }

    #[tokio::test]
    async fn same_account_may_rewrite_its_entry() {
        let (store, directory) = directory();
        directory
            .register(&alice(), "alice", "alice@example.com")
            .await
            .unwrap();
        directory
            .register(&alice(), "alice", "alice@example.com")
            .await
            .unwrap();
        assert_eq!(store.document_count("users"), 1);
    }

    #[tokio::test]
    async fn legacy_duplicates_resolve_to_smallest_id() {
        let (store, directory) = directory();
        store.seed("users", "zz-later", entry("dup", "later@example.com"));
        store.seed("users", "aa-first", entry("dup", "first@example.com"));

        assert_eq!(directory.resolve("dup").await.unwrap(), "first@example.com");
        let account = directory.lookup("dup").await.unwrap().unwrap();
        assert_eq!(account.id, "aa-first");
    }

    #[tokio::test]
    async fn empty_fields_rejected_without_store_calls() {
        let (store, directory) = directory();
        let err = directory.register(&alice(), "  ", "").await.unwrap_err();
        assert_eq!(validation_fields(err), vec!["display_name", "email"]);
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn offline_store_is_unavailable() {
        let (store, directory) = directory();
        store.set_offline(true);
        assert!(matches!(
            directory.resolve("alice").await,
            Err(CoreError::StoreUnavailable(_))
        ));
    }
}

// ═══════════════════════════════════════════════════════════════════
// validate_draft
// ═══════════════════════════════════════════════════════════════════

mod validation {
    use super::*;

    #[test]
    fn valid_draft_becomes_record() {
        let record = validate_draft(&income(" 500.00 ", "2024-01-01", " salary "), "acct").unwrap();
        assert_eq!(record.amount, dec!(500.00));
        assert_eq!(record.memo, "salary");
        assert_eq!(record.owner.uid, "acct");
        assert_eq!(record.kind, TransactionKind::Income);
    }

    #[test]
    fn every_empty_field_reported() {
        let err = validate_draft(&income("", " ", ""), "acct").unwrap_err();
        assert_eq!(validation_fields(err), vec!["amount", "occurred_on", "memo"]);
    }

    #[test]
    fn single_empty_field() {
        let err = validate_draft(&expense("10", "2024-01-01", "   "), "acct").unwrap_err();
        assert_eq!(validation_fields(err), vec!["memo"]);
    }

    #[test]
    fn unparseable_amount_and_date_reported_together() {
        let err = validate_draft(&income("abc", "01/02/2024", "x"), "acct").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("amount 'abc' is not a number"));
        assert!(message.contains("date '01/02/2024' is not a valid YYYY-MM-DD date"));
        assert_eq!(validation_fields(err), vec!["amount", "occurred_on"]);
    }

    #[test]
    fn negative_amount_rejected() {
        let err = validate_draft(&expense("-5", "2024-01-01", "x"), "acct").unwrap_err();
        assert!(err.to_string().contains("must not be negative"));
    }

    #[test]
    fn zero_amount_allowed() {
        let record = validate_draft(&income("0", "2024-01-01", "placeholder"), "acct").unwrap();
        assert_eq!(record.amount, dec!(0));
    }

    #[test]
    fn negative_zero_stored_as_zero() {
        for typed in ["-0", "-0.00"] {
            let record = validate_draft(&income(typed, "2024-01-01", "x"), "acct").unwrap();
            assert_eq!(record.amount, dec!(0));
            assert!(!record.amount.is_sign_negative(), "{typed} kept its sign");
            assert_eq!(format_amount(record.amount), "0.00");
        }
    }

    #[test]
    fn amount_up_to_limit_accepted() {
        let record = validate_draft(&income("1000000000000", "2024-01-01", "x"), "acct").unwrap();
        assert_eq!(record.amount, MAX_AMOUNT);
    }

    #[test]
    fn amount_above_limit_rejected() {
        for typed in ["1000000000000.01", DECIMAL_MAX] {
            let err = validate_draft(&income(typed, "2024-01-01", "x"), "acct").unwrap_err();
            assert!(err.to_string().contains("must not exceed"), "{typed}: {err}");
            assert_eq!(validation_fields(err), vec!["amount"]);
        }
    }

    #[test]
    fn amount_beyond_decimal_range_is_not_a_number() {
        let err = validate_draft(
            &income("79228162514264337593543950336", "2024-01-01", "x"),
            "acct",
        )
        .unwrap_err();
        assert_eq!(validation_fields(err), vec!["amount"]);
    }

    #[test]
    fn impossible_date_rejected() {
        let err = validate_draft(&income("1", "2024-02-30", "x"), "acct").unwrap_err();
        assert_eq!(validation_fields(err), vec!["occurred_on"]);
    }
}

// ═══════════════════════════════════════════════════════════════════
// LedgerEngine
// ═══════════════════════════════════════════════════════════════════

mod ledger {
    use super::*;

    #[tokio::test]
    async fn starts_unloaded() {
        let (_, engine) = ruled_engine();
        assert_eq!(engine.state(), LedgerState::Unloaded);
        assert!(engine.snapshot().is_none());
        assert!(engine.balance().is_none());
    }

    #[tokio::test]
    async fn empty_ledger_loads_with_zero_balance() {
        let (_, mut engine) = ruled_engine();
        let snapshot = engine.load(&alice()).await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.balance.net(), dec!(0));
        assert_eq!(engine.state(), LedgerState::Ready);
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let (_, mut engine) = ruled_engine();
        engine
            .add_transaction(&alice(), &income("10", "2024-01-01", "a"))
            .await
            .unwrap();
        let first = engine.load(&alice()).await.unwrap().clone();
        let second = engine.load(&alice()).await.unwrap().clone();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn add_and_delete_recompute_balance() {
        let (store, mut engine) = ruled_engine();
        let session = alice();
        engine.load(&session).await.unwrap();

        engine
            .add_transaction(&session, &income("500.00", "2024-01-01", "salary"))
            .await
            .unwrap();
        assert_eq!(engine.balance().unwrap().net(), dec!(500.00));

        let groceries = engine
            .add_transaction(&session, &expense("120.50", "2024-01-02", "groceries"))
            .await
            .unwrap();
        assert_eq!(engine.balance().unwrap().net(), dec!(379.50));
        assert_eq!(engine.snapshot().unwrap().transactions[0].id, groceries);

        engine.delete_transaction(&session, &groceries).await.unwrap();
        assert_eq!(engine.balance().unwrap().net(), dec!(500.00));
        assert_eq!(store.document_count("transactions"), 1);
        assert_eq!(engine.state(), LedgerState::Ready);
    }

    #[tokio::test]
    async fn invalid_draft_makes_no_store_call() {
        let (store, mut engine) = ruled_engine();
        let err = engine
            .add_transaction(&alice(), &income("", "", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError { .. }));
        assert_eq!(store.call_count(), 0);
        assert_eq!(engine.state(), LedgerState::Unloaded);
    }

    #[tokio::test]
    async fn ledgers_are_isolated_per_account() {
        let (_, mut engine) = ruled_engine();
        engine
            .add_transaction(&alice(), &income("10", "2024-01-01", "alice's"))
            .await
            .unwrap();

        let bobs = engine.load(&bob()).await.unwrap();
        assert!(bobs.is_empty());
        assert_eq!(bobs.account_id, "bob-id");
    }

    #[tokio::test]
    async fn unknown_id_is_transaction_not_found() {
        let (store, mut engine) = ruled_engine();
        engine.load(&alice()).await.unwrap();
        let err = engine
            .delete_transaction(&alice(), "no-such-id")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::TransactionNotFound(ref id) if id == "no-such-id"));
        assert_eq!(store.delete_count(), 0);
    }

    #[tokio::test]
    async fn cannot_delete_another_accounts_transaction() {
        let (store, mut engine) = ruled_engine();
        let id = engine
            .add_transaction(&alice(), &income("10", "2024-01-01", "alice's"))
            .await
            .unwrap();

        let err = engine.delete_transaction(&bob(), &id).await.unwrap_err();
        assert!(matches!(err, CoreError::TransactionNotFound(_)));
        assert_eq!(store.document_count("transactions"), 1);
    }

    #[tokio::test]
    async fn delete_loads_first_when_unloaded() {
        let settings = Settings::default();
        let store = Arc::new(MemoryDocumentStore::with_rules(&settings));
        let mut writer = LedgerEngine::new(store.clone(), &settings);
        let id = writer
            .add_transaction(&alice(), &income("10", "2024-01-01", "x"))
            .await
            .unwrap();

        let mut fresh = LedgerEngine::new(store.clone(), &settings);
        fresh.delete_transaction(&alice(), &id).await.unwrap();
        assert!(fresh.snapshot().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_snapshot() {
        let settings = Settings::default();
        let (store, mut engine) = scripted_engine(&settings);
        engine
            .add_transaction(&alice(), &income("10", "2024-01-01", "x"))
            .await
            .unwrap();

        store.fail_next_queries(1);
        let err = engine.load(&alice()).await.unwrap_err();
        assert!(matches!(err, CoreError::StoreUnavailable(_)));
        assert_eq!(engine.snapshot().unwrap().len(), 1);
        assert_eq!(engine.state(), LedgerState::Ready);
    }

    #[tokio::test]
    async fn failed_load_without_snapshot_stays_unloaded() {
        let settings = Settings::default();
        let (store, mut engine) = scripted_engine(&settings);
        store.fail_next_queries(1);
        assert!(engine.load(&alice()).await.is_err());
        assert_eq!(engine.state(), LedgerState::Unloaded);
        assert!(engine.snapshot().is_none());
    }

    #[tokio::test]
    async fn failed_reload_after_write_reports_error_and_keeps_old_view() {
        let settings = Settings::default();
        let (store, mut engine) = scripted_engine(&settings);
        engine
            .add_transaction(&alice(), &income("10", "2024-01-01", "first"))
            .await
            .unwrap();

        store.fail_next_queries(1);
        let err = engine
            .add_transaction(&alice(), &income("5", "2024-01-02", "second"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::StoreUnavailable(_)));
        // the write went through, the view did not change
        assert_eq!(store.inner.document_count("transactions"), 2);
        assert_eq!(engine.snapshot().unwrap().len(), 1);
        assert_eq!(engine.state(), LedgerState::Ready);

        engine.load(&alice()).await.unwrap();
        assert_eq!(engine.balance().unwrap().net(), dec!(15));
    }

    #[tokio::test]
    async fn hanging_store_times_out() {
        let settings = Settings {
            request_timeout_secs: 1,
            ..Settings::default()
        };
        let (store, mut engine) = scripted_engine(&settings);
        store.hang_queries.store(true, Ordering::SeqCst);

        let err = engine.load(&alice()).await.unwrap_err();
        match err {
            CoreError::StoreUnavailable(msg) => assert!(msg.contains("timed out")),
            other => panic!("expected StoreUnavailable, got {other:?}"),
        }
        assert_eq!(engine.state(), LedgerState::Unloaded);
    }

    #[tokio::test]
    async fn cancelled_mutation_blocks_until_reload() {
        let settings = Settings::default();
        let (store, mut engine) = scripted_engine(&settings);
        engine.load(&alice()).await.unwrap();

        store.hang_inserts.store(true, Ordering::SeqCst);
        let draft = income("10", "2024-01-01", "x");
        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            engine.add_transaction(&alice(), &draft),
        )
        .await;
        assert!(outcome.is_err(), "the hanging insert should have been cancelled");
        assert_eq!(engine.state(), LedgerState::Mutating);

        store.hang_inserts.store(false, Ordering::SeqCst);
        let err = engine.add_transaction(&alice(), &draft).await.unwrap_err();
        assert!(matches!(err, CoreError::MutationInProgress));

        // a failed load does not re-synchronize
        store.fail_next_queries(1);
        assert!(engine.load(&alice()).await.is_err());
        assert_eq!(engine.state(), LedgerState::Mutating);

        engine.load(&alice()).await.unwrap();
        assert_eq!(engine.state(), LedgerState::Ready);
        engine.add_transaction(&alice(), &draft).await.unwrap();
        assert_eq!(engine.snapshot().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn maximum_amounts_never_reach_the_store() {
        let (store, mut engine) = ruled_engine();
        for _ in 0..2 {
            let err = engine
                .add_transaction(&alice(), &income(DECIMAL_MAX, "2024-01-01", "huge"))
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::ValidationError { .. }));
        }
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn oversized_stored_entries_fail_the_load_and_can_be_deleted() {
        let (store, mut engine) = ruled_engine();
        for id in ["huge-1", "huge-2"] {
            store.seed(
                "transactions",
                id,
                json!({
                    "kind": "income",
                    "amount": DECIMAL_MAX,
                    "occurred_on": "2024-01-01",
                    "memo": "imported",
                    "owner": { "uid": "alice-id" }
                })
                .as_object()
                .unwrap()
                .clone(),
            );
        }

        let err = engine.load(&alice()).await.unwrap_err();
        assert!(matches!(err, CoreError::BalanceOverflow));
        assert_eq!(engine.state(), LedgerState::Unloaded);
        assert!(engine.snapshot().is_none());

        engine.delete_transaction(&alice(), "huge-2").await.unwrap();
        assert_eq!(engine.state(), LedgerState::Ready);
        assert_eq!(store.document_count("transactions"), 1);
        assert_eq!(engine.balance().unwrap().net().to_string(), DECIMAL_MAX);
    }

    #[tokio::test]
    async fn delete_from_fresh_engine_checks_ownership() {
        let (store, mut engine) = ruled_engine();
        let id = engine
            .add_transaction(&alice(), &income("10", "2024-01-01", "alice's"))
            .await
            .unwrap();

        let mut fresh = LedgerEngine::new(store.clone(), &Settings::default());
        let err = fresh.delete_transaction(&bob(), &id).await.unwrap_err();
        assert!(matches!(err, CoreError::TransactionNotFound(_)));
        assert_eq!(store.delete_count(), 0);
    }

    #[tokio::test]
    async fn reset_drops_snapshot() {
        let (_, mut engine) = ruled_engine();
        engine.load(&alice()).await.unwrap();
        engine.reset();
        assert_eq!(engine.state(), LedgerState::Unloaded);
        assert!(engine.snapshot().is_none());
    }
}

// ═══════════════════════════════════════════════════════════════════
// SessionGate
// ═══════════════════════════════════════════════════════════════════

mod gate {
    use super::*;

    #[test]
    fn view_paths() {
        assert_eq!(View::Login.path(), "/");
        assert_eq!(View::Register.path(), "/register");
        assert_eq!(View::Ledger.path(), "/transactions");
        assert_eq!(View::Ledger.to_string(), "/transactions");
    }

    #[test]
    fn path_matching() {
        assert_eq!(View::from_path("/"), Some(View::Login));
        assert_eq!(View::from_path(""), Some(View::Login));
        assert_eq!(View::from_path("/register/"), Some(View::Register));
        assert_eq!(View::from_path("/transactions?tab=all"), Some(View::Ledger));
        assert_eq!(View::from_path("/transactions#top"), Some(View::Ledger));
        assert_eq!(View::from_path("/admin"), None);
    }

    #[test]
    fn only_ledger_is_protected() {
        assert!(View::Ledger.is_protected());
        assert!(!View::Login.is_protected());
        assert!(!View::Register.is_protected());
    }

    #[tokio::test]
    async fn protected_view_redirects_without_session() {
        let identity = Arc::new(MemoryIdentityGateway::new());
        let gate = SessionGate::new(identity.clone());

        assert_eq!(gate.guard(View::Ledger), RouteDecision::Redirect(View::Login));
        assert!(matches!(gate.require(), Err(CoreError::Unauthorized)));
        assert_eq!(
            gate.guard(View::Register),
            RouteDecision::Render {
                view: View::Register,
                session: None
            }
        );
    }

    #[tokio::test]
    async fn protected_view_renders_with_session() {
        let identity = Arc::new(MemoryIdentityGateway::new());
        let gate = SessionGate::new(identity.clone());
        let session = identity
            .create_identity("a@example.com", "secret1")
            .await
            .unwrap();

        assert_eq!(
            gate.route("/transactions"),
            RouteDecision::Render {
                view: View::Ledger,
                session: Some(session.clone())
            }
        );
        assert_eq!(gate.check(), Some(session));

        identity.sign_out();
        assert_eq!(gate.route("/transactions"), RouteDecision::Redirect(View::Login));
    }

    #[tokio::test]
    async fn unknown_path_goes_to_login() {
        let gate = SessionGate::new(Arc::new(MemoryIdentityGateway::new()));
        assert_eq!(gate.route("/nope"), RouteDecision::Redirect(View::Login));
    }
}
