pub mod errors;
pub mod models;
pub mod providers;
pub mod services;

use models::{
    account::Account, session::Session, settings::Settings, transaction::TransactionDraft,
};
use providers::{
    firebase_auth::FirebaseAuthGateway,
    firestore::FirestoreStore,
    traits::{DocumentStore, IdentityGateway},
};
use services::{
    deadline,
    directory_service::AccountDirectory,
    ledger_service::LedgerEngine,
    session_gate::{RouteDecision, SessionGate},
};
use std::sync::Arc;

use errors::CoreError;

/// Main entry point for the Pocket Ledger core library.
///
/// Wires the identity gateway and document store into the account
/// directory, the session gate and ledger engines, the way the login,
/// registration and ledger screens use them.
#[must_use]
pub struct PocketLedger {
    settings: Settings,
    identity: Arc<dyn IdentityGateway>,
    store: Arc<dyn DocumentStore>,
    directory: AccountDirectory,
    gate: SessionGate,
}

impl std::fmt::Debug for PocketLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PocketLedger")
            .field("identity", &self.identity.name())
            .field("store", &self.store.name())
            .field("signed_in", &self.identity.current_session().is_some())
            .finish()
    }
}

impl PocketLedger {
    /// Build on top of any gateway/store pair.
    pub fn new(
        identity: Arc<dyn IdentityGateway>,
        store: Arc<dyn DocumentStore>,
        settings: Settings,
    ) -> Result<Self, CoreError> {
        settings.validate()?;
        let directory = AccountDirectory::new(Arc::clone(&store), &settings);
        let gate = SessionGate::new(Arc::clone(&identity));
        Ok(Self {
            settings,
            identity,
            store,
            directory,
            gate,
        })
    }

    /// Connect to the hosted backend described by `settings`.
    pub fn connect(settings: Settings) -> Result<Self, CoreError> {
        let identity = Arc::new(FirebaseAuthGateway::new(&settings)?);
        let store = Arc::new(FirestoreStore::new(&settings)?);
        Self::new(identity, store, settings)
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn directory(&self) -> &AccountDirectory {
        &self.directory
    }

    #[must_use]
    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    // ── Registration & Login ────────────────────────────────────────

    /// Create an identity and its directory entry.
    ///
    /// The name is checked before the identity is created, so a taken name
    /// costs nothing. If the directory write itself fails, the identity
    /// exists without an entry; the user can register again with another
    /// email.
    pub async fn register(
        &self,
        display_name: &str,
        email: &str,
        password: &str,
    ) -> Result<Account, CoreError> {
        let email = email.trim();
        let mut missing = Vec::new();
        if display_name.trim().is_empty() {
            missing.push("display_name");
        }
        if email.is_empty() {
            missing.push("email");
        }
        if password.is_empty() {
            missing.push("password");
        }
        if !missing.is_empty() {
            return Err(CoreError::missing_fields(&missing));
        }

        self.directory.ensure_available(display_name).await?;

        let session = deadline::within(
            self.settings.request_timeout(),
            "identity creation",
            self.identity.create_identity(email, password),
        )
        .await?;
        tracing::info!(account_id = %session.account_id, "identity created");

        match self.directory.register(&session, display_name, email).await {
            Ok(account) => Ok(account),
            Err(e) => {
                tracing::error!(
                    account_id = %session.account_id,
                    error = %e,
                    "identity created but directory entry was not written"
                );
                Err(e)
            }
        }
    }

    /// Resolve a display name to its email and sign in.
    pub async fn log_in(&self, display_name: &str, password: &str) -> Result<Session, CoreError> {
        let mut missing = Vec::new();
        if display_name.trim().is_empty() {
            missing.push("display_name");
        }
        if password.is_empty() {
            missing.push("password");
        }
        if !missing.is_empty() {
            return Err(CoreError::missing_fields(&missing));
        }

        let email = self.directory.resolve(display_name).await?;
        let session = deadline::within(
            self.settings.request_timeout(),
            "sign-in",
            self.identity.authenticate(&email, password),
        )
        .await?;

        tracing::info!(account_id = %session.account_id, "signed in");
        Ok(session)
    }

    /// End the current session. Any open ledger must be `reset` by its owner.
    pub fn log_out(&self) {
        if let Some(session) = self.identity.current_session() {
            tracing::info!(account_id = %session.account_id, "signed out");
        }
        self.identity.sign_out();
    }

    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.gate.check()
    }

    /// Decide what to show for a navigation request.
    #[must_use]
    pub fn route(&self, path: &str) -> RouteDecision {
        self.gate.route(path)
    }

    // ── Ledger ──────────────────────────────────────────────────────

    /// A fresh, unloaded engine bound to this backend.
    pub fn ledger(&self) -> LedgerEngine {
        LedgerEngine::new(Arc::clone(&self.store), &self.settings)
    }

    /// Enter the ledger view: gate check, then the initial load.
    ///
    /// Without a session this fails with `Unauthorized` before any store
    /// call is made.
    pub async fn open_ledger(&self) -> Result<LedgerEngine, CoreError> {
        let session = self.gate.require()?;
        let mut engine = self.ledger();
        let loaded = engine.load(&session).await.map(|_| ());
        self.end_session_on_auth_failure(&mut engine, loaded)?;
        Ok(engine)
    }

    /// Reload the ledger for the current session.
    pub async fn refresh(&self, engine: &mut LedgerEngine) -> Result<(), CoreError> {
        let session = self.session_for(engine)?;
        let result = engine.load(&session).await.map(|_| ());
        self.end_session_on_auth_failure(engine, result)
    }

    /// Add a transaction for the current session's account.
    pub async fn add_transaction(
        &self,
        engine: &mut LedgerEngine,
        draft: &TransactionDraft,
    ) -> Result<String, CoreError> {
        let session = self.session_for(engine)?;
        let result = engine.add_transaction(&session, draft).await;
        self.end_session_on_auth_failure(engine, result)
    }

    /// Delete a transaction of the current session's account.
    pub async fn delete_transaction(
        &self,
        engine: &mut LedgerEngine,
        transaction_id: &str,
    ) -> Result<(), CoreError> {
        let session = self.session_for(engine)?;
        let result = engine.delete_transaction(&session, transaction_id).await;
        self.end_session_on_auth_failure(engine, result)
    }

    // ── Internal ────────────────────────────────────────────────────

    /// Re-read the session at the start of a protected operation.
    fn session_for(&self, engine: &mut LedgerEngine) -> Result<Session, CoreError> {
        let session = self.gate.require();
        if session.is_err() {
            engine.reset();
        }
        session
    }

    /// `Unauthorized` from the store means the session is dead: the cached
    /// ledger is discarded and the gateway signed out, so the gate sends the
    /// next navigation to the login view.
    fn end_session_on_auth_failure<T>(
        &self,
        engine: &mut LedgerEngine,
        result: Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        if let Err(e) = &result {
            if e.requires_login() {
                engine.reset();
                if let Some(session) = self.identity.current_session() {
                    tracing::warn!(account_id = %session.account_id, "session rejected by the store, signing out");
                }
                self.identity.sign_out();
            }
        }
        result
    }
}
