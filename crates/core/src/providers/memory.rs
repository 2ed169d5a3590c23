use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::document::{lookup, Document, Fields};
use crate::models::session::Session;
use crate::models::settings::Settings;
use crate::models::transaction::OWNER_FIELD;
use super::traits::{DocumentStore, IdentityGateway};

/// Shortest password the hosted backend accepts.
pub const MIN_PASSWORD_LEN: usize = 6;

/// In-process identity backend.
///
/// Behaves like the hosted one where the core can observe it: emails are
/// unique (case-insensitively), short passwords are rejected, and creating
/// an identity signs it in.
pub struct MemoryIdentityGateway {
    /// Lowercased email → (account id, email as registered, password)
    accounts: Mutex<HashMap<String, (String, String, String)>>,
    current: Mutex<Option<Session>>,
}

impl MemoryIdentityGateway {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
        }
    }

    /// Number of identities created so far.
    pub fn identity_count(&self) -> usize {
        self.accounts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn set_current(&self, session: Option<Session>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = session;
    }
}

impl Default for MemoryIdentityGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl IdentityGateway for MemoryIdentityGateway {
    fn name(&self) -> &str {
        "MemoryIdentity"
    }

    async fn create_identity(&self, email: &str, password: &str) -> Result<Session, CoreError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(CoreError::WeakCredential(format!(
                "password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let key = email.trim().to_lowercase();
        let session = {
            let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
            if accounts.contains_key(&key) {
                return Err(CoreError::DuplicateEmail);
            }
            let account_id = Uuid::new_v4().simple().to_string();
            accounts.insert(
                key,
                (account_id.clone(), email.to_string(), password.to_string()),
            );
            Session::new(account_id, email, "")
        };

        self.set_current(Some(session.clone()));
        Ok(session)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, CoreError> {
        let key = email.trim().to_lowercase();
        let session = {
            let accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
            match accounts.get(&key) {
                Some((account_id, registered, stored)) if stored == password => {
                    Session::new(account_id.clone(), registered.clone(), "")
                }
                _ => return Err(CoreError::InvalidCredential),
            }
        };

        self.set_current(Some(session.clone()));
        Ok(session)
    }

    fn current_session(&self) -> Option<Session> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn sign_out(&self) {
        self.set_current(None);
    }
}

/// Access rule applied to one collection, mirroring the backend's security
/// rules closely enough for the core's authorization paths to be tested.
#[derive(Debug, Clone)]
enum AccessRule {
    /// Documents carry their owner's account id at this field path.
    OwnedBy(String),
    /// The document id is the owner's account id. Reads are public.
    KeyedByAccount,
}

/// In-process document store.
///
/// Collections are kept in id order, so query results are deterministic.
/// Call counters and an offline switch let tests observe exactly which
/// calls the core made.
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Fields>>>,
    rules: HashMap<String, AccessRule>,
    offline: AtomicBool,
    queries: AtomicUsize,
    inserts: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryDocumentStore {
    /// An open store with no access rules.
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            rules: HashMap::new(),
            offline: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// A store that enforces ownership on the collections named in `settings`:
    /// directory entries may only be written by their own account, and
    /// transactions may only be read or written by their owner.
    pub fn with_rules(settings: &Settings) -> Self {
        Self::new()
            .keyed_by_account(&settings.users_collection)
            .owned_by(&settings.transactions_collection, OWNER_FIELD)
    }

    /// Require a session whose account id matches `field_path` for every
    /// access to `collection`.
    #[must_use]
    pub fn owned_by(mut self, collection: &str, field_path: &str) -> Self {
        self.rules
            .insert(collection.to_string(), AccessRule::OwnedBy(field_path.to_string()));
        self
    }

    /// Allow writes to `collection` only under the writer's own account id.
    #[must_use]
    pub fn keyed_by_account(mut self, collection: &str) -> Self {
        self.rules
            .insert(collection.to_string(), AccessRule::KeyedByAccount);
        self
    }

    /// Put a document in place directly, bypassing rules and counters.
    pub fn seed(&self, collection: &str, id: &str, fields: Fields) {
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    /// Read a document directly, bypassing rules and counters.
    pub fn peek(&self, collection: &str, id: &str) -> Option<Fields> {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections.get(collection)?.get(id).cloned()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections.get(collection).map_or(0, BTreeMap::len)
    }

    /// While offline every call fails with `StoreUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Total number of calls of any kind.
    pub fn call_count(&self) -> usize {
        self.query_count() + self.insert_count() + self.set_count() + self.delete_count()
    }

    fn ensure_online(&self) -> Result<(), CoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CoreError::StoreUnavailable(format!(
                "{} is offline",
                self.name()
            )));
        }
        Ok(())
    }

    fn rule_for(&self, collection: &str) -> Option<&AccessRule> {
        self.rules.get(collection)
    }

    /// Check that `fields` belongs to the session's account under an
    /// `OwnedBy` rule.
    fn owns(session: Option<&Session>, fields: &Fields, field_path: &str) -> bool {
        match (session, lookup(fields, field_path)) {
            (Some(s), Some(Value::String(owner))) => *owner == s.account_id,
            _ => false,
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &str {
        "MemoryStore"
    }

    async fn query(
        &self,
        session: Option<&Session>,
        collection: &str,
        field_path: &str,
        equals: &Value,
    ) -> Result<Vec<Document>, CoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;

        // A filtered read of owned data is only allowed when the filter
        // itself pins the owner to the caller.
        if let Some(AccessRule::OwnedBy(owner_path)) = self.rule_for(collection) {
            let pinned = match (session, equals) {
                (Some(s), Value::String(v)) => field_path == owner_path && *v == s.account_id,
                _ => false,
            };
            if !pinned {
                return Err(CoreError::Unauthorized);
            }
        }

        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let docs = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| lookup(fields, field_path) == Some(equals))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(docs)
    }

    async fn insert(
        &self,
        session: Option<&Session>,
        collection: &str,
        fields: Fields,
    ) -> Result<String, CoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;

        match self.rule_for(collection) {
            Some(AccessRule::OwnedBy(path)) if !Self::owns(session, &fields, path) => {
                return Err(CoreError::Unauthorized);
            }
            Some(AccessRule::KeyedByAccount) => return Err(CoreError::Unauthorized),
            _ => {}
        }

        let id = Uuid::new_v4().simple().to_string();
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn set(
        &self,
        session: Option<&Session>,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), CoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;

        let allowed = match self.rule_for(collection) {
            Some(AccessRule::OwnedBy(path)) => Self::owns(session, &fields, path),
            Some(AccessRule::KeyedByAccount) => session.is_some_and(|s| s.account_id == id),
            None => true,
        };
        if !allowed {
            return Err(CoreError::Unauthorized);
        }

        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    async fn delete(
        &self,
        session: Option<&Session>,
        collection: &str,
        id: &str,
    ) -> Result<(), CoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;

        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(());
        };
        let Some(existing) = docs.get(id) else {
            return Ok(());
        };

        let allowed = match self.rule_for(collection) {
            Some(AccessRule::OwnedBy(path)) => Self::owns(session, existing, path),
            Some(AccessRule::KeyedByAccount) => session.is_some_and(|s| s.account_id == id),
            None => true,
        };
        if !allowed {
            return Err(CoreError::Unauthorized);
        }

        docs.remove(id);
        Ok(())
    }
}
