use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::account::{Account, DirectoryEntry};
use crate::models::document::to_fields;
use crate::models::session::Session;
use crate::models::settings::Settings;
use crate::providers::traits::DocumentStore;
use super::deadline;

/// Field the directory is searched by.
pub const DISPLAY_NAME_FIELD: &str = "display_name";

/// Maps a human-chosen display name to the account email the identity
/// gateway needs at login.
///
/// Entries live in the users collection keyed by account id. Display names
/// are matched exactly (case-sensitive, no trimming of stored values) and
/// are unique: [`register`](Self::register) refuses a name another account
/// already holds. Data written before that check existed may still contain
/// duplicates; lookups then use the entry with the smallest document id.
pub struct AccountDirectory {
    store: Arc<dyn DocumentStore>,
    collection: String,
    timeout: Duration,
}

impl AccountDirectory {
    pub fn new(store: Arc<dyn DocumentStore>, settings: &Settings) -> Self {
        Self {
            store,
            collection: settings.users_collection.clone(),
            timeout: settings.request_timeout(),
        }
    }

    /// Email of the account registered under `display_name`.
    pub async fn resolve(&self, display_name: &str) -> Result<String, CoreError> {
        self.lookup(display_name)
            .await?
            .map(|account| account.email)
            .ok_or_else(|| CoreError::NotFound(display_name.to_string()))
    }

    /// The account registered under `display_name`, if any.
    ///
    /// Reads are anonymous: login resolves the name before a session exists.
    pub async fn lookup(&self, display_name: &str) -> Result<Option<Account>, CoreError> {
        let name = Value::String(display_name.to_string());
        let mut docs = deadline::within(
            self.timeout,
            "directory lookup",
            self.store
                .query(None, &self.collection, DISPLAY_NAME_FIELD, &name),
        )
        .await?;

        if docs.len() > 1 {
            tracing::warn!(
                display_name,
                matches = docs.len(),
                "duplicate directory entries, using the smallest id"
            );
        }
        docs.sort_by(|a, b| a.id.cmp(&b.id));

        match docs.first() {
            Some(doc) => {
                let entry: DirectoryEntry = doc.decode()?;
                Ok(Some(entry.into_account(doc.id.clone())))
            }
            None => Ok(None),
        }
    }

    /// Fail with `DuplicateDisplayName` if any account holds `display_name`.
    pub async fn ensure_available(&self, display_name: &str) -> Result<(), CoreError> {
        match self.lookup(display_name).await? {
            Some(_) => Err(CoreError::DuplicateDisplayName(display_name.to_string())),
            None => Ok(()),
        }
    }

    /// Write the directory entry for the session's account.
    ///
    /// Must only be called once the identity exists. Re-registering the same
    /// account under the same name is a no-op overwrite.
    pub async fn register(
        &self,
        session: &Session,
        display_name: &str,
        email: &str,
    ) -> Result<Account, CoreError> {
        let mut missing = Vec::new();
        if display_name.trim().is_empty() {
            missing.push("display_name");
        }
        if email.trim().is_empty() {
            missing.push("email");
        }
        if !missing.is_empty() {
            return Err(CoreError::missing_fields(&missing));
        }

        if let Some(existing) = self.lookup(display_name).await? {
            if existing.id != session.account_id {
                return Err(CoreError::DuplicateDisplayName(display_name.to_string()));
            }
        }

        let entry = DirectoryEntry {
            display_name: display_name.to_string(),
            email: email.to_string(),
        };
        let fields = to_fields(&entry)?;
        deadline::within(
            self.timeout,
            "directory write",
            self.store
                .set(Some(session), &self.collection, &session.account_id, fields),
        )
        .await?;

        tracing::info!(account_id = %session.account_id, display_name, "directory entry written");
        Ok(entry.into_account(session.account_id.clone()))
    }
}
