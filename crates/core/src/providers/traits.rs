use async_trait::async_trait;
use serde_json::Value;

use crate::errors::CoreError;
use crate::models::document::{Document, Fields};
use crate::models::session::Session;

/// Authentication backend: issues identities and sessions.
///
/// The core depends only on this trait, so the hosted backend and the
/// in-memory one used by tests are interchangeable.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait IdentityGateway: Send + Sync {
    /// Human-readable name of this backend (for logs/errors).
    fn name(&self) -> &str;

    /// Create a new identity and sign it in.
    ///
    /// Fails with `DuplicateEmail` or `WeakCredential`.
    async fn create_identity(&self, email: &str, password: &str) -> Result<Session, CoreError>;

    /// Sign in with an email/password pair. Fails with `InvalidCredential`.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, CoreError>;

    /// The currently signed-in session, if any. Local lookup, no I/O.
    fn current_session(&self) -> Option<Session>;

    /// Forget the current session.
    fn sign_out(&self);
}

/// Collection-oriented document database.
///
/// Every call receives the caller's session (or `None` for anonymous
/// reads) explicitly; implementations never consult ambient state.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait DocumentStore: Send + Sync {
    /// Human-readable name of this backend (for logs/errors).
    fn name(&self) -> &str;

    /// All documents in `collection` whose `field_path` equals `equals`.
    /// Dotted paths address nested maps. No ordering guarantee.
    async fn query(
        &self,
        session: Option<&Session>,
        collection: &str,
        field_path: &str,
        equals: &Value,
    ) -> Result<Vec<Document>, CoreError>;

    /// Add a document under a store-assigned id and return that id.
    async fn insert(
        &self,
        session: Option<&Session>,
        collection: &str,
        fields: Fields,
    ) -> Result<String, CoreError>;

    /// Create or replace the document with the given id.
    async fn set(
        &self,
        session: Option<&Session>,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), CoreError>;

    /// Delete a document by id. Deleting a missing document succeeds.
    async fn delete(
        &self,
        session: Option<&Session>,
        collection: &str,
        id: &str,
    ) -> Result<(), CoreError>;
}
