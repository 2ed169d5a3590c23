/// Proof of an authenticated identity, issued by the identity gateway.
///
/// The core never caches whether a session is valid; it asks the gateway
/// for the current one at the start of every protected operation and
/// passes it explicitly to the store.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub account_id: String,
    pub email: String,
    /// Bearer token for the document store. Empty for in-memory backends.
    id_token: String,
}

impl Session {
    pub fn new(
        account_id: impl Into<String>,
        email: impl Into<String>,
        id_token: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            email: email.into(),
            id_token: id_token.into(),
        }
    }

    #[must_use]
    pub fn id_token(&self) -> &str {
        &self.id_token
    }
}

// Tokens must never end up in logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("account_id", &self.account_id)
            .field("email", &self.email)
            .field("id_token", &"<redacted>")
            .finish()
    }
}
