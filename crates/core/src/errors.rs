use thiserror::Error;

/// Unified error type for the entire pocket-ledger-core library.
/// Every public function returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── User Input ──────────────────────────────────────────────────
    /// Missing or malformed input. `fields` names every offending field
    /// so the form can highlight all of them at once.
    #[error("Validation failed: {message}")]
    ValidationError {
        fields: Vec<String>,
        message: String,
    },

    // ── Account Directory ───────────────────────────────────────────
    #[error("No account registered under the name '{0}'")]
    NotFound(String),

    #[error("The name '{0}' is already taken")]
    DuplicateDisplayName(String),

    // ── Identity Gateway ────────────────────────────────────────────
    #[error("Invalid email or password")]
    InvalidCredential,

    #[error("An account with this email already exists")]
    DuplicateEmail,

    #[error("Password is too weak: {0}")]
    WeakCredential(String),

    // ── Document Store ──────────────────────────────────────────────
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Session missing or expired")]
    Unauthorized,

    // ── Ledger ──────────────────────────────────────────────────────
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Another change to this ledger is still in progress")]
    MutationInProgress,

    #[error("Ledger totals exceed the supported range")]
    BalanceOverflow,

    // ── Encoding / Config ───────────────────────────────────────────
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    /// Validation failure for one or more empty fields.
    pub fn missing_fields<S: AsRef<str>>(fields: &[S]) -> Self {
        let names: Vec<String> = fields.iter().map(|f| f.as_ref().to_string()).collect();
        CoreError::ValidationError {
            message: format!("missing required field(s): {}", names.join(", ")),
            fields: names,
        }
    }

    /// Validation failure for a single field that is present but malformed.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        CoreError::ValidationError {
            fields: vec![field.to_string()],
            message: message.into(),
        }
    }

    /// `true` when the caller must drop its view and send the user back to
    /// the unauthenticated entry point.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, CoreError::Unauthorized)
    }

    /// Text suitable for showing inline next to the form that triggered it.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            CoreError::ValidationError { .. } => "Please fill in all fields correctly.".into(),
            CoreError::NotFound(_) => "User not found.".into(),
            CoreError::DuplicateDisplayName(_) => "That name is already taken.".into(),
            CoreError::InvalidCredential => "Login failed. Check your credentials.".into(),
            CoreError::DuplicateEmail => "An account with this email already exists.".into(),
            CoreError::WeakCredential(reason) => format!("Password is too weak: {reason}"),
            CoreError::StoreUnavailable(_) => {
                "The service is unavailable right now. Please try again.".into()
            }
            CoreError::Unauthorized => "Your session has expired. Please log in again.".into(),
            CoreError::TransactionNotFound(_) => "That transaction no longer exists.".into(),
            CoreError::MutationInProgress => "Please wait for the previous change to finish.".into(),
            CoreError::BalanceOverflow => {
                "The ledger totals are too large to display. Delete the oversized entry.".into()
            }
            CoreError::Serialization(_)
            | CoreError::Deserialization(_)
            | CoreError::InvalidConfig(_) => "Something went wrong. Please try again.".into(),
        }
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors carry the full URL, and the accounts API takes its
        // key as a query parameter.
        CoreError::StoreUnavailable(redact_query(&e.to_string()))
    }
}

/// Strip everything after the first `?` so URL query secrets never reach logs.
pub fn redact_query(msg: &str) -> String {
    match msg.find('?') {
        Some(idx) => format!("{}?<query redacted>", &msg[..idx]),
        None => msg.to_string(),
    }
}
