use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::{redact_query, CoreError};
use crate::models::session::Session;
use crate::models::settings::Settings;
use super::traits::IdentityGateway;

const BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Identity gateway backed by the hosted accounts REST API.
///
/// - **Endpoints**: `accounts:signUp`, `accounts:signInWithPassword`
/// - **Auth**: project web API key as the `key` query parameter
///
/// The session is held in memory only; signing out simply forgets it.
/// It also lapses locally once the id token's lifetime (`expiresIn`) has
/// passed. Tokens are not refreshed; the user logs in again.
pub struct FirebaseAuthGateway {
    client: Client,
    api_key: String,
    current: Mutex<Option<SignedIn>>,
}

struct SignedIn {
    session: Session,
    expires_at: Option<DateTime<Utc>>,
}

impl FirebaseAuthGateway {
    pub fn new(settings: &Settings) -> Result<Self, CoreError> {
        settings.validate_remote()?;
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(settings.request_timeout_secs));
        Ok(Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            api_key: settings.api_key.clone(),
            current: Mutex::new(None),
        })
    }

    async fn password_call(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, CoreError> {
        let url = format!("{BASE_URL}/accounts:{endpoint}?key={}", self.api_key);
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };

        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let code = resp
                .json::<ErrorEnvelope>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            tracing::warn!(endpoint, %status, code = %code, "identity request rejected");
            return Err(classify_auth_error(&code));
        }

        let account: AccountResponse = resp.json().await.map_err(|e| {
            CoreError::Deserialization(redact_query(&format!(
                "Failed to parse {endpoint} response: {e}"
            )))
        })?;

        let expires_at = session_expiry(account.expires_in.as_deref(), Utc::now());
        let session = Session::new(account.local_id, account.email, account.id_token);
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(SignedIn {
            session: session.clone(),
            expires_at,
        });
        Ok(session)
    }
}

// ── Accounts API request/response types ─────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    email: String,
    id_token: String,
    /// Token lifetime in seconds, sent as a decimal string
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// When a token issued at `issued_at` with the given `expiresIn` stops
/// being valid. `None` when the lifetime is missing or unreadable.
pub fn session_expiry(expires_in: Option<&str>, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let secs: i64 = expires_in?.trim().parse().ok()?;
    issued_at.checked_add_signed(TimeDelta::try_seconds(secs)?)
}

/// Map an accounts API error code (e.g. `WEAK_PASSWORD : Password should be
/// at least 6 characters`) onto the library's error taxonomy.
pub fn classify_auth_error(code: &str) -> CoreError {
    let (head, detail) = match code.split_once(" : ") {
        Some((head, detail)) => (head.trim(), Some(detail.trim())),
        None => (code.trim(), None),
    };

    match head {
        "EMAIL_EXISTS" => CoreError::DuplicateEmail,
        "WEAK_PASSWORD" => CoreError::WeakCredential(
            detail.unwrap_or("password is too weak").to_string(),
        ),
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED" => {
            CoreError::InvalidCredential
        }
        "INVALID_EMAIL" => CoreError::invalid_field("email", "email address is badly formatted"),
        "MISSING_EMAIL" => CoreError::missing_fields(&["email"]),
        "MISSING_PASSWORD" => CoreError::missing_fields(&["password"]),
        _ if head.starts_with("API key not valid") || head == "INVALID_API_KEY" => {
            CoreError::InvalidConfig("the backend rejected the configured api_key".into())
        }
        _ => CoreError::StoreUnavailable(format!("identity service error: {head}")),
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl IdentityGateway for FirebaseAuthGateway {
    fn name(&self) -> &str {
        "FirebaseAuth"
    }

    async fn create_identity(&self, email: &str, password: &str) -> Result<Session, CoreError> {
        self.password_call("signUp", email, password).await
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, CoreError> {
        self.password_call("signInWithPassword", email, password).await
    }

    fn current_session(&self) -> Option<Session> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let lapsed = current
            .as_ref()
            .and_then(|signed_in| signed_in.expires_at)
            .is_some_and(|expires_at| expires_at <= Utc::now());
        if lapsed {
            if let Some(signed_in) = current.take() {
                tracing::info!(account_id = %signed_in.session.account_id, "session expired");
            }
            return None;
        }
        current.as_ref().map(|signed_in| signed_in.session.clone())
    }

    fn sign_out(&self) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
