use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::CoreError;

/// Backend configuration for a Pocket Ledger client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Web API key of the backend project. Sent as a query parameter to the
    /// accounts API, so it is redacted from every transport error.
    pub api_key: String,

    /// Project the document database belongs to.
    pub project_id: String,

    /// Database inside the project.
    pub database_id: String,

    /// Upper bound for every gateway/store call, in seconds.
    pub request_timeout_secs: u64,

    /// Collection holding the display-name directory.
    pub users_collection: String,

    /// Collection holding every account's transactions.
    pub transactions_collection: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            project_id: String::new(),
            database_id: "(default)".to_string(),
            request_timeout_secs: 30,
            users_collection: "users".to_string(),
            transactions_collection: "transactions".to_string(),
        }
    }
}

impl Settings {
    /// Parse settings from JSON. Missing keys fall back to their defaults.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let settings: Settings = serde_json::from_str(json)
            .map_err(|e| CoreError::InvalidConfig(format!("Failed to parse settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that hold for every backend, remote or in-memory.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.request_timeout_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.users_collection.trim().is_empty() || self.transactions_collection.trim().is_empty()
        {
            return Err(CoreError::InvalidConfig(
                "collection names must not be empty".into(),
            ));
        }
        if self.users_collection == self.transactions_collection {
            return Err(CoreError::InvalidConfig(
                "users and transactions must live in different collections".into(),
            ));
        }
        Ok(())
    }

    /// Additional checks for the REST backend, which needs real credentials.
    pub fn validate_remote(&self) -> Result<(), CoreError> {
        self.validate()?;
        if self.api_key.trim().is_empty() {
            return Err(CoreError::InvalidConfig("api_key is required".into()));
        }
        if self.project_id.trim().is_empty() {
            return Err(CoreError::InvalidConfig("project_id is required".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
