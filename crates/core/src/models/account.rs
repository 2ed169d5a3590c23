use serde::{Deserialize, Serialize};

/// A registered user. Created once at registration and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Key issued by the identity provider
    pub id: String,

    /// Name the user logs in with (case-sensitive, unique)
    pub display_name: String,

    pub email: String,
}

/// Directory document stored under the account id. Lets a login-time
/// display name be turned into the email the identity provider expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub display_name: String,
    pub email: String,
}

impl DirectoryEntry {
    pub fn into_account(self, id: impl Into<String>) -> Account {
        Account {
            id: id.into(),
            display_name: self.display_name,
            email: self.email,
        }
    }
}
