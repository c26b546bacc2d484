//! Account identity types
//!
//! Represents registered accounts with their identity, credentials hash,
//! and registration metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    /// Generate a new random account ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier
    pub id: AccountId,
    /// Unique login name
    pub username: String,
    /// Unique contact address
    pub email: String,
    /// Argon2id password hash (never the raw password)
    pub password_hash: String,
    /// When this account was registered
    pub created_at: DateTime<Utc>,
    /// Disabled accounts cannot log in
    pub active: bool,
}

impl Account {
    /// Create a new active account with the given details
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        Self {
            id: AccountId::new(),
            username,
            email,
            password_hash,
            created_at: Utc::now(),
            active: true,
        }
    }
}

/// Public account projection for API responses (no credential material)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl From<&Account> for AccountInfo {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            username: account.username.clone(),
            email: account.email.clone(),
            created_at: account.created_at,
            active: account.active,
        }
    }
}
