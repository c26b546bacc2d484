//! Credential store: registration, login, and bearer token operations

use crate::account::{Account, AccountId, AccountInfo};
use crate::storage::{AccountStorage, StorageError};
use crate::token::{Claims, TokenSigner};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Duration;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Credential errors
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("username or email already registered")]
    DuplicateIdentity,
    #[error("incorrect username or password")]
    InvalidCredentials,
    #[error("token has expired")]
    TokenExpired,
    #[error("invalid token")]
    TokenInvalid,
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type CredentialResult<T> = Result<T, CredentialError>;

/// Manages account registration, login, and bearer tokens
pub struct CredentialStore {
    /// Account storage
    storage: Arc<AccountStorage>,
    /// Token signer shared by login and device tokens
    signer: TokenSigner,
}

impl CredentialStore {
    /// Create a new credential store
    pub fn new(storage: Arc<AccountStorage>, signer: TokenSigner) -> Self {
        Self { storage, signer }
    }

    /// Register a new account
    ///
    /// Fails when the username or email is already registered. Only the
    /// Argon2id hash of the password is ever stored.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> CredentialResult<AccountInfo> {
        // Fast-fail before paying for the hash; the insert below re-checks
        // under the storage write lock.
        if self.storage.identity_taken(username, email).await {
            return Err(CredentialError::DuplicateIdentity);
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| CredentialError::Hash(e.to_string()))??;

        let account = Account::new(username.to_string(), email.to_string(), password_hash);
        let info = AccountInfo::from(&account);

        if !self.storage.insert_if_unique(account).await? {
            return Err(CredentialError::DuplicateIdentity);
        }

        info!("Registered account {}", info.username);
        Ok(info)
    }

    /// Authenticate a username/password pair
    ///
    /// Unknown username, wrong password, and disabled account are
    /// deliberately indistinguishable to the caller.
    pub async fn authenticate(&self, username: &str, password: &str) -> CredentialResult<Account> {
        let Some(account) = self.storage.find_by_username(username).await else {
            warn!("Login attempt for unknown username");
            return Err(CredentialError::InvalidCredentials);
        };

        let password = password.to_string();
        let hash = account.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .unwrap_or(false);

        if !valid || !account.active {
            warn!("Rejected login for {}", account.username);
            return Err(CredentialError::InvalidCredentials);
        }

        Ok(account)
    }

    /// Issue a login token for an account
    pub fn issue_token(
        &self,
        account: &Account,
        ttl: Option<Duration>,
    ) -> CredentialResult<String> {
        self.signer.issue(account, ttl)
    }

    /// Issue a bearer token scoped to a device of an account
    pub fn issue_device_token(
        &self,
        account: &Account,
        device_id: &str,
    ) -> CredentialResult<String> {
        self.signer.issue_for_device(account, device_id)
    }

    /// Verify a bearer token and return its claims
    pub fn verify_token(&self, token: &str) -> CredentialResult<Claims> {
        self.signer.verify(token)
    }

    /// Look up an account by username
    pub async fn account_by_username(&self, username: &str) -> Option<Account> {
        self.storage.find_by_username(username).await
    }

    /// Look up an account by ID
    pub async fn account_by_id(&self, id: &AccountId) -> Option<Account> {
        self.storage.get_account(id).await
    }
}

/// Hash a password with a fresh random salt
fn hash_password(password: &str) -> CredentialResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

/// Verify a password against a stored hash
///
/// Unparseable stored hashes verify as false so the caller stays opaque.
fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
