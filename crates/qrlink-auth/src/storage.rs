//! Persistent storage for registered accounts
//!
//! Uses JSON file storage in ~/.config/qrlink/accounts.json

use crate::account::{Account, AccountId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Account not found: {0}")]
    NotFound(String),
    #[error("Configuration directory not found")]
    NoConfigDir,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stored data structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredData {
    /// Registered accounts indexed by ID
    accounts: HashMap<String, Account>,
}

/// Account storage manager with file persistence
pub struct AccountStorage {
    /// Path to the storage file
    path: PathBuf,
    /// In-memory cache of accounts
    data: Arc<RwLock<StoredData>>,
}

impl AccountStorage {
    /// Create a new account storage instance
    ///
    /// Loads existing data from disk if present.
    pub async fn new() -> StorageResult<Self> {
        let path = Self::default_path()?;
        Self::with_path(path).await
    }

    /// Create storage at a specific path
    pub async fn with_path(path: PathBuf) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Load existing data or create empty
        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&contents) {
                Ok(data) => {
                    info!("Loaded account storage from {:?}", path);
                    data
                }
                Err(e) => {
                    warn!("Failed to parse account storage, starting fresh: {}", e);
                    StoredData::default()
                }
            }
        } else {
            debug!("No existing account storage, creating new");
            StoredData::default()
        };

        Ok(Self {
            path,
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Get the default storage path (~/.config/qrlink/accounts.json)
    fn default_path() -> StorageResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(StorageError::NoConfigDir)?;
        Ok(config_dir.join("qrlink").join("accounts.json"))
    }

    /// Save current state to disk
    async fn save(&self) -> StorageResult<()> {
        let data = self.data.read().await;
        let json = serde_json::to_string_pretty(&*data)?;
        std::fs::write(&self.path, json)?;
        debug!("Saved account storage to {:?}", self.path);
        Ok(())
    }

    /// Add or update an account
    pub async fn save_account(&self, account: Account) -> StorageResult<()> {
        let id = account.id.to_string();
        {
            let mut data = self.data.write().await;
            data.accounts.insert(id.clone(), account);
        }
        self.save().await?;
        info!("Saved account {}", id);
        Ok(())
    }

    /// Get an account by ID
    pub async fn get_account(&self, id: &AccountId) -> Option<Account> {
        let data = self.data.read().await;
        data.accounts.get(&id.to_string()).cloned()
    }

    /// Get an account by username
    pub async fn find_by_username(&self, username: &str) -> Option<Account> {
        let data = self.data.read().await;
        data.accounts
            .values()
            .find(|a| a.username == username)
            .cloned()
    }

    /// Check whether a username or email is already registered
    pub async fn identity_taken(&self, username: &str, email: &str) -> bool {
        let data = self.data.read().await;
        data.accounts
            .values()
            .any(|a| a.username == username || a.email == email)
    }

    /// Insert an account only if its username and email are both free
    ///
    /// The uniqueness check and the insert happen under one write lock, so
    /// two concurrent registrations cannot both claim the same identity.
    /// Returns false without saving when the identity is taken.
    pub async fn insert_if_unique(&self, account: Account) -> StorageResult<bool> {
        let id = account.id.to_string();
        {
            let mut data = self.data.write().await;
            let taken = data
                .accounts
                .values()
                .any(|a| a.username == account.username || a.email == account.email);
            if taken {
                return Ok(false);
            }
            data.accounts.insert(id.clone(), account);
        }
        self.save().await?;
        info!("Saved account {}", id);
        Ok(true)
    }

    /// Get the number of registered accounts
    pub async fn account_count(&self) -> usize {
        let data = self.data.read().await;
        data.accounts.len()
    }
}
