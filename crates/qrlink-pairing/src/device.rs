//! Device links and the device session registry
//!
//! A device link is the durable device-to-account association created by a
//! successful pairing redemption. Links are listed and revoked, never
//! hard-deleted.

use crate::storage::{DeviceLinkStorage, StorageError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use qrlink_auth::{Account, AccountId, CredentialError, CredentialStore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Device errors
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Unique identifier for a linked device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    /// Generate a new random device ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A linked device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceLink {
    /// Unique device identifier, immutable after creation
    pub id: DeviceId,
    /// Owning account
    pub account: AccountId,
    /// Human-readable device label (e.g. "Desktop Device", "Work Laptop")
    pub name: String,
    /// Hash of the issued bearer token (raw tokens are never stored)
    pub token_hash: String,
    /// When this device was linked
    pub created_at: DateTime<Utc>,
    /// Last time this device authenticated
    pub last_active: DateTime<Utc>,
    /// Cleared only by explicit revocation
    pub active: bool,
}

impl DeviceLink {
    /// Create a new active device link
    pub fn new(account: AccountId, name: String, token_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: DeviceId::new(),
            account,
            name,
            token_hash,
            created_at: now,
            last_active: now,
            active: true,
        }
    }
}

/// Summary information about a device link for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceLinkInfo {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub active: bool,
}

impl From<&DeviceLink> for DeviceLinkInfo {
    fn from(device: &DeviceLink) -> Self {
        Self {
            id: device.id.to_string(),
            name: device.name.clone(),
            created_at: device.created_at,
            last_active: device.last_active,
            active: device.active,
        }
    }
}

/// Manages device links for all accounts
pub struct DeviceRegistry {
    /// Device link storage
    storage: Arc<DeviceLinkStorage>,
    /// Issues device-scoped bearer tokens
    credentials: Arc<CredentialStore>,
}

impl DeviceRegistry {
    /// Create a new device registry
    pub fn new(storage: Arc<DeviceLinkStorage>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            storage,
            credentials,
        }
    }

    /// Link a device to an account
    ///
    /// Issues a fresh device identifier and a bearer token scoped to the
    /// device/account pair. The raw token is returned exactly once; only its
    /// hash is persisted.
    pub async fn link(&self, account: &Account, name: String) -> DeviceResult<(DeviceLink, String)> {
        let mut device = DeviceLink::new(account.id.clone(), name, String::new());
        let token = self
            .credentials
            .issue_device_token(account, &device.id.to_string())?;
        device.token_hash = hash_token(&token);

        self.storage.save_device(device.clone()).await?;
        info!("Linked device {} to account {}", device.id, account.username);

        Ok((device, token))
    }

    /// List the active devices of an account
    pub async fn list_active(&self, account: &AccountId) -> Vec<DeviceLink> {
        self.storage
            .list_for_account(account)
            .await
            .into_iter()
            .filter(|d| d.active)
            .collect()
    }

    /// Revoke a device belonging to an account
    ///
    /// Fails when no device with that id belongs to the account. Revoking an
    /// already-revoked device succeeds.
    pub async fn revoke(&self, account: &AccountId, device_id: &str) -> DeviceResult<()> {
        let id = DeviceId::parse(device_id)
            .map_err(|_| DeviceError::NotFound(device_id.to_string()))?;

        let device = self
            .storage
            .get_device(&id)
            .await
            .ok_or_else(|| DeviceError::NotFound(device_id.to_string()))?;

        if device.account != *account {
            return Err(DeviceError::NotFound(device_id.to_string()));
        }

        if !device.active {
            debug!("Device {} already revoked", device_id);
            return Ok(());
        }

        self.storage.mark_inactive(&id).await?;
        info!("Revoked device {}", device_id);
        Ok(())
    }

    /// Update last_active for the device owning a bearer token
    pub async fn touch(&self, token: &str) -> DeviceResult<()> {
        let token_hash = hash_token(token);
        let device = self
            .storage
            .find_by_token_hash(&token_hash)
            .await
            .ok_or_else(|| DeviceError::NotFound("unknown token".to_string()))?;
        self.storage.touch_device(&device.id).await?;
        Ok(())
    }
}

/// Hash a bearer token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let result = hasher.finalize();
    BASE64.encode(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use qrlink_auth::{AccountStorage, TokenSigner};
    use tempfile::{tempdir, TempDir};

    async fn create_test_registry() -> (DeviceRegistry, Account, TempDir) {
        let dir = tempdir().unwrap();

        let accounts = Arc::new(
            AccountStorage::with_path(dir.path().join("accounts.json"))
                .await
                .unwrap(),
        );
        let signer = TokenSigner::new("test-secret", Duration::minutes(30));
        let credentials = Arc::new(CredentialStore::new(accounts, signer));

        let info = credentials
            .register("alice", "alice@example.com", "hunter2")
            .await
            .unwrap();
        let account = credentials.account_by_username(&info.username).await.unwrap();

        let devices = Arc::new(
            DeviceLinkStorage::with_path(dir.path().join("devices.json"))
                .await
                .unwrap(),
        );
        let registry = DeviceRegistry::new(devices, credentials);

        (registry, account, dir)
    }

    #[tokio::test]
    async fn test_link_and_list() {
        let (registry, account, _dir) = create_test_registry().await;

        let (device, token) = registry
            .link(&account, "Desktop Device".to_string())
            .await
            .unwrap();
        assert!(device.active);
        assert_eq!(device.token_hash, hash_token(&token));

        let active = registry.list_active(&account.id).await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, device.id);
    }

    #[tokio::test]
    async fn test_revoke_idempotent() {
        let (registry, account, _dir) = create_test_registry().await;

        let (device, _token) = registry
            .link(&account, "Desktop Device".to_string())
            .await
            .unwrap();
        let device_id = device.id.to_string();

        registry.revoke(&account.id, &device_id).await.unwrap();
        assert!(registry.list_active(&account.id).await.is_empty());

        // Revoking again is not an error
        registry.revoke(&account.id, &device_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_revoke_unknown_device() {
        let (registry, account, _dir) = create_test_registry().await;

        let missing = Uuid::new_v4().to_string();
        let result = registry.revoke(&account.id, &missing).await;
        assert!(matches!(result, Err(DeviceError::NotFound(_))));

        let garbage = registry.revoke(&account.id, "not-a-uuid").await;
        assert!(matches!(garbage, Err(DeviceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_revoke_foreign_device() {
        let (registry, account, _dir) = create_test_registry().await;

        let (device, _token) = registry
            .link(&account, "Desktop Device".to_string())
            .await
            .unwrap();

        // Another account cannot revoke it
        let other = AccountId::new();
        let result = registry.revoke(&other, &device.id.to_string()).await;
        assert!(matches!(result, Err(DeviceError::NotFound(_))));

        assert_eq!(registry.list_active(&account.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_list_active_excludes_revoked() {
        let (registry, account, _dir) = create_test_registry().await;

        let (first, _) = registry.link(&account, "One".to_string()).await.unwrap();
        let (_second, _) = registry.link(&account, "Two".to_string()).await.unwrap();

        registry
            .revoke(&account.id, &first.id.to_string())
            .await
            .unwrap();

        let active = registry.list_active(&account.id).await;
        assert_eq!(active.len(), 1);
        assert!(active.iter().all(|d| d.active));
    }

    #[tokio::test]
    async fn test_touch_updates_last_active() {
        let (registry, account, _dir) = create_test_registry().await;

        let (device, token) = registry
            .link(&account, "Desktop Device".to_string())
            .await
            .unwrap();

        registry.touch(&token).await.unwrap();

        let active = registry.list_active(&account.id).await;
        assert!(active[0].last_active >= device.last_active);
    }
}
