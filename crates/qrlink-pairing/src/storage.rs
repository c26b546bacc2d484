//! Persistent storage for device links
//!
//! Uses JSON file storage in ~/.config/qrlink/devices.json

use crate::device::{DeviceId, DeviceLink};
use chrono::Utc;
use qrlink_auth::AccountId;
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
    #[error("Device not found: {0}")]
    NotFound(String),
    #[error("Configuration directory not found")]
    NoConfigDir,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stored data structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredData {
    /// Device links indexed by device ID
    devices: HashMap<String, DeviceLink>,
}

/// Device link storage manager with file persistence
pub struct DeviceLinkStorage {
    /// Path to the storage file
    path: PathBuf,
    /// In-memory cache of device links
    data: Arc<RwLock<StoredData>>,
}

impl DeviceLinkStorage {
    /// Create a new device link storage instance
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
                    info!("Loaded device storage from {:?}", path);
                    data
                }
                Err(e) => {
                    warn!("Failed to parse device storage, starting fresh: {}", e);
                    StoredData::default()
                }
            }
        } else {
            debug!("No existing device storage, creating new");
            StoredData::default()
        };

        Ok(Self {
            path,
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Get the default storage path (~/.config/qrlink/devices.json)
    fn default_path() -> StorageResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(StorageError::NoConfigDir)?;
        Ok(config_dir.join("qrlink").join("devices.json"))
    }

    /// Save current state to disk
    async fn save(&self) -> StorageResult<()> {
        let data = self.data.read().await;
        let json = serde_json::to_string_pretty(&*data)?;
        std::fs::write(&self.path, json)?;
        debug!("Saved device storage to {:?}", self.path);
        Ok(())
    }

    /// Add or update a device link
    pub async fn save_device(&self, device: DeviceLink) -> StorageResult<()> {
        let id = device.id.to_string();
        {
            let mut data = self.data.write().await;
            data.devices.insert(id.clone(), device);
        }
        self.save().await?;
        info!("Saved device link {}", id);
        Ok(())
    }

    /// Get a device link by ID
    pub async fn get_device(&self, id: &DeviceId) -> Option<DeviceLink> {
        let data = self.data.read().await;
        data.devices.get(&id.to_string()).cloned()
    }

    /// List all device links belonging to an account
    pub async fn list_for_account(&self, account: &AccountId) -> Vec<DeviceLink> {
        let data = self.data.read().await;
        data.devices
            .values()
            .filter(|d| d.account == *account)
            .cloned()
            .collect()
    }

    /// Get a device link by the hash of its bearer token
    pub async fn find_by_token_hash(&self, token_hash: &str) -> Option<DeviceLink> {
        let data = self.data.read().await;
        data.devices
            .values()
            .find(|d| d.token_hash == token_hash)
            .cloned()
    }

    /// Mark a device link inactive
    ///
    /// Succeeds when the record is already inactive; the check and the flag
    /// write happen under one write lock.
    pub async fn mark_inactive(&self, id: &DeviceId) -> StorageResult<()> {
        {
            let mut data = self.data.write().await;
            let device = data
                .devices
                .get_mut(&id.to_string())
                .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
            device.active = false;
        }
        self.save().await?;
        info!("Marked device link {} inactive", id);
        Ok(())
    }

    /// Update a device link's last_active timestamp
    pub async fn touch_device(&self, id: &DeviceId) -> StorageResult<()> {
        {
            let mut data = self.data.write().await;
            if let Some(device) = data.devices.get_mut(&id.to_string()) {
                device.last_active = Utc::now();
            } else {
                return Err(StorageError::NotFound(id.to_string()));
            }
        }
        self.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_device(account: &AccountId) -> DeviceLink {
        DeviceLink::new(account.clone(), "Test Device".to_string(), "hash123".to_string())
    }

    #[tokio::test]
    async fn test_storage_crud() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_devices.json");

        let storage = DeviceLinkStorage::with_path(path.clone()).await.unwrap();
        let account = AccountId::new();

        let device = test_device(&account);
        let id = device.id.clone();

        storage.save_device(device).await.unwrap();

        let loaded = storage.get_device(&id).await.unwrap();
        assert_eq!(loaded.name, "Test Device");
        assert!(loaded.active);

        let mine = storage.list_for_account(&account).await;
        assert_eq!(mine.len(), 1);
        assert!(storage.list_for_account(&AccountId::new()).await.is_empty());

        storage.mark_inactive(&id).await.unwrap();
        assert!(!storage.get_device(&id).await.unwrap().active);
    }

    #[tokio::test]
    async fn test_storage_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_devices.json");
        let account = AccountId::new();

        let device_id;
        {
            let storage = DeviceLinkStorage::with_path(path.clone()).await.unwrap();
            let device = test_device(&account);
            device_id = device.id.clone();
            storage.save_device(device).await.unwrap();
        }

        // Reload from disk
        let storage = DeviceLinkStorage::with_path(path).await.unwrap();
        let loaded = storage.get_device(&device_id).await.unwrap();
        assert_eq!(loaded.account, account);
    }

    #[tokio::test]
    async fn test_find_by_token_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_devices.json");
        let storage = DeviceLinkStorage::with_path(path).await.unwrap();

        let account = AccountId::new();
        let device = test_device(&account);
        storage.save_device(device).await.unwrap();

        assert!(storage.find_by_token_hash("hash123").await.is_some());
        assert!(storage.find_by_token_hash("other").await.is_none());
    }
}
