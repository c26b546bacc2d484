//! Shared application state for request handlers

use qrlink_auth::{Account, CredentialError, CredentialStore};
use qrlink_core::Config;
use qrlink_pairing::{ChannelManager, DeviceRegistry, PairingOrchestrator, SessionRegistry};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Account credential store
    pub credentials: Arc<CredentialStore>,
    /// Pairing session registry
    pub sessions: Arc<SessionRegistry>,
    /// Device link registry
    pub devices: Arc<DeviceRegistry>,
    /// Live notification channels
    pub channels: Arc<ChannelManager>,
    /// Pairing use-case coordinator
    pub orchestrator: Arc<PairingOrchestrator>,
    /// Certificate fingerprint for verification
    pub cert_fingerprint: Option<String>,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        config: Config,
        credentials: Arc<CredentialStore>,
        sessions: Arc<SessionRegistry>,
        devices: Arc<DeviceRegistry>,
        channels: Arc<ChannelManager>,
        orchestrator: Arc<PairingOrchestrator>,
        cert_fingerprint: Option<String>,
    ) -> Self {
        Self {
            config,
            credentials,
            sessions,
            devices,
            channels,
            orchestrator,
            cert_fingerprint,
        }
    }

    /// Resolve a bearer token to its account
    ///
    /// Verifies the signature and expiry, then loads the account the token
    /// asserts. Device-scoped tokens also refresh the device's last_active.
    pub async fn authenticate_bearer(&self, token: &str) -> Result<Account, CredentialError> {
        let claims = self.credentials.verify_token(token)?;

        let account = self
            .credentials
            .account_by_username(&claims.sub)
            .await
            .ok_or(CredentialError::TokenInvalid)?;

        if claims.device_id.is_some() {
            let _ = self.devices.touch(token).await;
        }

        Ok(account)
    }
}
