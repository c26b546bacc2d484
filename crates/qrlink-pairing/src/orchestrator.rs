//! Pairing orchestrator
//!
//! Wires the session registry, device registry, and notification channels
//! into the two pairing use cases: starting a session (QR generation) and
//! completing one (redemption, device linking, viewer notification).
//!
//! Per session the lifecycle is Created -> Redeemed | Expired, both
//! terminal. Expiry is evaluated lazily at access time; no background task
//! watches the clock.

use crate::device::DeviceRegistry;
use crate::notify::ChannelManager;
use crate::session::{PairingError, PairingResult, SessionRegistry};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use image::ImageFormat;
use qrcode::QrCode;
use qrlink_auth::Account;
use qrlink_core::{NotifyMessage, QrPayload, UserSummary};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{info, warn};

/// Device label used when the requesting side supplied no descriptor
const DEFAULT_DEVICE_NAME: &str = "Desktop Device";

/// Response when starting a pairing session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingStartResponse {
    /// Session ID for the pairing flow
    pub session_id: String,
    /// Base64-encoded PNG of the QR code to display
    pub qr_code_data: String,
    /// When the session stops being redeemable
    pub expires_at: DateTime<Utc>,
}

/// Response after a successful redemption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingCompleteResponse {
    pub message: String,
    /// The device ID assigned to the viewer
    pub device_id: String,
    /// Bearer token for the newly linked device
    pub session_token: String,
}

/// Coordinates pairing sessions, device linking, and result delivery
pub struct PairingOrchestrator {
    sessions: Arc<SessionRegistry>,
    devices: Arc<DeviceRegistry>,
    channels: Arc<ChannelManager>,
}

impl PairingOrchestrator {
    /// Create a new orchestrator
    pub fn new(
        sessions: Arc<SessionRegistry>,
        devices: Arc<DeviceRegistry>,
        channels: Arc<ChannelManager>,
    ) -> Self {
        Self {
            sessions,
            devices,
            channels,
        }
    }

    /// Start a new pairing session and encode it as a scannable QR image
    pub async fn start_pairing(
        &self,
        device_info: Option<String>,
    ) -> PairingResult<PairingStartResponse> {
        let session = self.sessions.create(device_info).await;

        let payload = QrPayload {
            session_id: session.session_id.clone(),
            timestamp: session.created_at,
            expires_at: session.expires_at,
        };
        let qr_code_data = encode_qr_png(&payload)?;

        Ok(PairingStartResponse {
            session_id: session.session_id,
            qr_code_data,
            expires_at: session.expires_at,
        })
    }

    /// Complete a pairing session for an authenticated account
    ///
    /// Redeems the session, links a device, then pushes the login result to
    /// whichever viewer is holding the session's notification channel. The
    /// caller gets the device credentials regardless of whether the
    /// notification was delivered; the link never rolls back.
    pub async fn complete_pairing(
        &self,
        session_id: &str,
        account: &Account,
    ) -> PairingResult<PairingCompleteResponse> {
        let session = self.sessions.redeem(session_id, account.id.clone()).await?;

        let name = session
            .device_info
            .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string());
        let (device, token) = self.devices.link(account, name).await?;
        let device_id = device.id.to_string();

        let notification = NotifyMessage::LoginSuccess {
            user: UserSummary {
                id: account.id.to_string(),
                username: account.username.clone(),
                email: account.email.clone(),
            },
            session_token: token.clone(),
            device_id: device_id.clone(),
        };

        if self.channels.send(session_id, notification).await {
            info!("Delivered login result for session {}", session_id);
            self.channels.close(session_id).await;
        } else {
            warn!("Login notification for session {} was not delivered", session_id);
        }

        Ok(PairingCompleteResponse {
            message: "Device linked successfully".to_string(),
            device_id,
            session_token: token,
        })
    }
}

/// Render a QR payload into a base64-encoded PNG
fn encode_qr_png(payload: &QrPayload) -> PairingResult<String> {
    let json = serde_json::to_string(payload).map_err(|e| PairingError::Qr(e.to_string()))?;

    let code = QrCode::new(json.as_bytes()).map_err(|e| PairingError::Qr(e.to_string()))?;
    let image = code.render::<image::Luma<u8>>().build();

    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| PairingError::Qr(e.to_string()))?;

    Ok(BASE64.encode(buffer.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DeviceLinkStorage;
    use chrono::Duration;
    use qrlink_auth::{AccountStorage, CredentialStore, TokenSigner};
    use tempfile::{tempdir, TempDir};

    struct Harness {
        orchestrator: PairingOrchestrator,
        credentials: Arc<CredentialStore>,
        sessions: Arc<SessionRegistry>,
        devices: Arc<DeviceRegistry>,
        channels: Arc<ChannelManager>,
        _dir: TempDir,
    }

    async fn create_harness() -> Harness {
        let dir = tempdir().unwrap();

        let accounts = Arc::new(
            AccountStorage::with_path(dir.path().join("accounts.json"))
                .await
                .unwrap(),
        );
        let signer = TokenSigner::new("test-secret", Duration::minutes(30));
        let credentials = Arc::new(CredentialStore::new(accounts, signer));

        let device_storage = Arc::new(
            DeviceLinkStorage::with_path(dir.path().join("devices.json"))
                .await
                .unwrap(),
        );
        let devices = Arc::new(DeviceRegistry::new(device_storage, credentials.clone()));
        let sessions = Arc::new(SessionRegistry::new(Duration::minutes(5)));
        let channels = Arc::new(ChannelManager::new());

        let orchestrator =
            PairingOrchestrator::new(sessions.clone(), devices.clone(), channels.clone());

        Harness {
            orchestrator,
            credentials,
            sessions,
            devices,
            channels,
            _dir: dir,
        }
    }

    async fn register_account(harness: &Harness, username: &str) -> Account {
        harness
            .credentials
            .register(username, &format!("{username}@example.com"), "hunter2")
            .await
            .unwrap();
        harness
            .credentials
            .account_by_username(username)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_pairing_flow() {
        let harness = create_harness().await;
        let account = register_account(&harness, "alice").await;

        let start = harness
            .orchestrator
            .start_pairing(Some("Work Laptop".to_string()))
            .await
            .unwrap();
        let (_epoch, mut rx) = harness.channels.open(&start.session_id).await;

        let complete = harness
            .orchestrator
            .complete_pairing(&start.session_id, &account)
            .await
            .unwrap();
        assert!(!complete.session_token.is_empty());

        // The waiting viewer receives exactly one login result
        let msg = rx.recv().await.unwrap();
        match msg {
            NotifyMessage::LoginSuccess {
                user,
                session_token,
                device_id,
            } => {
                assert_eq!(user.username, "alice");
                assert_eq!(session_token, complete.session_token);
                assert_eq!(device_id, complete.device_id);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        // The channel is released after delivery
        assert!(rx.recv().await.is_none());
        assert_eq!(harness.channels.open_count().await, 0);

        let active = harness.devices.list_active(&account.id).await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Work Laptop");
    }

    #[tokio::test]
    async fn test_pairing_succeeds_without_listener() {
        let harness = create_harness().await;
        let account = register_account(&harness, "alice").await;

        let start = harness.orchestrator.start_pairing(None).await.unwrap();

        // Nobody is holding the channel; linking must still go through
        let complete = harness
            .orchestrator
            .complete_pairing(&start.session_id, &account)
            .await
            .unwrap();
        assert!(!complete.device_id.is_empty());
        assert_eq!(harness.devices.list_active(&account.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_links_nothing() {
        let harness = create_harness().await;
        let account = register_account(&harness, "alice").await;

        let start = harness.orchestrator.start_pairing(None).await.unwrap();
        harness.sessions.force_expire(&start.session_id).await;

        let result = harness
            .orchestrator
            .complete_pairing(&start.session_id, &account)
            .await;
        assert!(matches!(result, Err(PairingError::Expired)));
        assert!(harness.devices.list_active(&account.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_double_redeem_links_first_account_only() {
        let harness = create_harness().await;
        let alice = register_account(&harness, "alice").await;
        let bob = register_account(&harness, "bob").await;

        let start = harness.orchestrator.start_pairing(None).await.unwrap();

        harness
            .orchestrator
            .complete_pairing(&start.session_id, &alice)
            .await
            .unwrap();
        let second = harness
            .orchestrator
            .complete_pairing(&start.session_id, &bob)
            .await;
        assert!(matches!(second, Err(PairingError::AlreadyUsed)));

        assert_eq!(harness.devices.list_active(&alice.id).await.len(), 1);
        assert!(harness.devices.list_active(&bob.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_qr_code_data_is_png() {
        let harness = create_harness().await;

        let start = harness.orchestrator.start_pairing(None).await.unwrap();
        let bytes = BASE64.decode(start.qr_code_data).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn test_default_device_name() {
        let harness = create_harness().await;
        let account = register_account(&harness, "alice").await;

        let start = harness.orchestrator.start_pairing(None).await.unwrap();
        harness
            .orchestrator
            .complete_pairing(&start.session_id, &account)
            .await
            .unwrap();

        let active = harness.devices.list_active(&account.id).await;
        assert_eq!(active[0].name, "Desktop Device");
    }
}
