//! Pairing session registry with single-use redemption
//!
//! A pairing session is the short-lived record behind one QR code. It is
//! redeemable exactly once, within a fixed validity window, by an already
//! authenticated account.

use crate::device::DeviceError;
use chrono::{DateTime, Duration, Utc};
use qrlink_auth::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pairing errors
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("pairing session not found")]
    NotFound,
    #[error("pairing session has expired")]
    Expired,
    #[error("pairing session has already been used")]
    AlreadyUsed,
    #[error("device link error: {0}")]
    Device(#[from] DeviceError),
    #[error("QR encoding error: {0}")]
    Qr(String),
}

pub type PairingResult<T> = Result<T, PairingError>;

/// One QR-code lifecycle instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingSession {
    /// Opaque globally-unique session identifier
    pub session_id: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session stops being redeemable
    pub expires_at: DateTime<Utc>,
    /// Set true by the one successful redemption
    pub redeemed: bool,
    /// Account that redeemed the session
    pub account: Option<AccountId>,
    /// Free-text descriptor supplied by the requesting device
    pub device_info: Option<String>,
}

impl PairingSession {
    fn new(ttl: Duration, device_info: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            created_at: now,
            expires_at: now + ttl,
            redeemed: false,
            account: None,
            device_info,
        }
    }

    /// Whether the validity window has passed
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Seconds until expiry, clamped at zero
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

/// In-process registry of pairing sessions
///
/// All mutation happens under the registry write lock, so the redeem
/// check-then-set is atomic: of N concurrent redemptions of one session id,
/// exactly one succeeds.
#[derive(Clone)]
pub struct SessionRegistry {
    /// Active and redeemed sessions keyed by identifier
    sessions: Arc<RwLock<HashMap<String, PairingSession>>>,
    /// Validity window applied to new sessions
    ttl: Duration,
}

impl SessionRegistry {
    /// Create a registry with the given session validity window
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Create a new pairing session
    pub async fn create(&self, device_info: Option<String>) -> PairingSession {
        let session = PairingSession::new(self.ttl, device_info);

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id.clone(), session.clone());

        // Reclaim expired sessions nobody redeemed; redeemed ones stay so a
        // late second scan still reports AlreadyUsed instead of NotFound.
        sessions.retain(|_, s| s.redeemed || !s.is_expired());

        info!("Created pairing session {}", session.session_id);
        session
    }

    /// Redeem a session for an account
    ///
    /// Redemption is the single state transition a session ever makes. The
    /// redeemed flag is checked before expiry: a redemption can only have
    /// happened inside the validity window, so a session that is both used
    /// and past its deadline reports AlreadyUsed, and Expired is reserved
    /// for sessions nobody redeemed in time.
    pub async fn redeem(&self, session_id: &str, account: AccountId) -> PairingResult<PairingSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id).ok_or(PairingError::NotFound)?;

        if session.redeemed {
            warn!("Rejected reuse of pairing session {}", session_id);
            return Err(PairingError::AlreadyUsed);
        }

        if session.is_expired() {
            debug!("Rejected expired pairing session {}", session_id);
            return Err(PairingError::Expired);
        }

        session.redeemed = true;
        session.account = Some(account);

        info!("Redeemed pairing session {}", session_id);
        Ok(session.clone())
    }

    /// Look up a session snapshot, for rendering expiry countdowns
    pub async fn get(&self, session_id: &str) -> PairingResult<PairingSession> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or(PairingError::NotFound)
    }

    #[cfg(test)]
    pub(crate) async fn force_expire(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.expires_at = Utc::now() - Duration::seconds(1);
        }
    }
}
