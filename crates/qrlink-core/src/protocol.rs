//! Pairing protocol message types
//!
//! The QR payload is what gets rendered into the scannable image; notify
//! messages are pushed to the waiting viewer over the pairing WebSocket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload encoded into the scannable QR image as UTF-8 JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrPayload {
    /// Opaque pairing session identifier
    pub session_id: String,
    /// When the session was created
    pub timestamp: DateTime<Utc>,
    /// When the session stops being redeemable
    pub expires_at: DateTime<Utc>,
}

/// Public account projection included in login notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Messages pushed to the viewer over the pairing socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyMessage {
    /// Redemption succeeded: the viewer is now logged in
    LoginSuccess {
        user: UserSummary,
        session_token: String,
        device_id: String,
    },
    /// Keepalive probe
    Ping { timestamp: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_payload_roundtrip() {
        let payload = QrPayload {
            session_id: "abc-123".to_string(),
            timestamp: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::minutes(5),
        };

        let json = serde_json::to_string(&payload).unwrap();
        let decoded: QrPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.session_id, payload.session_id);
        assert_eq!(decoded.expires_at, payload.expires_at);
    }

    #[test]
    fn test_login_success_tag() {
        let msg = NotifyMessage::LoginSuccess {
            user: UserSummary {
                id: "u1".to_string(),
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
            },
            session_token: "tok".to_string(),
            device_id: "d1".to_string(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"login_success\""));
    }
}
